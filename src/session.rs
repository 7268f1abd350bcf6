use base64::prelude::*;
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{PortalError, PortalResult};
use crate::models::{Role, User};

/// Where the caller should send the user after a session change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Navigation {
    Root,
    Dashboard(Role),
}

/// Holds the signed-in user. `login` and `logout` are the only writers.
#[derive(Debug, Default)]
pub struct SessionStore {
    user: Option<User>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn login(&mut self, user: User) -> Navigation {
        info!("Signed in {} ({})", user.email, user.role);
        let role = user.role;
        self.user = Some(user);
        Navigation::Dashboard(role)
    }

    pub fn logout(&mut self) -> Navigation {
        if let Some(user) = self.user.take() {
            info!("Signed out {}", user.email);
        }
        Navigation::Root
    }

    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }

    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    pub fn role(&self) -> Option<Role> {
        self.user.as_ref().map(|u| u.role)
    }
}

/// Accept any non-empty credentials and build a user for the chosen role.
pub fn mock_login(username: &str, password: &str, role: Role) -> PortalResult<User> {
    let username = username.trim();
    if username.is_empty() {
        return Err(PortalError::MissingField("username"));
    }
    if password.is_empty() {
        return Err(PortalError::MissingField("password"));
    }

    let email = if username.contains('@') {
        username.to_string()
    } else {
        format!("{username}@university.local")
    };
    let name = username
        .split('@')
        .next()
        .unwrap_or(username)
        .replace(['.', '_'], " ");

    Ok(User {
        id: format!("{}-{}", role.as_str(), username.to_lowercase()),
        name,
        email,
        role,
        avatar: None,
        token: None,
    })
}

#[derive(Deserialize)]
struct TokenClaims {
    #[serde(alias = "sub", alias = "userId")]
    id: serde_json::Value,
    name: String,
    email: String,
    role: Role,
    #[serde(default)]
    avatar: Option<String>,
}

/// Build a user from the claims segment of a bearer token (JWT).
///
/// The signature is not checked; the backend remains the authority.
pub fn user_from_token(token: &str) -> anyhow::Result<User> {
    let payload = token
        .split('.')
        .nth(1)
        .ok_or_else(|| anyhow::anyhow!("Token has no claims segment"))?;
    let bytes = BASE64_URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| anyhow::anyhow!("Token claims are not base64url: {e}"))?;
    let claims: TokenClaims = serde_json::from_slice(&bytes)
        .map_err(|e| anyhow::anyhow!("Token claims are not a portal user: {e}"))?;
    debug!("Decoded token claims for {}", claims.email);

    let id = match claims.id {
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    };
    Ok(User {
        id,
        name: claims.name,
        email: claims.email,
        role: claims.role,
        avatar: claims.avatar,
        token: Some(token.to_string()),
    })
}
