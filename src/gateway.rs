use std::future::Future;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::PortalError;
use crate::models::{ApproveTeam, GroupSessionPayload, Hall, Lecturer, NewLecturer, Team};

/// Failure of a single backend call, displayed to the user as-is.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("could not reach the server: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("request failed ({status}): {message}")]
    Status { status: StatusCode, message: String },

    #[error("unexpected response from the server: {0}")]
    Decode(String),

    #[error(transparent)]
    Rejected(#[from] PortalError),
}

pub type GatewayResult<T> = Result<T, GatewayError>;

/// Thin wrapper over the portal backend REST API.
#[derive(Clone)]
pub struct PortalClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl PortalClient {
    pub fn new(base_url: &str) -> anyhow::Result<Self> {
        let client = Client::builder()
            .cookie_store(true)
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build HTTP client: {e}"))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: None,
        })
    }

    /// Send `Authorization: Bearer <token>` with every request.
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    fn default_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        if let Some(ref token) = self.token {
            if let Ok(val) = HeaderValue::from_str(&format!("Bearer {}", token)) {
                headers.insert(AUTHORIZATION, val);
            }
        }
        headers
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn read<T: DeserializeOwned>(resp: reqwest::Response, what: &str) -> GatewayResult<T> {
        let status = resp.status();
        let text = resp.text().await?;
        debug!("{} response (status {}): {}", what, status, text);

        if !status.is_success() {
            let message = serde_json::from_str::<serde_json::Value>(&text)
                .ok()
                .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
                .unwrap_or_else(|| {
                    status
                        .canonical_reason()
                        .unwrap_or("unknown error")
                        .to_string()
                });
            return Err(GatewayError::Status { status, message });
        }

        // Some endpoints answer 200/204 with an empty body.
        let body = if text.trim().is_empty() { "null" } else { &text };
        serde_json::from_str(body)
            .map_err(|e| GatewayError::Decode(format!("{what}: {e}")))
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, what: &str) -> GatewayResult<T> {
        let resp = self
            .client
            .get(self.url(path))
            .headers(self.default_headers())
            .send()
            .await?;
        Self::read(resp, what).await
    }

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: Option<&B>,
        what: &str,
    ) -> GatewayResult<T> {
        let mut req = self
            .client
            .post(self.url(path))
            .headers(self.default_headers());
        if let Some(body) = body {
            req = req.json(body);
        }
        let resp = req.send().await?;
        Self::read(resp, what).await
    }

    pub async fn list_lecturers(&self) -> GatewayResult<Vec<Lecturer>> {
        let lecturers: Vec<Lecturer> = self.get("/lecturers", "Lecturers").await?;
        debug!("Fetched {} lecturers", lecturers.len());
        Ok(lecturers)
    }

    pub async fn create_lecturer(&self, lecturer: &NewLecturer) -> GatewayResult<Lecturer> {
        for (value, field) in [
            (&lecturer.name, "name"),
            (&lecturer.name_short, "short name"),
            (&lecturer.email, "email"),
        ] {
            if value.trim().is_empty() {
                return Err(PortalError::MissingField(field).into());
            }
        }
        let created: Lecturer = self
            .post("/lecturers", Some(lecturer), "Create lecturer")
            .await?;
        info!("Created lecturer {} (id {})", created.name, created.id);
        Ok(created)
    }

    pub async fn list_teams(&self) -> GatewayResult<Vec<Team>> {
        let teams: Vec<Team> = self.get("/teams", "Teams").await?;
        debug!("Fetched {} teams", teams.len());
        Ok(teams)
    }

    /// Approve a team with its chosen leader.
    ///
    /// Without a leader the request is refused here and nothing is sent.
    pub async fn approve_team(&self, team_id: &str, leader_id: Option<&str>) -> GatewayResult<()> {
        let leader_id = leader_id
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .ok_or(PortalError::LeaderRequired)?;
        let path = format!("/teams/{}/approve", urlencoding::encode(team_id));
        let _: serde_json::Value = self
            .post(&path, Some(&ApproveTeam { leader_id }), "Approve team")
            .await?;
        info!("Approved team {} with leader {}", team_id, leader_id);
        Ok(())
    }

    pub async fn reject_team(&self, team_id: &str) -> GatewayResult<()> {
        let path = format!("/teams/{}/reject", urlencoding::encode(team_id));
        let _: serde_json::Value = self.post::<(), _>(&path, None, "Reject team").await?;
        info!("Rejected team {}", team_id);
        Ok(())
    }

    pub async fn list_halls(&self) -> GatewayResult<Vec<Hall>> {
        self.get("/sessions/halls", "Halls").await
    }

    /// Lecturers as known to the session service (used to resolve imports).
    pub async fn list_session_lecturers(&self) -> GatewayResult<Vec<Lecturer>> {
        self.get("/sessions/lecturers", "Session lecturers").await
    }

    pub async fn add_sessions_to_group(
        &self,
        group_id: &str,
        sessions: &[GroupSessionPayload],
    ) -> GatewayResult<()> {
        let path = format!("/sessions/add-to-group/{}", urlencoding::encode(group_id));
        let _: serde_json::Value = self
            .post(&path, Some(sessions), "Add sessions to group")
            .await?;
        info!("Pushed {} sessions to {}", sessions.len(), group_id);
        Ok(())
    }
}

/// Run `request` unless `cancel` fires first.
///
/// A cancelled request yields `None`; whatever it would have returned is
/// dropped.
pub async fn cancellable<T>(
    cancel: &CancellationToken,
    request: impl Future<Output = GatewayResult<T>>,
) -> Option<GatewayResult<T>> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            debug!("Request cancelled before it completed");
            None
        }
        result = request => Some(result),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use axum::extract::{Path, State};
    use axum::http::StatusCode;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::{json, Value};
    use tokio::net::TcpListener;

    use super::*;

    #[derive(Clone, Default)]
    pub(crate) struct Backend {
        pub(crate) calls: Arc<AtomicUsize>,
        pub(crate) approved: Arc<Mutex<Vec<(String, Value)>>>,
        pub(crate) pushed: Arc<Mutex<Vec<(String, Value)>>>,
    }

    async fn teams(State(backend): State<Backend>) -> Json<Value> {
        backend.calls.fetch_add(1, Ordering::SeqCst);
        let approved = backend.approved.lock().unwrap().iter().any(|(id, _)| id == "1");
        let status = if approved { "approved" } else { "pending" };
        Json(json!([
            {"id": 1, "name": "Team Rocket", "status": status,
             "members": [{"id": 11, "name": "Jess"}, {"id": 12, "name": "James"}]},
            {"id": 2, "name": "Team Aqua", "status": "rejected", "members": []}
        ]))
    }

    async fn approve(
        State(backend): State<Backend>,
        Path(id): Path<String>,
        Json(body): Json<Value>,
    ) -> StatusCode {
        backend.calls.fetch_add(1, Ordering::SeqCst);
        backend.approved.lock().unwrap().push((id, body));
        StatusCode::NO_CONTENT
    }

    async fn push(
        State(backend): State<Backend>,
        Path(group): Path<String>,
        Json(body): Json<Value>,
    ) -> Json<Value> {
        backend.calls.fetch_add(1, Ordering::SeqCst);
        backend.pushed.lock().unwrap().push((group, body));
        Json(json!({"ok": true}))
    }

    async fn slow_lecturers(State(backend): State<Backend>) -> Json<Value> {
        backend.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(5)).await;
        Json(json!([]))
    }

    /// Serve a stub backend on an ephemeral port and return its `/api` base url.
    pub(crate) async fn spawn_backend(backend: Backend) -> String {
        let api = Router::new()
            .route("/teams", get(teams))
            .route("/teams/{id}/approve", post(approve))
            .route(
                "/teams/{id}/reject",
                post(|| async { (StatusCode::CONFLICT, Json(json!({"message": "Team already decided"}))) }),
            )
            .route(
                "/lecturers",
                get(|| async { Json(json!([{"id": 1, "name": "Dr Smith", "nameShort": "JS"}])) })
                    .post(|Json(body): Json<Value>| async move {
                        Json(json!({"id": 99, "name": body["name"], "nameShort": body["nameShort"], "email": body["email"]}))
                    }),
            )
            .route("/sessions/lecturers", get(slow_lecturers))
            .route(
                "/sessions/halls",
                get(|| async { Json(json!([{"id": 10, "building": "SP", "classroom": "4LA"}])) }),
            )
            .route("/sessions/add-to-group/{group}", post(push))
            .with_state(backend);
        let app = Router::new().nest("/api", api);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/api")
    }

    #[tokio::test]
    async fn test_approve_without_leader_sends_nothing() {
        let backend = Backend::default();
        let client = PortalClient::new(&spawn_backend(backend.clone()).await).unwrap();

        let err = client.approve_team("1", None).await.unwrap_err();
        assert!(matches!(err, GatewayError::Rejected(PortalError::LeaderRequired)));
        let err = client.approve_team("1", Some("  ")).await.unwrap_err();
        assert_eq!(err.to_string(), "select a leader before approving the team");
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_approve_posts_leader_id() {
        let backend = Backend::default();
        let client = PortalClient::new(&spawn_backend(backend.clone()).await).unwrap();

        client.approve_team("1", Some("11")).await.unwrap();

        let approved = backend.approved.lock().unwrap().clone();
        assert_eq!(approved, vec![("1".to_string(), json!({"leaderId": "11"}))]);
        let teams = client.list_teams().await.unwrap();
        assert_eq!(teams[0].status, crate::models::TeamStatus::Approved);
    }

    #[tokio::test]
    async fn test_error_status_carries_message() {
        let client = PortalClient::new(&spawn_backend(Backend::default()).await).unwrap();
        let err = client.reject_team("2").await.unwrap_err();
        assert_eq!(err.to_string(), "request failed (409 Conflict): Team already decided");
    }

    #[tokio::test]
    async fn test_lecturers_and_halls() {
        let client = PortalClient::new(&spawn_backend(Backend::default()).await).unwrap();
        let lecturers = client.list_lecturers().await.unwrap();
        assert_eq!(lecturers[0].name_short.as_deref(), Some("JS"));
        let halls = client.list_halls().await.unwrap();
        assert_eq!(halls[0].room, "4LA");

        let created = client
            .create_lecturer(&NewLecturer {
                name: "Grace Hopper".into(),
                name_short: "GH".into(),
                email: "grace@uni.ac".into(),
            })
            .await
            .unwrap();
        assert_eq!(created.id, "99");
        assert_eq!(created.email.as_deref(), Some("grace@uni.ac"));

        let err = client
            .create_lecturer(&NewLecturer {
                name: "No Email".into(),
                name_short: "NE".into(),
                email: String::new(),
            })
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "email is required");
    }

    #[tokio::test]
    async fn test_unreachable_backend() {
        let client = PortalClient::new("http://127.0.0.1:9/api").unwrap();
        let err = client.list_teams().await.unwrap_err();
        assert!(matches!(err, GatewayError::Transport(_)));
        assert!(err.to_string().starts_with("could not reach the server"));
    }

    #[tokio::test]
    async fn test_cancelled_fetch_is_dropped() {
        let backend = Backend::default();
        let client = PortalClient::new(&spawn_backend(backend.clone()).await).unwrap();
        let token = CancellationToken::new();

        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            canceller.cancel();
        });
        let result = cancellable(&token, client.list_session_lecturers()).await;
        assert!(result.is_none());

        let fresh = CancellationToken::new();
        let teams = cancellable(&fresh, client.list_teams()).await;
        assert_eq!(teams.unwrap().unwrap().len(), 2);
    }
}
