use std::time::Instant;

use axum::extract::{Path, Query, State};
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::Form;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use super::views::{self, Frame};
use super::{AppState, Portal};
use crate::calendar;
use crate::gateway::cancellable;
use crate::models::Role;
use crate::session::{mock_login, user_from_token};
use crate::timetable::Session;

#[derive(Deserialize)]
pub(crate) struct LoginForm {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
    #[serde(default)]
    role: String,
    #[serde(default)]
    token: String,
}

#[derive(Deserialize, Default)]
pub(crate) struct DashboardQuery {
    #[serde(default)]
    q: String,
}

fn render(state: &AppState, portal: &mut Portal, title: &str, body: String) -> Html<String> {
    let base = state.href("");
    let updated = calendar::now(state.config.timezone)
        .format("%Y-%m-%d %H:%M:%S %Z")
        .to_string();
    let notices = portal.notices.active(Instant::now()).to_vec();
    let frame = Frame {
        base: &base,
        user: portal.session.user(),
        notices: &notices,
        updated,
    };
    Html(views::render_page(&frame, title, body))
}

pub(crate) async fn root(State(state): State<AppState>) -> Redirect {
    if state.portal().session.is_authenticated() {
        Redirect::to(&state.href("/dashboard"))
    } else {
        Redirect::to(&state.href("/login"))
    }
}

pub(crate) async fn login_page(State(state): State<AppState>) -> Response {
    let mut portal = state.portal();
    if portal.session.is_authenticated() {
        return Redirect::to(&state.href("/dashboard")).into_response();
    }
    let body = views::render_login(&state.href(""));
    render(&state, &mut portal, "SDGP Portal", body).into_response()
}

pub(crate) async fn login(State(state): State<AppState>, Form(form): Form<LoginForm>) -> Redirect {
    let token = form.token.trim();
    let user = if !token.is_empty() {
        user_from_token(token).map_err(|e| format!("{e:#}"))
    } else {
        match Role::parse(&form.role) {
            Some(role) => mock_login(&form.username, &form.password, role).map_err(|e| e.to_string()),
            None => Err(format!("unknown role '{}'", form.role)),
        }
    };

    let mut portal = state.portal();
    match user {
        Ok(user) => {
            let nav = portal.sign_in(user, state.config.cohort.team_size);
            state.redirect(nav)
        }
        Err(message) => {
            warn!("Sign-in failed: {}", message);
            portal.notices.error(message);
            Redirect::to(&state.href("/login"))
        }
    }
}

pub(crate) async fn logout(State(state): State<AppState>) -> Redirect {
    let nav = state.portal().sign_out();
    state.redirect(nav)
}

pub(crate) async fn dashboard(
    State(state): State<AppState>,
    Query(query): Query<DashboardQuery>,
) -> Response {
    let user = state.portal().session.user().cloned();
    let Some(user) = user else {
        return Redirect::to(&state.href("/login")).into_response();
    };
    let base = state.href("");
    let cfg = &state.config;

    // Backend fetches end with the request.
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();
    let client = state.client_for(Some(&user));

    let remote = match user.role {
        Role::Admin => {
            let mut board = state.board.lock().await;
            let error = match cancellable(&cancel, board.refresh(&client)).await {
                Some(Err(e)) => {
                    warn!("Failed to load teams: {}", e);
                    Some(e.to_string())
                }
                _ => None,
            };
            views::render_teams(&base, &board, error.as_deref())
        }
        Role::SdgpAdmin => {
            let (lecturers, error) = match cancellable(&cancel, client.list_lecturers()).await {
                Some(Ok(lecturers)) => (lecturers, None),
                Some(Err(e)) => {
                    warn!("Failed to load lecturers: {}", e);
                    (Vec::new(), Some(e.to_string()))
                }
                None => (Vec::new(), None),
            };
            views::render_lecturers(&base, &lecturers, error.as_deref())
        }
        Role::Student | Role::Lecturer => String::new(),
    };

    let mut portal = state.portal();
    let mut body = String::new();
    match user.role {
        Role::Student => {
            let candidates = portal.roster.candidates(&cfg.students, &query.q);
            body.push_str(&views::render_roster(&base, &portal.roster, &candidates, &query.q));
            body.push_str(&views::render_booking(
                &base,
                &portal.booking,
                &cfg.mentors,
                calendar::today(cfg.timezone),
            ));
        }
        Role::Lecturer => {
            let availability = portal.availability.get(&user.id).cloned().unwrap_or_default();
            body.push_str(&views::render_availability(&base, &availability));
        }
        Role::Admin => {
            body.push_str(&views::render_viva(&base, &portal.viva, &cfg.cohort.groups));
            body.push_str(&remote);
        }
        Role::SdgpAdmin => body.push_str(&remote),
    }
    let mut groups = cfg.cohort.groups.clone();
    for group in portal.timetable.groups() {
        if !groups.iter().any(|g| g == group) {
            groups.push(group.to_string());
        }
    }
    body.push_str(&views::render_group_links(&base, &groups));

    let title = format!("{} dashboard", views::role_title(user.role));
    render(&state, &mut portal, &title, body).into_response()
}

pub(crate) async fn timetable_page(
    State(state): State<AppState>,
    Path(group): Path<String>,
) -> Response {
    let mut portal = state.portal();
    let Some(role) = portal.session.role() else {
        return Redirect::to(&state.href("/login")).into_response();
    };
    let base = state.href("");

    let body = {
        let sessions: Vec<&Session> = portal.timetable.for_group(&group).collect();
        let mut body = views::render_grid(&sessions);
        if role == Role::SdgpAdmin {
            body.push_str(&views::render_timetable_editor(&base, &group, &sessions));
        }
        body
    };
    render(&state, &mut portal, &format!("Timetable {group}"), body).into_response()
}
