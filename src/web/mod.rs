pub mod actions;
pub mod dashboard;
pub mod views;

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use anyhow::{Context, Result};
use axum::response::Redirect;
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::services::ServeDir;
use tracing::{info, warn};

use crate::availability::Availability;
use crate::booking::BookingWizard;
use crate::gateway::PortalClient;
use crate::models::{Config, User};
use crate::notice::Notices;
use crate::session::{Navigation, SessionStore};
use crate::store::LocalStore;
use crate::team::{Roster, TeamBoard};
use crate::timetable::Timetable;
use crate::viva::{VivaStep, VivaWizard};

/// Everything the dashboard mutates, behind one lock.
pub(crate) struct Portal {
    pub(crate) session: SessionStore,
    pub(crate) timetable: Timetable,
    pub(crate) availability: BTreeMap<String, Availability>,
    pub(crate) roster: Roster,
    pub(crate) booking: BookingWizard,
    pub(crate) viva: VivaWizard,
    pub(crate) notices: Notices,
    store: LocalStore,
    viva_cancel: Option<CancellationToken>,
}

impl Portal {
    pub(crate) fn new(config: &Config) -> Self {
        let store = LocalStore::new(&config.server.state_dir);
        Self {
            session: SessionStore::new(),
            timetable: store.load_timetable(),
            availability: store.load_availability(),
            roster: Roster::new("My team", config.cohort.team_size),
            booking: BookingWizard::default(),
            viva: VivaWizard::default(),
            notices: Notices::new(Duration::from_millis(config.timing.notice_ms)),
            store,
            viva_cancel: None,
        }
    }

    pub(crate) fn save_timetable(&mut self) {
        if let Err(e) = self.store.save_timetable(&self.timetable) {
            warn!("{:#}", e);
            self.notices.error(format!("{e:#}"));
        }
    }

    pub(crate) fn save_availability(&mut self) {
        if let Err(e) = self.store.save_availability(&self.availability) {
            warn!("{:#}", e);
            self.notices.error(format!("{e:#}"));
        }
    }

    /// Sign in and start the user's workflows from scratch.
    pub(crate) fn sign_in(&mut self, user: User, team_size: usize) -> Navigation {
        self.stop_viva();
        self.roster = Roster::new(format!("{}'s team", user.name), team_size);
        self.booking = BookingWizard::default();
        self.viva = VivaWizard::default();
        self.session.login(user)
    }

    pub(crate) fn sign_out(&mut self) -> Navigation {
        self.stop_viva();
        self.notices.clear();
        self.session.logout()
    }

    fn stop_viva(&mut self) {
        if let Some(token) = self.viva_cancel.take() {
            token.cancel();
        }
    }
}

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) config: Arc<Config>,
    pub(crate) client: PortalClient,
    pub(crate) portal: Arc<Mutex<Portal>>,
    pub(crate) board: Arc<tokio::sync::Mutex<TeamBoard>>,
}

impl AppState {
    pub(crate) fn new(config: Config) -> Result<Self> {
        let client = PortalClient::new(&config.api.base_url)?;
        let portal = Portal::new(&config);
        Ok(Self {
            config: Arc::new(config),
            client,
            portal: Arc::new(Mutex::new(portal)),
            board: Arc::new(tokio::sync::Mutex::new(TeamBoard::default())),
        })
    }

    pub(crate) fn portal(&self) -> MutexGuard<'_, Portal> {
        self.portal.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Gateway client carrying the signed-in user's token, if any.
    pub(crate) fn client_for(&self, user: Option<&User>) -> PortalClient {
        self.client
            .clone()
            .with_token(user.and_then(|u| u.token.clone()))
    }

    /// Absolute path under the configured base path.
    pub(crate) fn href(&self, path: &str) -> String {
        format!("{}{}", self.config.server.base_path.trim_end_matches('/'), path)
    }

    pub(crate) fn redirect(&self, nav: Navigation) -> Redirect {
        match nav {
            Navigation::Root => {
                let base = self.href("");
                Redirect::to(if base.is_empty() { "/" } else { &base })
            }
            Navigation::Dashboard(_) => Redirect::to(&self.href("/dashboard")),
        }
    }

    /// Run the viva processing delay in the background and complete the
    /// wizard when it elapses. Signing out cancels it.
    pub(crate) fn spawn_viva_processing(&self) {
        let delay = Duration::from_millis(self.config.timing.viva_processing_ms);
        let cancel = CancellationToken::new();
        let mut wizard = {
            let mut portal = self.portal();
            if let Some(old) = portal.viva_cancel.replace(cancel.clone()) {
                old.cancel();
            }
            portal.viva.clone()
        };
        let shared = Arc::clone(&self.portal);
        tokio::spawn(async move {
            match wizard.process(delay, &cancel).await {
                Ok(true) => {
                    let mut portal = shared.lock().unwrap_or_else(PoisonError::into_inner);
                    if portal.viva.step() == VivaStep::Processing {
                        portal.viva = wizard;
                        portal.notices.success("Viva scheduling request recorded");
                    }
                    portal.viva_cancel = None;
                }
                Ok(false) => {}
                Err(e) => warn!("Viva processing failed: {}", e),
            }
        });
    }
}

pub(crate) fn router(state: AppState) -> Router {
    let routes = Router::new()
        .route("/", get(dashboard::root))
        .route("/login", get(dashboard::login_page).post(dashboard::login))
        .route("/logout", post(dashboard::logout))
        .route("/dashboard", get(dashboard::dashboard))
        .route("/timetable/{group}", get(dashboard::timetable_page))
        .route("/timetable/{group}/add", post(actions::timetable_add))
        .route("/timetable/{group}/remove", post(actions::timetable_remove))
        .route("/timetable/{group}/import", post(actions::timetable_import))
        .route("/lecturers/add", post(actions::lecturer_add))
        .route("/roster/add", post(actions::roster_add))
        .route("/roster/remove", post(actions::roster_remove))
        .route("/roster/confirm", post(actions::roster_confirm))
        .route("/availability/add", post(actions::availability_add))
        .route("/availability/edit", post(actions::availability_edit))
        .route("/availability/remove", post(actions::availability_remove))
        .route("/booking/date", post(actions::booking_date))
        .route("/booking/mentor", post(actions::booking_mentor))
        .route("/booking/review", post(actions::booking_review))
        .route("/booking/cancel", post(actions::booking_cancel))
        .route("/booking/back", post(actions::booking_back))
        .route("/booking/confirm", post(actions::booking_confirm))
        .route("/viva/group", post(actions::viva_group))
        .route("/viva/slot", post(actions::viva_slot))
        .route("/viva/slot/remove", post(actions::viva_slot_remove))
        .route("/viva/next", post(actions::viva_next))
        .route("/viva/back", post(actions::viva_back))
        .route("/viva/reset", post(actions::viva_reset))
        .route("/teams/leader", post(actions::team_leader))
        .route("/teams/approve", post(actions::team_approve))
        .route("/teams/reject", post(actions::team_reject));

    let assets = ServeDir::new(&state.config.server.output_dir);
    let base = state.config.server.base_path.trim_end_matches('/').to_string();
    let routes = routes.fallback_service(assets).with_state(state);
    if base.is_empty() {
        routes
    } else {
        Router::new().nest(&base, routes)
    }
}

pub async fn serve(config: Config, addr: &str) -> Result<()> {
    let base_path = config.server.base_path.clone();
    let output_dir = config.server.output_dir.clone();
    let app = router(AppState::new(config)?);

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!(
        "Portal listening on http://{}{} (assets from {})",
        addr, base_path, output_dir
    );
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use axum::body::Body;
    use axum::http::header::{CONTENT_TYPE, LOCATION};
    use axum::http::{Request, StatusCode};
    use axum::response::Response;
    use tempfile::TempDir;
    use tower::ServiceExt;

    use super::*;
    use crate::gateway::tests::{spawn_backend, Backend};
    use crate::models::Student;

    fn config(dir: &TempDir) -> Config {
        let mut cfg = Config::default();
        cfg.server.base_path = "/portal".into();
        cfg.server.state_dir = dir.path().display().to_string();
        cfg.server.output_dir = dir.path().join("dist").display().to_string();
        cfg.cohort.team_size = 2;
        cfg.timing.viva_processing_ms = 10;
        cfg.students = (1..=3)
            .map(|n| Student {
                id: format!("w{n}"),
                name: format!("Student {n}"),
                email: format!("student{n}@uni.ac"),
                group: None,
            })
            .collect();
        cfg
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn send(app: &Router, req: Request<Body>) -> Response {
        app.clone().oneshot(req).await.unwrap()
    }

    async fn text(resp: Response) -> String {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn location(resp: &Response) -> &str {
        resp.headers().get(LOCATION).unwrap().to_str().unwrap()
    }

    async fn sign_in(app: &Router, role: &str) {
        let resp = send(app, post("/portal/login", &format!("username=kim&password=pw&role={role}"))).await;
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&resp), "/portal/dashboard");
    }

    #[tokio::test]
    async fn test_dashboard_requires_sign_in() {
        let dir = tempfile::tempdir().unwrap();
        let app = router(AppState::new(config(&dir)).unwrap());

        let resp = send(&app, get("/portal/dashboard")).await;
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&resp), "/portal/login");

        let resp = send(&app, post("/portal/login", "username=&password=pw&role=student")).await;
        assert_eq!(location(&resp), "/portal/login");
        let page = text(send(&app, get("/portal/login")).await).await;
        assert!(page.contains("username is required"));
    }

    #[tokio::test]
    async fn test_student_assembles_and_confirms_team() {
        let dir = tempfile::tempdir().unwrap();
        let app = router(AppState::new(config(&dir)).unwrap());
        sign_in(&app, "student").await;

        send(&app, post("/portal/roster/add", "student_id=w1")).await;
        send(&app, post("/portal/roster/confirm", "")).await;
        let page = text(send(&app, get("/portal/dashboard")).await).await;
        assert!(page.contains("Student dashboard"));
        assert!(page.contains("a team needs exactly 2 members to be confirmed (currently 1)"));

        send(&app, post("/portal/roster/add", "student_id=w2")).await;
        send(&app, post("/portal/roster/add", "student_id=w3")).await;
        let resp = send(&app, post("/portal/roster/confirm", "")).await;
        assert_eq!(location(&resp), "/portal/dashboard");

        let page = text(send(&app, get("/portal/dashboard?q=student")).await).await;
        assert!(page.contains("team is full (2 members maximum)"));
        assert!(page.contains("team is registered"));
        assert!(page.contains("Confirmed"));
    }

    #[tokio::test]
    async fn test_lecturer_availability_is_saved() {
        let dir = tempfile::tempdir().unwrap();
        let app = router(AppState::new(config(&dir)).unwrap());
        sign_in(&app, "lecturer").await;

        send(&app, post("/portal/availability/add", "day=Monday")).await;
        send(&app, post("/portal/availability/add", "day=Monday")).await;
        send(
            &app,
            post("/portal/availability/edit", "day=Monday&index=1&start=09:00&end=10:00"),
        )
        .await;
        send(
            &app,
            post("/portal/availability/edit", "day=Monday&index=0&start=11:00&end=10:00"),
        )
        .await;

        let saved = LocalStore::new(dir.path()).load_availability();
        let slots = saved["lecturer-kim"].slots(chrono::Weekday::Mon);
        assert_eq!(slots.len(), 2);
        assert_eq!(slots[0].to_string(), "00:00-00:00");
        assert_eq!(slots[1].to_string(), "09:00-10:00");

        let page = text(send(&app, get("/portal/dashboard")).await).await;
        assert!(page.contains("end time 10:00 must be after start time 11:00"));
    }

    #[tokio::test]
    async fn test_admin_approval_needs_leader() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Backend::default();
        let mut cfg = config(&dir);
        cfg.api.base_url = spawn_backend(backend.clone()).await;
        let app = router(AppState::new(cfg).unwrap());
        sign_in(&app, "admin").await;

        let page = text(send(&app, get("/portal/dashboard")).await).await;
        assert!(page.contains("Team Rocket"));
        let calls = backend.calls.load(Ordering::SeqCst);

        send(&app, post("/portal/teams/approve", "team_id=1")).await;
        assert_eq!(backend.calls.load(Ordering::SeqCst), calls);
        assert!(backend.approved.lock().unwrap().is_empty());

        send(&app, post("/portal/teams/leader", "team_id=1&member_id=11")).await;
        send(&app, post("/portal/teams/approve", "team_id=1")).await;
        assert_eq!(backend.approved.lock().unwrap().len(), 1);

        let page = text(send(&app, get("/portal/dashboard")).await).await;
        assert!(page.contains("select a leader before approving the team"));
        assert!(page.contains("Team 1 approved"));
    }

    #[tokio::test]
    async fn test_viva_wizard_completes_after_delay() {
        let dir = tempfile::tempdir().unwrap();
        let state = AppState::new(config(&dir)).unwrap();
        let app = router(state.clone());
        sign_in(&app, "admin").await;

        send(&app, post("/portal/viva/next", "")).await;
        assert_eq!(state.portal().viva.step(), VivaStep::AdminAvailability);

        send(&app, post("/portal/viva/group", "group=CS-G1")).await;
        send(&app, post("/portal/viva/slot", "date=2025-03-21&start=09:00&end=10:00")).await;
        send(&app, post("/portal/viva/next", "")).await;
        send(
            &app,
            post("/portal/viva/slot", "date=2025-03-21&start=10:00&end=11:00&lecturer=Dr+Smith"),
        )
        .await;
        send(&app, post("/portal/viva/next", "")).await;
        assert_ne!(state.portal().viva.step(), VivaStep::LecturerAvailability);

        tokio::time::sleep(Duration::from_millis(200)).await;
        let portal = state.portal();
        assert_eq!(portal.viva.step(), VivaStep::Complete);
        let request = portal.viva.request().unwrap();
        assert_eq!(request.lecturer_slots["Dr Smith"].len(), 1);
    }

    #[tokio::test]
    async fn test_timetable_editing_and_assets() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("dist")).unwrap();
        std::fs::write(dir.path().join("dist").join("app.js"), "console.log(1)").unwrap();
        let app = router(AppState::new(config(&dir)).unwrap());
        sign_in(&app, "sdgp_admin").await;

        let resp = send(
            &app,
            post(
                "/portal/timetable/CS-G1/add",
                "lecturer=Dr+Smith&module=Algorithms&day=Tuesday&start=09:00&end=10:30\
                 &kind=Lecture&building=SP&classroom=4LA",
            ),
        )
        .await;
        assert_eq!(location(&resp), "/portal/timetable/CS-G1");

        let page = text(send(&app, get("/portal/timetable/CS-G1")).await).await;
        assert!(page.contains("Algorithms"));
        assert!(page.contains("Import CSV"));
        assert!(page.contains("value=\"Tutorial\""));
        assert_eq!(LocalStore::new(dir.path()).load_timetable().sessions().len(), 1);

        let resp = send(&app, get("/portal/app.js")).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(text(resp).await, "console.log(1)");
    }

    #[tokio::test]
    async fn test_logout_returns_to_root() {
        let dir = tempfile::tempdir().unwrap();
        let app = router(AppState::new(config(&dir)).unwrap());
        sign_in(&app, "student").await;

        let resp = send(&app, post("/portal/logout", "")).await;
        assert_eq!(location(&resp), "/portal");
        let resp = send(&app, get("/portal")).await;
        assert_eq!(location(&resp), "/portal/login");
    }
}
