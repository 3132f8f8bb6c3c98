// src/server/mod.rs

pub mod handlers;
pub mod views;

use std::{convert::Infallible, net::SocketAddr, sync::Arc, time::Duration};
use tracing::{info, warn};
use warp::{
    http::{header, HeaderValue},
    multipart::FormData,
    reply::{Reply, Response},
    Filter,
};

use crate::{
    cleanup::schedule_cleanup,
    config::AppConfig,
    render::{DocumentConverter, DocumentRenderer},
    session::{SessionId, SessionStore, UploadSession},
    workspace::Workspace,
};

pub const SESSION_COOKIE: &str = "session_id";
const SESSION_MAINTENANCE_INTERVAL: Duration = Duration::from_secs(30);

/// Everything a handler needs, passed explicitly into each route.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub sessions: Arc<SessionStore>,
    pub workspace: Workspace,
    pub renderer: DocumentRenderer,
}

impl AppState {
    pub fn new(config: AppConfig, converter: Arc<dyn DocumentConverter>) -> Self {
        let workspace = Workspace::new(&config.data_dir);
        let sessions = {
            let workspace = workspace.clone();
            let delay = config.cleanup_delay;
            SessionStore::new(
                config.session_capacity,
                config.session_idle,
                Arc::new(move |upload: UploadSession| {
                    schedule_cleanup(workspace.cycle(upload.cycle).all(), delay)
                }),
            )
        };
        Self {
            workspace,
            renderer: DocumentRenderer::new(converter),
            sessions: Arc::new(sessions),
            config: Arc::new(config),
        }
    }

    /// Resolve the caller's session from its cookie. A missing or malformed
    /// cookie gets a fresh id; nothing is stored until the session has state.
    pub fn caller(&self, cookie: Option<String>) -> Caller {
        match cookie.and_then(|c| c.parse::<SessionId>().ok()) {
            Some(id) => Caller { id, fresh: false },
            None => Caller {
                id: SessionId::new(),
                fresh: true,
            },
        }
    }

    /// Periodically apply session expiry, so idle cycles are reclaimed even
    /// without traffic.
    pub fn start_session_maintenance(&self) {
        let sessions = Arc::clone(&self.sessions);
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(SESSION_MAINTENANCE_INTERVAL);
            loop {
                tick.tick().await;
                sessions.run_maintenance();
            }
        });
    }
}

/// The session a request runs under.
#[derive(Debug, Clone, Copy)]
pub struct Caller {
    pub id: SessionId,
    pub fresh: bool,
}

impl Caller {
    /// Add the session cookie to `resp` when the session was just opened.
    pub fn attach(self, mut resp: Response) -> Response {
        if self.fresh {
            let cookie = format!("{SESSION_COOKIE}={}; Path=/; HttpOnly; SameSite=Lax", self.id);
            match HeaderValue::from_str(&cookie) {
                Ok(value) => {
                    resp.headers_mut().append(header::SET_COOKIE, value);
                }
                Err(e) => warn!("cannot encode session cookie: {}", e),
            }
        }
        resp
    }
}

fn with_state(state: AppState) -> impl Filter<Extract = (AppState,), Error = Infallible> + Clone {
    warp::any().map(move || state.clone())
}

fn session_cookie() -> impl Filter<Extract = (Option<String>,), Error = Infallible> + Clone {
    warp::cookie::optional::<String>(SESSION_COOKIE)
}

/// The full route table.
pub fn routes(
    state: AppState,
) -> impl Filter<Extract = (impl Reply,), Error = warp::Rejection> + Clone {
    let max_upload = state.config.max_upload_bytes;

    let index = warp::path::end()
        .and(warp::get())
        .and(with_state(state.clone()))
        .and(session_cookie())
        .and_then(handlers::index);

    // A request that is not a readable multipart form still reaches the
    // handler so it can answer with a notice.
    let form = warp::multipart::form()
        .max_length(max_upload)
        .map(Some)
        .or(warp::any().map(|| None::<FormData>))
        .unify();
    let upload = warp::path("upload")
        .and(warp::path::end())
        .and(warp::post())
        .and(with_state(state.clone()))
        .and(session_cookie())
        .and(form)
        .and_then(handlers::upload);

    let display = warp::path("display")
        .and(warp::path::end())
        .and(warp::get())
        .and(with_state(state.clone()))
        .and(session_cookie())
        .and_then(handlers::display);

    let download_zip = warp::path("download_zip")
        .and(warp::path::end())
        .and(warp::get())
        .and(with_state(state.clone()))
        .and(session_cookie())
        .and_then(handlers::download_zip);

    let download_city = warp::path("download")
        .and(warp::path::param::<String>())
        .and(warp::path::end())
        .and(warp::get())
        .and(warp::query::<handlers::DownloadQuery>())
        .and(with_state(state))
        .and(session_cookie())
        .and_then(handlers::download_city);

    let health = warp::path("health")
        .and(warp::path::end())
        .and(warp::get())
        .and_then(handlers::health);

    index
        .or(upload)
        .unify()
        .or(display)
        .unify()
        .or(download_zip)
        .unify()
        .or(download_city)
        .unify()
        .or(health)
        .unify()
        .with(warp::trace::request())
}

/// Serve until the process is stopped.
pub async fn serve(state: AppState) {
    let addr = SocketAddr::new(state.config.host, state.config.port);
    info!("listening on http://{}", addr);
    info!("data dir: {}", state.config.data_dir.display());
    state.start_session_maintenance();
    warp::serve(routes(state)).run(addr).await;
}
