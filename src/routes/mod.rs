// HTTP + WebSocket routes

mod http;
mod ws;

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};

use crate::fetcher::DirectFetcher;
use crate::registry::Registry;
use crate::scheduler::ViewHandle;
use crate::stats_repo::StatsRepo;

/// Everything the handlers read from.
pub struct AppDeps {
    pub view: ViewHandle,
    pub registry: Arc<Registry>,
    /// Pinger backing `POST /api/check`.
    pub checker: DirectFetcher,
    /// Largest batch `POST /api/check` will ping.
    pub max_check_servers: usize,
    /// `None` when `[storage]` is not configured.
    pub stats_repo: Option<Arc<StatsRepo>>,
    pub stale_after: Duration,
}

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) view: ViewHandle,
    pub(crate) registry: Arc<Registry>,
    pub(crate) checker: Arc<DirectFetcher>,
    pub(crate) max_check_servers: usize,
    pub(crate) stats_repo: Option<Arc<StatsRepo>>,
    pub(crate) stale_after: Duration,
}

pub fn app(deps: AppDeps) -> Router {
    let state = AppState {
        view: deps.view,
        registry: deps.registry,
        checker: Arc::new(deps.checker),
        max_check_servers: deps.max_check_servers,
        stats_repo: deps.stats_repo,
        stale_after: deps.stale_after,
    };
    Router::new()
        .route("/", get(|| async { "mcstatus: server status aggregator" })) // GET /
        .route("/version", get(http::version_handler)) // GET /version
        .route("/api/stats", get(http::stats_handler)) // GET /api/stats
        .route("/api/servers", get(http::servers_handler)) // GET /api/servers
        .route("/api/servers/{id}/history", get(http::history_handler)) // GET /api/servers/{id}/history
        .route("/api/refresh", post(http::refresh_handler)) // POST /api/refresh
        .route("/api/check", post(http::check_handler)) // POST /api/check
        .route("/ws/stats", get(ws::ws_stats)) // WS /ws/stats
        .layer(CorsLayer::new().allow_origin(Any).allow_headers(Any))
        .with_state(state)
}
