// JSON handlers: view, cards, history, refresh, and the status-check service

use axum::{
    Json,
    extract::{Path, Query, State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use serde::Deserialize;

use super::AppState;
use crate::fetcher::StatusFetcher;
use crate::models::{HistoryRange, active_only};
use crate::models::wire::{CheckRequest, CheckResponse};
use crate::presentation::build_cards;
use crate::registry::DescriptorSource;

const DEFAULT_HISTORY_LIMIT: u32 = 100;
const MAX_HISTORY_LIMIT: u32 = 1000;

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(serde_json::json!({ "error": message.into() }))).into_response()
}

/// GET /version: service name and version (from Cargo.toml at build time).
pub(super) async fn version_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// GET /api/stats: raw aggregate view plus scheduler state and last merge time.
pub(super) async fn stats_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "state": state.view.state(),
        "lastUpdate": state.view.last_updated(),
        "stats": state.view.view(),
    }))
}

/// GET /api/servers: one display card per active server.
pub(super) async fn servers_handler(State(state): State<AppState>) -> Response {
    let descriptors = match state.registry.descriptors().await {
        Ok(d) => active_only(d),
        Err(e) => {
            tracing::warn!(error = %e, operation = "read_registry", "server list unavailable");
            return error_response(StatusCode::BAD_GATEWAY, format!("registry unavailable: {e}"));
        }
    };
    let view = state.view.view();
    Json(build_cards(&descriptors, &view, Utc::now(), state.stale_after)).into_response()
}

#[derive(Debug, Deserialize)]
pub(super) struct HistoryQuery {
    limit: Option<u32>,
    range: Option<HistoryRange>,
}

/// GET /api/servers/{id}/history?limit=N | ?range=day|week|month: oldest first.
/// `range` returns bucketed averages over the window and takes precedence over `limit`.
pub(super) async fn history_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Response {
    let Some(repo) = state.stats_repo.as_ref() else {
        return error_response(StatusCode::NOT_FOUND, "history storage is not enabled");
    };
    let result = match query.range {
        Some(range) => repo.get_history_range(&id, range, Utc::now()).await,
        None => {
            let limit = query
                .limit
                .unwrap_or(DEFAULT_HISTORY_LIMIT)
                .clamp(1, MAX_HISTORY_LIMIT);
            repo.get_history(&id, limit).await
        }
    };
    match result {
        Ok(points) => Json(serde_json::json!({ "serverId": id, "history": points })).into_response(),
        Err(e) => {
            tracing::warn!(error = %e, server_id = %id, operation = "get_history", "history query failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "history query failed")
        }
    }
}

/// POST /api/refresh: run a probe cycle now (queued behind one in flight).
pub(super) async fn refresh_handler(State(state): State<AppState>) -> Response {
    match state.view.refresh().await {
        Some(outcome) => Json(outcome).into_response(),
        None => error_response(StatusCode::CONFLICT, "scheduler is not polling"),
    }
}

/// POST /api/check: pings every active, addressable server in the body and
/// answers `{success, stats, checkedServers}`.
pub(super) async fn check_handler(
    State(state): State<AppState>,
    payload: Result<Json<CheckRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(p) => p,
        Err(rejection) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                format!("Invalid JSON in request body: {}", rejection.body_text()),
            );
        }
    };
    if request.servers.len() > state.max_check_servers {
        return error_response(
            StatusCode::PAYLOAD_TOO_LARGE,
            format!(
                "too many servers in one check: {} (max {})",
                request.servers.len(),
                state.max_check_servers
            ),
        );
    }
    let servers: Vec<_> = request
        .servers
        .into_iter()
        .filter(|s| s.active && !s.id.is_empty() && !s.address.is_empty())
        .collect();

    match state.checker.fetch(&servers).await {
        Ok(stats) => Json(CheckResponse {
            success: true,
            checked_servers: stats.len(),
            stats,
        })
        .into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, format!("Server error: {e}")),
    }
}
