// WebSocket stream of merged stats updates

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use bytes::Bytes;
use tokio::sync::broadcast;
use tokio::time::{Duration, timeout};

use super::AppState;
use crate::models::StatsUpdate;
use crate::scheduler::ViewHandle;

pub(super) const WS_PING_INTERVAL: Duration = Duration::from_secs(30);
pub(super) const WS_SEND_TIMEOUT: Duration = Duration::from_secs(10);

pub(super) async fn ws_stats(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let view = state.view.clone();
    ws.on_upgrade(move |socket| async move {
        // Subscribe before the welcome view so no merge falls in between.
        let rx = view.subscribe();
        if let Err(e) = stream_stats(socket, rx, view).await {
            tracing::info!("Stats stream error: {}", e);
        }
    })
}

/// Sends `false` when the client is gone or too slow.
async fn send_text(socket: &mut WebSocket, json: String) -> bool {
    let r = timeout(WS_SEND_TIMEOUT, socket.send(Message::Text(json.into()))).await;
    matches!(r, Ok(Ok(())))
}

async fn stream_stats(
    mut socket: WebSocket,
    mut rx: broadcast::Receiver<StatsUpdate>,
    view: ViewHandle,
) -> anyhow::Result<()> {
    tracing::info!("Client connected to stats stream");

    let welcome = serde_json::json!({
        "type": "view",
        "lastUpdate": view.last_updated(),
        "stats": view.view(),
    });
    if !send_text(&mut socket, serde_json::to_string(&welcome)?).await {
        return Ok(());
    }

    // First ping one interval after the welcome.
    let mut ping_interval =
        tokio::time::interval_at(tokio::time::Instant::now() + WS_PING_INTERVAL, WS_PING_INTERVAL);
    ping_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            result = rx.recv() => {
                match result {
                    Ok(update) => {
                        let msg = serde_json::json!({
                            "type": "update",
                            "timestamp": update.timestamp,
                            "stats": update.stats,
                        });
                        if !send_text(&mut socket, serde_json::to_string(&msg)?).await {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!("WebSocket /ws/stats client lagged, skipped {} updates", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            _ = ping_interval.tick() => {
                let r = timeout(WS_SEND_TIMEOUT, socket.send(Message::Ping(Bytes::new()))).await;
                if r.is_err() || r.unwrap_or(Ok(())).is_err() {
                    break;
                }
            }
        }
    }
    Ok(())
}
