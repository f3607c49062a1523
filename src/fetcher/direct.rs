// Direct fetcher: pings every server itself instead of calling a remote service.
// Unreachable servers come back as offline snapshots; the batch never fails.

use std::time::Duration;

use chrono::Utc;
use futures_util::{StreamExt, stream};

use super::{FetchFailed, StatusFetcher};
use crate::models::{ServerDescriptor, StatsMap, StatusSnapshot};
use crate::slp;

#[derive(Debug, Clone)]
pub struct DirectFetcher {
    ping_timeout: Duration,
    max_concurrent: usize,
}

impl DirectFetcher {
    /// `max_concurrent` caps pings (open sockets) in flight per batch; 0 is treated as 1.
    pub fn new(ping_timeout: Duration, max_concurrent: usize) -> Self {
        Self {
            ping_timeout,
            max_concurrent: max_concurrent.max(1),
        }
    }

    /// Pings one server and builds its snapshot.
    pub async fn ping_server(&self, server: &ServerDescriptor) -> StatusSnapshot {
        match slp::ping(&server.address, server.port, self.ping_timeout).await {
            Ok(reply) => snapshot_from_reply(server, reply),
            Err(e) => {
                tracing::debug!(
                    server_id = %server.id,
                    address = %server.address,
                    port = server.port,
                    error = %e,
                    "server unreachable"
                );
                StatusSnapshot::offline(server.max_players, server.version.clone())
            }
        }
    }
}

/// Reported capacity of 0 or an empty version fall back to the descriptor.
pub(crate) fn snapshot_from_reply(server: &ServerDescriptor, reply: slp::PingReply) -> StatusSnapshot {
    let max_players = if reply.max_players > 0 {
        reply.max_players
    } else {
        server.max_players
    };
    let version = if reply.version.is_empty() {
        server.version.clone()
    } else {
        Some(reply.version)
    };
    StatusSnapshot {
        is_online: true,
        online_players: reply.online_players,
        max_players,
        ping: reply.latency_ms,
        version,
        motd: Some(reply.motd).filter(|m| !m.is_empty()),
        player_list: reply.player_sample,
        last_update: Utc::now(),
    }
}

impl StatusFetcher for DirectFetcher {
    async fn fetch(&self, servers: &[ServerDescriptor]) -> Result<StatsMap, FetchFailed> {
        let pings: Vec<_> = servers
            .iter()
            .map(|s| async move { (s.id.clone(), self.ping_server(s).await) })
            .collect();
        Ok(stream::iter(pings)
            .buffer_unordered(self.max_concurrent)
            .collect()
            .await)
    }
}
