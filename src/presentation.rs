// Presentation adapter: descriptors + view -> display cards. Pure, re-derived per request.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;

use crate::models::{AggregateView, DEFAULT_PORT, ServerDescriptor};

/// Player names shown before collapsing the rest into a count.
pub const PLAYER_PREVIEW_LEN: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayStatus {
    Online,
    Offline,
    /// No snapshot yet for this server.
    Pending,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerCard {
    pub id: String,
    pub name: String,
    pub address: String,
    pub status: DisplayStatus,
    /// Snapshot is older than the staleness threshold. Never set for `Pending`.
    pub stale: bool,
    pub online_players: u32,
    pub max_players: u32,
    pub fill_percent: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ping: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub motd: Option<String>,
    pub players_preview: Vec<String>,
    pub players_hidden: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_update: Option<DateTime<Utc>>,
}

/// `host` for the default port, `host:port` otherwise.
pub fn format_address(address: &str, port: u16) -> String {
    if port == DEFAULT_PORT {
        address.to_string()
    } else {
        format!("{address}:{port}")
    }
}

/// Percentage full, clamped to 0..=100; 0 when capacity is unknown.
pub fn fill_percent(online: u32, max: u32) -> f64 {
    if max == 0 {
        return 0.0;
    }
    (f64::from(online) / f64::from(max) * 100.0).clamp(0.0, 100.0)
}

pub fn build_card(
    descriptor: &ServerDescriptor,
    view: &AggregateView,
    now: DateTime<Utc>,
    stale_after: Duration,
) -> ServerCard {
    let address = format_address(&descriptor.address, descriptor.port);
    let Some(s) = view.get(&descriptor.id) else {
        return ServerCard {
            id: descriptor.id.clone(),
            name: descriptor.name.clone(),
            address,
            status: DisplayStatus::Pending,
            stale: false,
            online_players: 0,
            max_players: descriptor.max_players,
            fill_percent: 0.0,
            ping: None,
            version: descriptor.version.clone(),
            motd: None,
            players_preview: Vec::new(),
            players_hidden: 0,
            last_update: None,
        };
    };

    let age = (now - s.last_update).to_std().unwrap_or(Duration::ZERO);
    let preview: Vec<String> = s
        .player_list
        .iter()
        .take(PLAYER_PREVIEW_LEN)
        .cloned()
        .collect();
    ServerCard {
        id: descriptor.id.clone(),
        name: descriptor.name.clone(),
        address,
        status: if s.is_online {
            DisplayStatus::Online
        } else {
            DisplayStatus::Offline
        },
        stale: age > stale_after,
        online_players: s.online_players,
        max_players: s.max_players,
        fill_percent: fill_percent(s.online_players, s.max_players),
        ping: s.is_online.then_some(s.ping),
        version: s.version.clone(),
        motd: s.motd.clone(),
        players_hidden: s.player_list.len() - preview.len(),
        players_preview: preview,
        last_update: Some(s.last_update),
    }
}

/// One card per descriptor, in registry order.
pub fn build_cards(
    descriptors: &[ServerDescriptor],
    view: &AggregateView,
    now: DateTime<Utc>,
    stale_after: Duration,
) -> Vec<ServerCard> {
    descriptors
        .iter()
        .map(|d| build_card(d, view, now, stale_after))
        .collect()
}
