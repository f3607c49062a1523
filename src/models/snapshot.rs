// Per-server status snapshot and the aggregate view built from them

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Probe results keyed by server id, as returned by one fetch.
pub type StatsMap = BTreeMap<String, StatusSnapshot>;

/// Result of the most recent probe for one server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    pub is_online: bool,
    #[serde(default, deserialize_with = "lenient_count")]
    pub online_players: u32,
    /// Live-reported capacity (may differ from the descriptor).
    #[serde(default, deserialize_with = "lenient_count")]
    pub max_players: u32,
    /// Round-trip latency in ms; 0 when offline.
    #[serde(default, deserialize_with = "lenient_count")]
    pub ping: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub motd: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub player_list: Vec<String>,
    #[serde(default = "Utc::now")]
    pub last_update: DateTime<Utc>,
}

/// Null, negative or fractional counts from a status service are read as the
/// nearest value in `0..=u32::MAX` instead of failing the whole batch.
fn lenient_count<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<f64>::deserialize(deserializer)?;
    // Float-to-int `as` saturates, so the upper bound needs no extra check.
    Ok(raw.map_or(0, |n| n.max(0.0).round() as u32))
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

impl StatusSnapshot {
    /// Snapshot for a server that could not be reached.
    pub fn offline(max_players: u32, version: Option<String>) -> Self {
        Self {
            is_online: false,
            online_players: 0,
            max_players,
            ping: 0,
            version,
            motd: None,
            player_list: Vec::new(),
            last_update: Utc::now(),
        }
    }
}

/// Current snapshot per server id. Absent ids have never been probed successfully.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AggregateView {
    entries: BTreeMap<String, StatusSnapshot>,
}

impl AggregateView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<&StatusSnapshot> {
        self.entries.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &StatusSnapshot)> {
        self.entries.iter()
    }

    /// Union-merge: every incoming id overwrites its entry whole, every other id is kept.
    /// Returns the number of entries written.
    pub fn merge_from(&mut self, incoming: StatsMap) -> usize {
        let n = incoming.len();
        self.entries.extend(incoming);
        n
    }

    /// Drops entries whose id is not in `keep`. Never called by a probe cycle.
    pub fn prune_to(&mut self, keep: &HashSet<String>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|id, _| keep.contains(id));
        before - self.entries.len()
    }
}

impl From<StatsMap> for AggregateView {
    fn from(entries: StatsMap) -> Self {
        Self { entries }
    }
}

impl FromIterator<(String, StatusSnapshot)> for AggregateView {
    fn from_iter<I: IntoIterator<Item = (String, StatusSnapshot)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// Fresh entries merged by one successful cycle (broadcast to subscribers).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsUpdate {
    pub timestamp: DateTime<Utc>,
    pub stats: StatsMap,
}

/// Fixed look-back window for charting history, bucketed so a long window
/// stays a bounded number of points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryRange {
    Day,
    Week,
    Month,
}

impl HistoryRange {
    pub fn window(self) -> chrono::Duration {
        match self {
            HistoryRange::Day => chrono::Duration::days(1),
            HistoryRange::Week => chrono::Duration::days(7),
            HistoryRange::Month => chrono::Duration::days(30),
        }
    }

    /// Width of one bucket: 288 points for a day, 336 for a week, 360 for a month.
    pub fn bucket(self) -> chrono::Duration {
        match self {
            HistoryRange::Day => chrono::Duration::minutes(5),
            HistoryRange::Week => chrono::Duration::minutes(30),
            HistoryRange::Month => chrono::Duration::hours(2),
        }
    }
}

/// One history row for a server (recorded per successful merge).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryPoint {
    pub timestamp: DateTime<Utc>,
    pub online_players: u32,
    pub ping: u32,
    pub is_online: bool,
}
