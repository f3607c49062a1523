// Status-check service request/response bodies

use serde::{Deserialize, Serialize};

use super::{ServerDescriptor, StatsMap};

/// POST body: the full batch of servers to check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckRequest {
    #[serde(default)]
    pub servers: Vec<ServerDescriptor>,
}

/// Response as served by `/api/check`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckResponse {
    pub success: bool,
    pub stats: StatsMap,
    pub checked_servers: usize,
}

/// Response as decoded by the fetcher. Both fields are checked by hand so a
/// missing one is reported as malformed rather than defaulted.
#[derive(Debug, Deserialize)]
pub struct RawCheckResponse {
    pub success: Option<bool>,
    pub stats: Option<StatsMap>,
    #[serde(default)]
    pub error: Option<String>,
}
