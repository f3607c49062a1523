// Remote status-check service client.

use std::collections::HashSet;
use std::time::Duration;

use tracing::instrument;

use super::{FetchFailed, StatusFetcher};
use crate::models::wire::RawCheckResponse;
use crate::models::{ServerDescriptor, StatsMap};

#[derive(Debug, Clone)]
pub struct HttpStatusFetcher {
    client: reqwest::Client,
    url: String,
}

impl HttpStatusFetcher {
    pub fn new(url: impl Into<String>, request_timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self::with_client(client, url))
    }

    pub fn with_client(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

impl StatusFetcher for HttpStatusFetcher {
    #[instrument(skip_all, fields(operation = "fetch_status", servers = servers.len()))]
    async fn fetch(&self, servers: &[ServerDescriptor]) -> Result<StatsMap, FetchFailed> {
        if servers.is_empty() {
            return Ok(StatsMap::new());
        }

        let body = serde_json::json!({ "servers": servers });
        let response = self.client.post(&self.url).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchFailed::Status(status));
        }
        let bytes = response.bytes().await?;
        let requested: HashSet<&str> = servers.iter().map(|s| s.id.as_str()).collect();
        decode_response(&bytes, &requested)
    }
}

/// Validates a status-check body. `success:false` is a failure even when
/// `stats` is present; unrequested ids are dropped.
pub(crate) fn decode_response(
    body: &[u8],
    requested: &HashSet<&str>,
) -> Result<StatsMap, FetchFailed> {
    let raw: RawCheckResponse =
        serde_json::from_slice(body).map_err(|e| FetchFailed::Malformed(e.to_string()))?;
    match raw.success {
        None => return Err(FetchFailed::Malformed("missing `success` field".into())),
        Some(false) => return Err(FetchFailed::Rejected(raw.error)),
        Some(true) => {}
    }
    let Some(stats) = raw.stats else {
        return Err(FetchFailed::Malformed("missing `stats` field".into()));
    };

    let mut out = StatsMap::new();
    for (id, snapshot) in stats {
        if requested.contains(id.as_str()) {
            out.insert(id, snapshot);
        } else {
            tracing::debug!(server_id = %id, "dropping stats for unrequested server");
        }
    }
    Ok(out)
}
