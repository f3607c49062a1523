// Status fetcher: one batched status query per call, no retries.

mod direct;
mod http;

pub use direct::DirectFetcher;
pub use http::HttpStatusFetcher;

use std::future::Future;
use thiserror::Error;

use crate::models::{ServerDescriptor, StatsMap};

/// Every way a fetch can fail. The scheduler treats all variants the same:
/// the cycle is skipped and the view stays as it was.
#[derive(Debug, Error)]
pub enum FetchFailed {
    #[error("status request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("status service returned HTTP {0}")]
    Status(reqwest::StatusCode),

    #[error("malformed status payload: {0}")]
    Malformed(String),

    #[error("status service reported failure: {}", .0.as_deref().unwrap_or("success=false"))]
    Rejected(Option<String>),
}

/// Queries status for a batch of (active) descriptors.
pub trait StatusFetcher: Send + Sync + 'static {
    fn fetch(
        &self,
        servers: &[ServerDescriptor],
    ) -> impl Future<Output = Result<StatsMap, FetchFailed>> + Send;
}

impl<T: StatusFetcher> StatusFetcher for std::sync::Arc<T> {
    async fn fetch(&self, servers: &[ServerDescriptor]) -> Result<StatsMap, FetchFailed> {
        self.as_ref().fetch(servers).await
    }
}

/// Fetcher selected by `monitor.mode`.
#[derive(Debug)]
pub enum ConfiguredFetcher {
    Remote(HttpStatusFetcher),
    Direct(DirectFetcher),
}

impl StatusFetcher for ConfiguredFetcher {
    async fn fetch(&self, servers: &[ServerDescriptor]) -> Result<StatsMap, FetchFailed> {
        match self {
            ConfiguredFetcher::Remote(f) => f.fetch(servers).await,
            ConfiguredFetcher::Direct(f) => f.fetch(servers).await,
        }
    }
}
