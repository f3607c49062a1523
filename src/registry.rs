// Server registry: read-only source of monitored server descriptors.
// Persistence and editing belong to the admin side; this module only reads.

use std::future::Future;
use std::path::PathBuf;
use std::sync::RwLock;

use anyhow::Context;
use tracing::instrument;

use crate::models::ServerDescriptor;

/// Supplies the current descriptor list. Called once per probe cycle, so edits
/// made between cycles are picked up.
pub trait DescriptorSource: Send + Sync + 'static {
    fn descriptors(&self) -> impl Future<Output = anyhow::Result<Vec<ServerDescriptor>>> + Send;
}

impl<T: DescriptorSource> DescriptorSource for std::sync::Arc<T> {
    async fn descriptors(&self) -> anyhow::Result<Vec<ServerDescriptor>> {
        self.as_ref().descriptors().await
    }
}

/// In-memory registry (from config, or swapped by tests and embedders).
#[derive(Debug, Default)]
pub struct StaticRegistry {
    servers: RwLock<Vec<ServerDescriptor>>,
}

impl StaticRegistry {
    pub fn new(servers: Vec<ServerDescriptor>) -> Self {
        Self {
            servers: RwLock::new(servers),
        }
    }

    /// Replaces the whole list; the next cycle sees the new set.
    pub fn replace(&self, servers: Vec<ServerDescriptor>) {
        let mut guard = self
            .servers
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *guard = servers;
    }

    fn snapshot(&self) -> Vec<ServerDescriptor> {
        self.servers
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

impl DescriptorSource for StaticRegistry {
    async fn descriptors(&self) -> anyhow::Result<Vec<ServerDescriptor>> {
        Ok(self.snapshot())
    }
}

/// JSON array of descriptors on disk, re-read on every call.
/// A missing file is an empty registry.
#[derive(Debug, Clone)]
pub struct FileRegistry {
    path: PathBuf,
}

impl FileRegistry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl DescriptorSource for FileRegistry {
    #[instrument(skip(self), fields(registry = %self.path.display(), operation = "read_registry"))]
    async fn descriptors(&self) -> anyhow::Result<Vec<ServerDescriptor>> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("registry file missing; treating as empty");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e).context("read registry file"),
        };
        if raw.trim().is_empty() {
            return Ok(Vec::new());
        }
        let servers: Vec<ServerDescriptor> =
            serde_json::from_str(&raw).context("parse registry file")?;
        Ok(servers)
    }
}

/// Registry selected by `[registry]` config.
#[derive(Debug)]
pub enum Registry {
    Static(StaticRegistry),
    File(FileRegistry),
}

impl DescriptorSource for Registry {
    async fn descriptors(&self) -> anyhow::Result<Vec<ServerDescriptor>> {
        match self {
            Registry::Static(r) => r.descriptors().await,
            Registry::File(r) => r.descriptors().await,
        }
    }
}
