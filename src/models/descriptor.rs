// Monitored server descriptor (owned by the registry, read-only here)

use serde::{Deserialize, Serialize};

/// Port the Minecraft client assumes when none is given.
pub const DEFAULT_PORT: u16 = 25565;

/// Capacity the admin form fills in when left blank.
pub const DEFAULT_MAX_PLAYERS: u32 = 100;

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_max_players() -> u32 {
    DEFAULT_MAX_PLAYERS
}

fn default_active() -> bool {
    true
}

/// Identity and static config for one monitored server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerDescriptor {
    pub id: String,
    pub name: String,
    pub address: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Configured capacity; the live value comes from the snapshot.
    #[serde(default = "default_max_players")]
    pub max_players: u32,
    #[serde(rename = "isActive", alias = "active", default = "default_active")]
    pub active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ServerDescriptor {
    pub fn new(id: impl Into<String>, name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            address: address.into(),
            port: DEFAULT_PORT,
            max_players: DEFAULT_MAX_PLAYERS,
            active: true,
            version: None,
            description: None,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_max_players(mut self, max_players: u32) -> Self {
        self.max_players = max_players;
        self
    }

    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }
}

/// Active descriptors in registry order.
pub fn active_only(descriptors: Vec<ServerDescriptor>) -> Vec<ServerDescriptor> {
    descriptors.into_iter().filter(|d| d.active).collect()
}
