// Server List Ping: query a Minecraft server's status over TCP.

pub mod codec;

use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::{Instant, timeout};
use tracing::instrument;

/// Protocol version sent in the handshake; -1 means "unknown" and every
/// vanilla-compatible server answers status requests regardless.
const STATUS_PROTOCOL_VERSION: i32 = -1;

#[derive(Debug, Error)]
pub enum SlpError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("invalid status json: {0}")]
    Json(#[from] serde_json::Error),
}

/// Parsed status reply.
#[derive(Debug, Clone, PartialEq)]
pub struct PingReply {
    pub latency_ms: u32,
    pub version: String,
    pub online_players: u32,
    pub max_players: u32,
    pub motd: String,
    pub player_sample: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct StatusJson {
    #[serde(default)]
    version: Option<VersionJson>,
    #[serde(default)]
    players: Option<PlayersJson>,
    #[serde(default)]
    description: serde_json::Value,
}

#[derive(Debug, Default, Deserialize)]
struct VersionJson {
    #[serde(default)]
    name: String,
}

#[derive(Debug, Default, Deserialize)]
struct PlayersJson {
    #[serde(default)]
    max: i64,
    #[serde(default)]
    online: i64,
    #[serde(default)]
    sample: Vec<SampleJson>,
}

#[derive(Debug, Default, Deserialize)]
struct SampleJson {
    #[serde(default)]
    name: String,
}

/// Connects, performs handshake + status request, and parses the reply.
/// The whole exchange is bounded by `limit`; latency covers connect through reply.
#[instrument(skip_all, fields(host = %host, port = port, operation = "slp_ping"))]
pub async fn ping(host: &str, port: u16, limit: Duration) -> Result<PingReply, SlpError> {
    let started = Instant::now();
    let json = timeout(limit, exchange(host, port))
        .await
        .map_err(|_| SlpError::Timeout(limit))??;
    let latency_ms = u32::try_from(started.elapsed().as_millis()).unwrap_or(u32::MAX);
    parse_status(&json, latency_ms)
}

async fn exchange(host: &str, port: u16) -> Result<String, SlpError> {
    let mut stream = TcpStream::connect((host, port)).await?;
    stream.set_nodelay(true)?;
    stream
        .write_all(&codec::handshake_packet(host, port, STATUS_PROTOCOL_VERSION))
        .await?;
    stream.write_all(&codec::status_request_packet()).await?;
    stream.flush().await?;
    codec::read_status_response(&mut stream).await
}

/// Turns the status JSON into a reply. Negative counts are clamped to zero.
pub fn parse_status(json: &str, latency_ms: u32) -> Result<PingReply, SlpError> {
    let status: StatusJson = serde_json::from_str(json)?;
    let players = status.players.unwrap_or_default();
    Ok(PingReply {
        latency_ms,
        version: status.version.map(|v| v.name).unwrap_or_default(),
        online_players: clamp_count(players.online),
        max_players: clamp_count(players.max),
        motd: strip_formatting(&flatten_motd(&status.description)),
        player_sample: players
            .sample
            .into_iter()
            .map(|p| p.name)
            .filter(|n| !n.is_empty())
            .collect(),
    })
}

fn clamp_count(n: i64) -> u32 {
    u32::try_from(n.max(0)).unwrap_or(u32::MAX)
}

/// Flattens a chat component (string, `{text, extra}` object, or array) to plain text.
pub fn flatten_motd(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Array(parts) => parts.iter().map(flatten_motd).collect(),
        serde_json::Value::Object(obj) => {
            let mut out = obj
                .get("text")
                .and_then(|t| t.as_str())
                .unwrap_or_default()
                .to_string();
            if let Some(extra) = obj.get("extra") {
                out.push_str(&flatten_motd(extra));
            }
            out
        }
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Removes legacy `§x` formatting codes.
pub fn strip_formatting(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '§' {
            chars.next();
        } else {
            out.push(c);
        }
    }
    out
}
