// SQLite persistence: latest snapshot per server (for cache priming) and
// a per-server player/ping history with retention pruning.

mod schema;

use crate::models::{AggregateView, HistoryPoint, HistoryRange, StatsUpdate, StatusSnapshot};
use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use tracing::instrument;

pub struct StatsRepo {
    pool: SqlitePool,
    retention_ms: i64,
}

impl StatsRepo {
    pub async fn connect(path: &str, retention_days: u32) -> anyhow::Result<Self> {
        if let Some(parent) = Path::new(path).parent() {
            std::fs::create_dir_all(parent)?;
        }
        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}", path))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .busy_timeout(std::time::Duration::from_secs(5))
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);
        let pool = SqlitePoolOptions::new().connect_with(opts).await?;
        let retention_ms = i64::from(retention_days) * 24 * 60 * 60 * 1000;
        Ok(Self { pool, retention_ms })
    }

    pub async fn init(&self) -> anyhow::Result<()> {
        schema::create_tables(&self.pool).await
    }

    /// Upserts the latest snapshot of every server in the update and appends one
    /// history row each, in a single transaction.
    #[instrument(skip(self, update), fields(repo = "stats", operation = "save_update", servers = update.stats.len()))]
    pub async fn save_update(&self, update: &StatsUpdate) -> anyhow::Result<()> {
        if update.stats.is_empty() {
            return Ok(());
        }
        let created_at = update.timestamp.timestamp_millis();
        let mut tx = self.pool.begin().await?;
        for (server_id, snapshot) in &update.stats {
            let data = serde_json::to_string(snapshot)?;
            sqlx::query(
                "INSERT INTO server_stats (server_id, data, updated_at) VALUES ($1, $2, $3)
                 ON CONFLICT(server_id) DO UPDATE SET data = excluded.data, updated_at = excluded.updated_at",
            )
            .bind(server_id)
            .bind(&data)
            .bind(created_at)
            .execute(&mut *tx)
            .await?;

            sqlx::query(
                "INSERT INTO server_history (server_id, created_at, online_players, ping, is_online) VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(server_id)
            .bind(created_at)
            .bind(i64::from(snapshot.online_players))
            .bind(i64::from(snapshot.ping))
            .bind(snapshot.is_online)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Last persisted snapshot per server. Rows that no longer decode are skipped.
    #[instrument(skip(self), fields(repo = "stats", operation = "load_latest"))]
    pub async fn load_latest(&self) -> anyhow::Result<AggregateView> {
        let rows = sqlx::query("SELECT server_id, data FROM server_stats")
            .fetch_all(&self.pool)
            .await?;
        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            let server_id: String = row.try_get("server_id")?;
            let data: String = row.try_get("data")?;
            match serde_json::from_str::<StatusSnapshot>(&data) {
                Ok(snapshot) => entries.push((server_id, snapshot)),
                Err(e) => {
                    tracing::warn!(server_id = %server_id, error = %e, "skipping undecodable stats row");
                }
            }
        }
        Ok(entries.into_iter().collect())
    }

    /// Most recent `limit` history points for a server, oldest first.
    #[instrument(skip(self), fields(repo = "stats", operation = "get_history"))]
    pub async fn get_history(&self, server_id: &str, limit: u32) -> anyhow::Result<Vec<HistoryPoint>> {
        let rows = sqlx::query(
            "SELECT created_at, online_players, ping, is_online FROM server_history
             WHERE server_id = $1 ORDER BY created_at DESC, id DESC LIMIT $2",
        )
        .bind(server_id)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let created_at: i64 = row.try_get("created_at")?;
            let online_players: i64 = row.try_get("online_players")?;
            let ping: i64 = row.try_get("ping")?;
            out.push(HistoryPoint {
                timestamp: millis_to_utc(created_at),
                online_players: u32::try_from(online_players).unwrap_or(0),
                ping: u32::try_from(ping).unwrap_or(0),
                is_online: row.try_get("is_online")?,
            });
        }
        out.reverse();
        Ok(out)
    }

    /// History over `range` ending at `now`, averaged into fixed buckets, oldest
    /// first. Each point is stamped with its bucket start; empty buckets are
    /// omitted. Ping averages only the online rows; a bucket counts as online
    /// if any row in it was.
    #[instrument(skip(self), fields(repo = "stats", operation = "get_history_range"))]
    pub async fn get_history_range(
        &self,
        server_id: &str,
        range: HistoryRange,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Vec<HistoryPoint>> {
        let bucket_ms = range.bucket().num_milliseconds();
        let cutoff = (now - range.window()).timestamp_millis();
        let rows = sqlx::query(
            "SELECT (created_at / $1) * $1 AS bucket_at,
                    AVG(online_players) AS online_players,
                    AVG(CASE WHEN is_online THEN ping END) AS ping,
                    MAX(is_online) AS is_online
             FROM server_history
             WHERE server_id = $2 AND created_at >= $3
             GROUP BY bucket_at ORDER BY bucket_at ASC",
        )
        .bind(bucket_ms)
        .bind(server_id)
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let bucket_at: i64 = row.try_get("bucket_at")?;
            let online_players: f64 = row.try_get("online_players")?;
            let ping: Option<f64> = row.try_get("ping")?;
            let is_online: i64 = row.try_get("is_online")?;
            out.push(HistoryPoint {
                timestamp: millis_to_utc(bucket_at),
                online_players: round_avg(online_players),
                ping: ping.map_or(0, round_avg),
                is_online: is_online != 0,
            });
        }
        Ok(out)
    }

    /// Deletes history rows older than the retention window. Returns rows removed.
    #[instrument(skip(self), fields(repo = "stats", operation = "prune_old_data"))]
    pub async fn prune_old_data(&self) -> anyhow::Result<u64> {
        let cutoff = Utc::now().timestamp_millis() - self.retention_ms;
        let result = sqlx::query("DELETE FROM server_history WHERE created_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

fn round_avg(avg: f64) -> u32 {
    avg.max(0.0).round() as u32
}

fn millis_to_utc(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}
