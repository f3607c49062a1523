// Table definitions for the stats database.

use sqlx::SqlitePool;

/// Creates `server_stats` and `server_history` (and index) if not present.
pub async fn create_tables(pool: &SqlitePool) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS server_stats (
            server_id TEXT PRIMARY KEY,
            data TEXT NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS server_history (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            server_id TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            online_players INTEGER NOT NULL,
            ping INTEGER NOT NULL,
            is_online INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_server_history_server_created ON server_history(server_id, created_at)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
