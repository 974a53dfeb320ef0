//! Ticket store schema. Idempotent; run every time the store is opened.

use sqlx::SqlitePool;

use crate::error::Result;

pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    // Timestamps are naive instants stored as Unix seconds.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tickets (
            key TEXT PRIMARY KEY,
            updated INTEGER NOT NULL,
            created INTEGER NOT NULL,
            data BLOB NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_tickets_updated ON tickets(updated)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_tickets_created ON tickets(created)")
        .execute(pool)
        .await?;

    Ok(())
}
