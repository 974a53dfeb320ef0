//! Durable ticket store.
//!
//! One row per issue key holding the encoded payload plus two indexed
//! timestamp columns. Writes go through a [`TicketWriter`], which wraps a
//! single SQLite transaction for the whole sync run: nothing a failed run
//! wrote becomes visible. There is no delete path.

use chrono::{DateTime, NaiveDateTime};
use futures::stream::{BoxStream, StreamExt};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use std::path::Path;
use std::sync::Arc;

use crate::codec::{PayloadCodec, ZstdJsonCodec};
use crate::db;
use crate::error::Result;
use crate::migrate;
use crate::models::{RawIssue, Ticket};

/// File name of the store inside the index directory.
pub const DB_FILE_NAME: &str = "jira.db";

pub struct TicketStore {
    pool: SqlitePool,
    codec: Arc<dyn PayloadCodec>,
}

impl TicketStore {
    /// Open (creating if needed) the store at `db_path` with the default codec.
    pub async fn open(db_path: &Path) -> Result<Self> {
        Self::open_with_codec(db_path, Arc::new(ZstdJsonCodec::default())).await
    }

    pub async fn open_with_codec(db_path: &Path, codec: Arc<dyn PayloadCodec>) -> Result<Self> {
        let pool = db::connect(db_path).await?;
        migrate::run_migrations(&pool).await?;
        Ok(Self { pool, codec })
    }

    /// Start the write transaction for one sync run.
    pub async fn begin(&self) -> Result<TicketWriter> {
        let tx = self.pool.begin().await?;
        Ok(TicketWriter {
            tx,
            codec: Arc::clone(&self.codec),
            written: 0,
        })
    }

    /// Oldest and newest `updated` timestamps, or `(None, None)` when empty.
    pub async fn min_max_updated(&self) -> Result<(Option<NaiveDateTime>, Option<NaiveDateTime>)> {
        let (min, max): (Option<i64>, Option<i64>) =
            sqlx::query_as("SELECT MIN(updated), MAX(updated) FROM tickets")
                .fetch_one(&self.pool)
                .await?;
        Ok((min.map(from_unix).transpose()?, max.map(from_unix).transpose()?))
    }

    /// Decoded payload for `key`, if stored.
    pub async fn get_by_key(&self, key: &str) -> Result<Option<RawIssue>> {
        let data: Option<Vec<u8>> = sqlx::query_scalar("SELECT data FROM tickets WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        match data {
            Some(bytes) => Ok(Some(self.codec.decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Stream every ticket, shortest keys first and lexically within one
    /// length, so `PROJ-9` comes before `PROJ-10`.
    pub fn scan_all(&self) -> BoxStream<'_, Result<Ticket>> {
        sqlx::query("SELECT key, updated, created, data FROM tickets ORDER BY length(key), key")
            .fetch(&self.pool)
            .map(move |row: Result<SqliteRow, sqlx::Error>| -> Result<Ticket> {
                self.ticket_from_row(&row?)
            })
            .boxed()
    }

    pub async fn count(&self) -> Result<i64> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tickets")
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    fn ticket_from_row(&self, row: &SqliteRow) -> Result<Ticket> {
        let data: Vec<u8> = row.try_get("data")?;
        Ok(Ticket {
            key: row.try_get("key")?,
            updated: from_unix(row.try_get("updated")?)?,
            created: from_unix(row.try_get("created")?)?,
            payload: self.codec.decode(&data)?,
        })
    }
}

/// The single writer of one sync run.
pub struct TicketWriter {
    tx: Transaction<'static, Sqlite>,
    codec: Arc<dyn PayloadCodec>,
    written: u64,
}

impl TicketWriter {
    /// Insert or replace the ticket stored under `key`.
    pub async fn upsert(
        &mut self,
        key: &str,
        updated: NaiveDateTime,
        created: NaiveDateTime,
        payload: &RawIssue,
    ) -> Result<()> {
        let data = self.codec.encode(payload)?;
        sqlx::query(
            r#"
            INSERT INTO tickets (key, updated, created, data)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                updated = excluded.updated,
                created = excluded.created,
                data = excluded.data
            "#,
        )
        .bind(key)
        .bind(updated.and_utc().timestamp())
        .bind(created.and_utc().timestamp())
        .bind(data)
        .execute(&mut *self.tx)
        .await?;
        self.written += 1;
        Ok(())
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    /// Make every upsert of this run durable. Returns the number written.
    pub async fn commit(self) -> Result<u64> {
        self.tx.commit().await?;
        Ok(self.written)
    }

    pub async fn rollback(self) -> Result<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}

fn from_unix(ts: i64) -> Result<NaiveDateTime> {
    DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.naive_utc())
        .ok_or_else(|| sqlx::Error::Decode(format!("timestamp out of range: {ts}").into()).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use futures::TryStreamExt;
    use serde_json::json;
    use tempfile::TempDir;

    fn at(day: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2019, 3, day)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    async fn open_store(tmp: &TempDir) -> TicketStore {
        TicketStore::open(&tmp.path().join(DB_FILE_NAME)).await.unwrap()
    }

    #[tokio::test]
    async fn empty_store_has_no_window() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp).await;
        assert_eq!(store.min_max_updated().await.unwrap(), (None, None));
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn upsert_replaces_in_place() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp).await;

        let mut writer = store.begin().await.unwrap();
        writer
            .upsert("PROJ-1", at(1, 10), at(1, 9), &json!({"v": 1}))
            .await
            .unwrap();
        writer
            .upsert("PROJ-1", at(2, 10), at(1, 9), &json!({"v": 2}))
            .await
            .unwrap();
        assert_eq!(writer.commit().await.unwrap(), 2);

        assert_eq!(store.count().await.unwrap(), 1);
        assert_eq!(
            store.get_by_key("PROJ-1").await.unwrap(),
            Some(json!({"v": 2}))
        );
        assert_eq!(
            store.min_max_updated().await.unwrap(),
            (Some(at(2, 10)), Some(at(2, 10)))
        );
    }

    #[tokio::test]
    async fn min_max_spans_all_tickets() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp).await;
        let mut writer = store.begin().await.unwrap();
        for (key, day) in [("A-1", 5), ("A-2", 2), ("A-3", 9)] {
            writer
                .upsert(key, at(day, 12), at(1, 0), &json!({}))
                .await
                .unwrap();
        }
        writer.commit().await.unwrap();

        assert_eq!(
            store.min_max_updated().await.unwrap(),
            (Some(at(2, 12)), Some(at(9, 12)))
        );
    }

    #[tokio::test]
    async fn rollback_discards_run() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp).await;
        let mut writer = store.begin().await.unwrap();
        writer
            .upsert("PROJ-1", at(1, 10), at(1, 9), &json!({}))
            .await
            .unwrap();
        writer.rollback().await.unwrap();
        assert_eq!(store.count().await.unwrap(), 0);
        assert_eq!(store.get_by_key("PROJ-1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn scan_orders_by_length_then_key() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp).await;
        let mut writer = store.begin().await.unwrap();
        for key in ["PROJ-9", "PROJ-10", "PROJ-2"] {
            writer
                .upsert(key, at(1, 10), at(1, 9), &json!({"key": key}))
                .await
                .unwrap();
        }
        writer.commit().await.unwrap();

        let tickets: Vec<Ticket> = store.scan_all().try_collect().await.unwrap();
        let keys: Vec<&str> = tickets.iter().map(|t| t.key.as_str()).collect();
        assert_eq!(keys, ["PROJ-2", "PROJ-9", "PROJ-10"]);
        assert_eq!(tickets[2].payload, json!({"key": "PROJ-10"}));
        assert_eq!(tickets[0].updated, at(1, 10));
    }

    #[tokio::test]
    async fn reopen_keeps_data() {
        let tmp = TempDir::new().unwrap();
        {
            let store = open_store(&tmp).await;
            let mut writer = store.begin().await.unwrap();
            writer
                .upsert("PROJ-1", at(1, 10), at(1, 9), &json!({"x": true}))
                .await
                .unwrap();
            writer.commit().await.unwrap();
            store.close().await;
        }
        let store = open_store(&tmp).await;
        assert_eq!(
            store.get_by_key("PROJ-1").await.unwrap(),
            Some(json!({"x": true}))
        );
    }
}
