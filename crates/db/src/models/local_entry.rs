use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqlitePool};

/// A single row of the local key-value table.
#[derive(Debug, Clone, FromRow)]
pub struct LocalEntry {
    pub key: String,
    pub value: String,
    pub expires_at: Option<DateTime<Utc>>,
}

impl LocalEntry {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }

    pub async fn find_by_key(pool: &SqlitePool, key: &str) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, LocalEntry>(
            "SELECT key, value, expires_at FROM local_entries WHERE key = $1",
        )
        .bind(key)
        .fetch_optional(pool)
        .await
    }

    pub async fn upsert(
        pool: &SqlitePool,
        key: &str,
        value: &str,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"INSERT INTO local_entries (key, value, expires_at)
               VALUES ($1, $2, $3)
               ON CONFLICT(key) DO UPDATE SET
                   value = excluded.value,
                   expires_at = excluded.expires_at"#,
        )
        .bind(key)
        .bind(value)
        .bind(expires_at)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn delete(pool: &SqlitePool, key: &str) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM local_entries WHERE key = $1")
            .bind(key)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }
}
