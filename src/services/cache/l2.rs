use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

/// Shared persistent cache tier, reachable by every process. Grounded on
/// `loki_redis_cache.py::LokiRedisBackend` (the envelope/lock shape) but
/// backed by the teacher's `sqlx`/SQLite stack rather than Redis, since the
/// teacher carries no Redis client. The lock primitive (`acquire_lock` /
/// `release_lock`) reproduces Redis's `SET NX PX` + token-checked unlock
/// with a unique-constraint row and an expiry column instead.
#[async_trait]
pub trait L2Backend: Send + Sync {
    async fn ping(&self) -> bool;
    async fn get(&self, key: &str) -> Option<String>;
    async fn set(&self, key: &str, value: &str, ttl_seconds: u64);
    async fn delete(&self, key: &str);
    /// Attempts to acquire an exclusive single-flight lock on `key` for
    /// `ttl_ms` milliseconds. Returns a token on success; the token must be
    /// presented to `release_lock` so a stale holder can't release a lock
    /// another leader since reacquired.
    async fn acquire_lock(&self, key: &str, ttl_ms: u64) -> Option<String>;
    async fn release_lock(&self, key: &str, token: &str);
}

pub struct SqliteL2Backend {
    pool: SqlitePool,
}

impl SqliteL2Backend {
    pub async fn new(pool: SqlitePool) -> anyhow::Result<Self> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS cache_l2 (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                expires_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await?;
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS cache_l2_locks (
                key TEXT PRIMARY KEY,
                token TEXT NOT NULL,
                expires_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl L2Backend for SqliteL2Backend {
    async fn ping(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }

    async fn get(&self, key: &str) -> Option<String> {
        let now = Utc::now().timestamp();
        let row: Option<(String, i64)> =
            sqlx::query_as("SELECT value, expires_at FROM cache_l2 WHERE key = ?")
                .bind(key)
                .fetch_optional(&self.pool)
                .await
                .ok()
                .flatten();
        let (value, expires_at) = row?;
        if expires_at < now {
            let _ = sqlx::query("DELETE FROM cache_l2 WHERE key = ?").bind(key).execute(&self.pool).await;
            return None;
        }
        Some(value)
    }

    async fn set(&self, key: &str, value: &str, ttl_seconds: u64) {
        let expires_at = Utc::now().timestamp() + ttl_seconds as i64;
        let _ = sqlx::query(
            "INSERT INTO cache_l2 (key, value, expires_at) VALUES (?, ?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, expires_at = excluded.expires_at",
        )
        .bind(key)
        .bind(value)
        .bind(expires_at)
        .execute(&self.pool)
        .await;
    }

    async fn delete(&self, key: &str) {
        let _ = sqlx::query("DELETE FROM cache_l2 WHERE key = ?").bind(key).execute(&self.pool).await;
    }

    async fn acquire_lock(&self, key: &str, ttl_ms: u64) -> Option<String> {
        let now = Utc::now().timestamp_millis();
        let _ = sqlx::query("DELETE FROM cache_l2_locks WHERE key = ? AND expires_at < ?")
            .bind(key)
            .bind(now)
            .execute(&self.pool)
            .await;
        let token = Uuid::new_v4().to_string();
        let expires_at = now + ttl_ms as i64;
        let result = sqlx::query("INSERT INTO cache_l2_locks (key, token, expires_at) VALUES (?, ?, ?)")
            .bind(key)
            .bind(&token)
            .bind(expires_at)
            .execute(&self.pool)
            .await;
        result.ok().map(|_| token)
    }

    async fn release_lock(&self, key: &str, token: &str) {
        let _ = sqlx::query("DELETE FROM cache_l2_locks WHERE key = ? AND token = ?")
            .bind(key)
            .bind(token)
            .execute(&self.pool)
            .await;
    }
}
