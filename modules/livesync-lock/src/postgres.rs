//! Lease rows in Postgres, one per lock name.
//!
//! Expired rows are reclaimed by the next acquirer, so a holder that died
//! without releasing blocks others for at most one TTL.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use livesync_common::{Config, LiveSyncError};
use sqlx::PgPool;
use tracing::{debug, info};

use crate::backend::LockBackend;
use crate::error::LockError;

#[derive(Clone)]
pub struct PgLockBackend {
    pool: PgPool,
}

impl PgLockBackend {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect using `DATABASE_URL` from the loaded configuration.
    pub async fn connect(config: &Config) -> Result<Self, LockError> {
        let url = config.database_url.as_deref().ok_or_else(|| {
            LiveSyncError::Config("DATABASE_URL is required for the Postgres lock backend".to_string())
        })?;
        let pool = PgPool::connect(url)
            .await
            .map_err(|e| LockError::Backend(e.into()))?;
        info!("Connected Postgres lock backend");
        Ok(Self::new(pool))
    }

    /// Create the lease table if it does not exist.
    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS mutation_locks (
                name        TEXT         PRIMARY KEY,
                token       TEXT         NOT NULL,
                expires_at  TIMESTAMPTZ  NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl LockBackend for PgLockBackend {
    async fn try_acquire(&self, names: &[String], token: &str, ttl: Duration) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let reclaimed = sqlx::query(
            "DELETE FROM mutation_locks WHERE name = ANY($1) AND expires_at <= now()",
        )
        .bind(names)
        .execute(&mut *tx)
        .await?
        .rows_affected();
        if reclaimed > 0 {
            debug!(names = ?names, reclaimed, "Reclaimed expired lock leases");
        }

        // Waits on concurrent inserts of the same names, then skips them.
        let inserted = sqlx::query(
            r#"
            INSERT INTO mutation_locks (name, token, expires_at)
            SELECT unnest($1::text[]), $2, now() + make_interval(secs => $3)
            ON CONFLICT (name) DO NOTHING
            "#,
        )
        .bind(names)
        .bind(token)
        .bind(ttl.as_secs_f64())
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if inserted == names.len() as u64 {
            tx.commit().await?;
            Ok(true)
        } else {
            tx.rollback().await?;
            Ok(false)
        }
    }

    async fn renew(&self, names: &[String], token: &str, ttl: Duration) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let renewed = sqlx::query(
            r#"
            UPDATE mutation_locks
            SET expires_at = now() + make_interval(secs => $3)
            WHERE name = ANY($1) AND token = $2 AND expires_at > now()
            "#,
        )
        .bind(names)
        .bind(token)
        .bind(ttl.as_secs_f64())
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if renewed == names.len() as u64 {
            tx.commit().await?;
            Ok(true)
        } else {
            tx.rollback().await?;
            Ok(false)
        }
    }

    async fn release(&self, names: &[String], token: &str) -> Result<()> {
        sqlx::query("DELETE FROM mutation_locks WHERE name = ANY($1) AND token = $2")
            .bind(names)
            .bind(token)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
