use super::DistributedLock;
use crate::db::DbPool;
use crate::error::{CronError, CronResult};
use async_trait::async_trait;
use diesel::prelude::*;
use diesel::sql_types::{Double, Text};
use diesel_async::RunQueryDsl;
use std::time::Duration;

// Takes the row when it is free, expired, or already ours.
const TRY_ACQUIRE: &str = r#"
    INSERT INTO cron_locks (name, owner, expires_at)
    VALUES ($1, $2, NOW() + make_interval(secs => $3))
    ON CONFLICT (name) DO UPDATE
    SET owner = EXCLUDED.owner, expires_at = EXCLUDED.expires_at
    WHERE cron_locks.expires_at <= NOW() OR cron_locks.owner = EXCLUDED.owner
"#;

/// Lease lock stored in the `cron_locks` table
#[derive(Clone)]
pub struct PgLock {
    pool: DbPool,
}

impl PgLock {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DistributedLock for PgLock {
    async fn try_acquire(&self, lock_name: &str, lock_owner: &str, lease: Duration) -> CronResult<bool> {
        let mut conn = self.pool.get().await?;

        let affected = diesel::sql_query(TRY_ACQUIRE)
            .bind::<Text, _>(lock_name)
            .bind::<Text, _>(lock_owner)
            .bind::<Double, _>(lease.as_secs_f64())
            .execute(&mut *conn)
            .await
            .map_err(|e| CronError::Lock(format!("Failed to acquire {}: {}", lock_name, e)))?;

        Ok(affected == 1)
    }

    async fn release(&self, lock_name: &str, lock_owner: &str) -> CronResult<()> {
        use crate::schema::cron_locks::dsl::*;

        let mut conn = self.pool.get().await?;

        diesel::delete(cron_locks.filter(name.eq(lock_name)).filter(owner.eq(lock_owner)))
            .execute(&mut *conn)
            .await
            .map_err(|e| CronError::Lock(format!("Failed to release {}: {}", lock_name, e)))?;

        Ok(())
    }
}
