//! Distributed run lock so only one instance runs a cycle at a time.

use crate::error::CronResult;
use async_trait::async_trait;
use std::time::Duration;

pub mod memory;
pub mod postgres;

pub use memory::MemoryLock;
pub use postgres::PgLock;

#[async_trait]
pub trait DistributedLock: Send + Sync {
    /// Try to take `name` for `lease`.
    ///
    /// Returns `Ok(false)` when another owner holds an unexpired lease. The
    /// current owner may re-acquire to extend its lease.
    async fn try_acquire(&self, name: &str, owner: &str, lease: Duration) -> CronResult<bool>;

    /// Release `name` if `owner` still holds it.
    async fn release(&self, name: &str, owner: &str) -> CronResult<()>;
}
