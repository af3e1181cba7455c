use super::DistributedLock;
use crate::error::CronResult;
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Process-local lock with the same lease semantics as `PgLock`
#[derive(Default)]
pub struct MemoryLock {
    leases: Mutex<HashMap<String, (String, Instant)>>,
}

impl MemoryLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current holder of `name`, if its lease is unexpired.
    pub async fn holder(&self, name: &str) -> Option<String> {
        let leases = self.leases.lock().await;
        leases
            .get(name)
            .filter(|(_, expires_at)| *expires_at > Instant::now())
            .map(|(owner, _)| owner.clone())
    }
}

#[async_trait]
impl DistributedLock for MemoryLock {
    async fn try_acquire(&self, name: &str, owner: &str, lease: Duration) -> CronResult<bool> {
        let mut leases = self.leases.lock().await;
        let now = Instant::now();

        if let Some((holder, expires_at)) = leases.get(name) {
            if holder != owner && *expires_at > now {
                return Ok(false);
            }
        }

        leases.insert(name.to_string(), (owner.to_string(), now + lease));
        Ok(true)
    }

    async fn release(&self, name: &str, owner: &str) -> CronResult<()> {
        let mut leases = self.leases.lock().await;
        if leases.get(name).map(|(holder, _)| holder == owner).unwrap_or(false) {
            leases.remove(name);
        }
        Ok(())
    }
}
