//! Periodic runner for `CalendarCron`.
//!
//! Each tick runs one cycle. Cycles never overlap within a process; across
//! processes the run lock keeps them exclusive. Stopping waits for the
//! in-flight cycle to finish, up to a timeout.

use crate::cron::{CalendarCron, CycleOutcome};
use crate::error::{CronError, CronResult};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Observable state of the scheduler loop
#[derive(Debug, Clone, Default)]
pub struct SchedulerState {
    pub cycles: u64,
    pub last_run: Option<DateTime<Utc>>,
    pub last_outcome: Option<CycleOutcome>,
    pub last_error: Option<String>,
}

pub struct CronScheduler {
    cron: Arc<CalendarCron>,
    interval: Duration,
    stop_timeout: Duration,
    state: Arc<RwLock<SchedulerState>>,
    cancellation: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl CronScheduler {
    pub fn new(cron: Arc<CalendarCron>, interval: Duration) -> Self {
        Self {
            cron,
            interval,
            stop_timeout: Duration::from_secs(30),
            state: Arc::new(RwLock::new(SchedulerState::default())),
            cancellation: CancellationToken::new(),
            handle: None,
        }
    }

    pub fn with_stop_timeout(mut self, stop_timeout: Duration) -> Self {
        self.stop_timeout = stop_timeout;
        self
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    pub async fn state(&self) -> SchedulerState {
        self.state.read().await.clone()
    }

    /// Start the loop; the first cycle runs immediately.
    pub fn start(&mut self) -> CronResult<()> {
        if self.is_running() {
            return Err(CronError::AlreadyRunning);
        }

        self.cancellation = CancellationToken::new();
        let handle = tokio::spawn(run_loop(
            self.cron.clone(),
            self.interval,
            self.state.clone(),
            self.cancellation.clone(),
        ));
        self.handle = Some(handle);

        info!(
            "Calendar cron scheduler started (every {}s)",
            self.interval.as_secs()
        );
        Ok(())
    }

    pub async fn stop(&mut self) -> CronResult<()> {
        let Some(mut handle) = self.handle.take() else {
            return Err(CronError::NotRunning);
        };

        self.cancellation.cancel();

        match tokio::time::timeout(self.stop_timeout, &mut handle).await {
            Ok(Ok(())) => info!("Calendar cron scheduler stopped"),
            Ok(Err(e)) => error!("Calendar cron scheduler task failed: {}", e),
            Err(_) => {
                warn!(
                    "Calendar cron cycle did not finish within {:?}, aborting",
                    self.stop_timeout
                );
                handle.abort();
            }
        }

        Ok(())
    }
}

impl Drop for CronScheduler {
    fn drop(&mut self) {
        self.cancellation.cancel();
    }
}

async fn run_loop(
    cron: Arc<CalendarCron>,
    interval: Duration,
    state: Arc<RwLock<SchedulerState>>,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        debug!("Running calendar cron cycle");
        let result = cron.run_cycle().await;
        log_cycle_result(&result);

        let mut current = state.write().await;
        current.cycles += 1;
        current.last_run = Some(Utc::now());
        match result {
            Ok(outcome) => {
                current.last_outcome = Some(outcome);
                current.last_error = None;
            }
            Err(e) => current.last_error = Some(e.to_string()),
        }
    }
}

pub fn log_cycle_result(result: &CronResult<CycleOutcome>) {
    match result {
        Ok(CycleOutcome::Completed(stats)) => info!("Calendar cron cycle complete: {}", stats),
        Ok(CycleOutcome::LockHeld) => debug!("Calendar cron cycle skipped, lock held elsewhere"),
        Ok(CycleOutcome::NotConfigured) => {
            debug!("Calendar cron cycle skipped, no calendar integration configured")
        }
        Err(e) => error!("Calendar cron cycle failed: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::MockCalendar;
    use crate::config::CronConfig;
    use crate::datastore::MemoryStore;
    use crate::lock::MemoryLock;
    use tokio_test::assert_ok;

    fn scheduler(interval: Duration) -> CronScheduler {
        let cron = CalendarCron::new(
            Arc::new(MemoryStore::new()),
            Arc::new(MockCalendar::new()),
            Arc::new(MemoryLock::new()),
            CronConfig::default(),
        );
        CronScheduler::new(Arc::new(cron), interval)
    }

    #[tokio::test]
    async fn test_lifecycle_runs_cycles() {
        let mut scheduler = scheduler(Duration::from_millis(20));
        assert_ok!(scheduler.start());
        assert!(scheduler.is_running());

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_ok!(scheduler.stop().await);
        assert!(!scheduler.is_running());

        let state = scheduler.state().await;
        assert!(state.cycles >= 2);
        assert!(state.last_run.is_some());
        assert_eq!(state.last_outcome, Some(CycleOutcome::NotConfigured));
        assert!(state.last_error.is_none());
    }

    #[tokio::test]
    async fn test_double_start_is_rejected() {
        let mut scheduler = scheduler(Duration::from_secs(60));
        scheduler.start().unwrap();
        assert!(matches!(scheduler.start(), Err(CronError::AlreadyRunning)));
        scheduler.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_without_start_is_rejected() {
        let mut scheduler = scheduler(Duration::from_secs(60));
        assert!(matches!(scheduler.stop().await, Err(CronError::NotRunning)));
    }

    #[tokio::test]
    async fn test_restart_after_stop() {
        let mut scheduler = scheduler(Duration::from_secs(60));
        scheduler.start().unwrap();
        scheduler.stop().await.unwrap();
        scheduler.start().unwrap();
        scheduler.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_errors_recorded_in_state() {
        let store = Arc::new(MemoryStore::new());
        store.fail_app_config(true).await;
        let cron = CalendarCron::new(
            store,
            Arc::new(MockCalendar::new()),
            Arc::new(MemoryLock::new()),
            CronConfig::default(),
        );
        let mut scheduler = CronScheduler::new(Arc::new(cron), Duration::from_secs(60));

        scheduler.start().unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        scheduler.stop().await.unwrap();

        let state = scheduler.state().await;
        assert_eq!(state.cycles, 1);
        assert!(state.last_error.is_some());
        assert!(state.last_outcome.is_none());
    }
}
