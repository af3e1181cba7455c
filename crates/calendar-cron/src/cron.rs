use crate::calendar::CalendarProvider;
use crate::config::CronConfig;
use crate::datastore::Datastore;
use crate::error::{CronError, CronResult};
use crate::lock::DistributedLock;
use crate::reconcile::{CycleStats, Reconciler};
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, warn};

pub const LOCK_NAME: &str = "calendar:cron:lock";

/// Result of one scheduled cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    Completed(CycleStats),
    /// Another instance holds the run lock
    LockHeld,
    /// No calendar integration is configured
    NotConfigured,
}

/// Lock-guarded, deadline-bounded reconciliation cycle
pub struct CalendarCron {
    reconciler: Reconciler,
    lock: Arc<dyn DistributedLock>,
    config: CronConfig,
}

impl CalendarCron {
    pub fn new(
        datastore: Arc<dyn Datastore>,
        calendar: Arc<dyn CalendarProvider>,
        lock: Arc<dyn DistributedLock>,
        config: CronConfig,
    ) -> Self {
        Self {
            reconciler: Reconciler::new(datastore, calendar, config.clone()),
            lock,
            config,
        }
    }

    pub fn config(&self) -> &CronConfig {
        &self.config
    }

    /// Run one cycle if the run lock can be taken.
    ///
    /// The lock lease is the cron periodicity, so a crashed instance stops
    /// blocking others after one period. The lock is released when the
    /// cycle ends.
    ///
    /// Once the deadline passes no new team or host is started; hosts in
    /// flight finish first. Work left over makes the cycle fail with
    /// `CronError::Deadline` and is picked up by the next one.
    pub async fn run_cycle(&self) -> CronResult<CycleOutcome> {
        let owner = self.config.instance_id.as_str();

        if !self
            .lock
            .try_acquire(LOCK_NAME, owner, self.config.periodicity)
            .await?
        {
            debug!("Calendar cron lock is held by another instance, skipping cycle");
            return Ok(CycleOutcome::LockHeld);
        }

        let deadline = Instant::now() + self.config.cycle_deadline;
        let result = self.reconciler.reconcile_until(deadline).await;

        if let Err(e) = self.lock.release(LOCK_NAME, owner).await {
            warn!("Failed to release calendar cron lock: {}", e);
        }

        match result? {
            Some(stats) if stats.deferred() => {
                warn!("Calendar cron cycle stopped at its deadline: {}", stats);
                Err(CronError::Deadline(self.config.cycle_deadline))
            }
            Some(stats) => Ok(CycleOutcome::Completed(stats)),
            None => Ok(CycleOutcome::NotConfigured),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::MockCalendar;
    use crate::datastore::MemoryStore;
    use crate::lock::MemoryLock;
    use async_trait::async_trait;
    use shared_types::{
        AppConfig, CalendarEvent, CalendarIntegration, CalendarPolicy, HostCalendarEvent,
        HostComplianceRow, NewCalendarEvent, PolicyDetail, Team, TeamCalendarIntegration,
    };
    use std::time::Duration;
    use tokio_test::{assert_err, assert_ok};
    use uuid::Uuid;

    async fn store_with_failing_host() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        store
            .set_app_config(AppConfig {
                org_name: "Test Organization".to_string(),
                calendar: Some(CalendarIntegration {
                    domain: "example.com".to_string(),
                    api_key: serde_json::json!({}),
                }),
            })
            .await;

        let team = Team {
            id: Uuid::from_u128(1),
            name: "Team 1".to_string(),
            calendar: TeamCalendarIntegration {
                enabled: true,
                webhook_url: String::new(),
            },
        };
        let policy = CalendarPolicy {
            id: Uuid::from_u128(10),
            name: "Policy 1".to_string(),
        };
        store.add_team(team.clone()).await;
        store.set_calendar_policies(team.id, vec![policy.clone()]).await;
        store
            .set_host_compliance(
                team.id,
                vec![HostComplianceRow {
                    host_id: Uuid::from_u128(100),
                    host_display_name: "Host 1".to_string(),
                    host_hardware_serial: "serial1".to_string(),
                    email: "user1@example.com".to_string(),
                    passing: false,
                    failing_policy_ids: policy.id.to_string(),
                }],
            )
            .await;
        store
    }

    fn config(instance: &str) -> CronConfig {
        CronConfig {
            instance_id: instance.to_string(),
            ..CronConfig::default()
        }
    }

    #[tokio::test]
    async fn test_cycle_books_and_releases_lock() {
        let store = store_with_failing_host().await;
        let calendar = Arc::new(MockCalendar::new());
        let lock = Arc::new(MemoryLock::new());
        let cron = CalendarCron::new(store.clone(), calendar.clone(), lock.clone(), config("a"));

        match assert_ok!(cron.run_cycle().await) {
            CycleOutcome::Completed(stats) => assert_eq!(stats.events_created, 1),
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(calendar.events().await.len(), 1);
        assert!(lock.holder(LOCK_NAME).await.is_none());
    }

    #[tokio::test]
    async fn test_lock_held_skips_cycle() {
        let store = store_with_failing_host().await;
        let calendar = Arc::new(MockCalendar::new());
        let lock = Arc::new(MemoryLock::new());
        assert!(lock
            .try_acquire(LOCK_NAME, "other", Duration::from_secs(300))
            .await
            .unwrap());

        let cron = CalendarCron::new(store.clone(), calendar.clone(), lock.clone(), config("a"));
        assert_eq!(cron.run_cycle().await.unwrap(), CycleOutcome::LockHeld);
        assert!(calendar.events().await.is_empty());
        assert_eq!(store.upsert_count().await, 0);
        assert_eq!(lock.holder(LOCK_NAME).await.as_deref(), Some("other"));
    }

    #[tokio::test]
    async fn test_not_configured() {
        let store = Arc::new(MemoryStore::new());
        let cron = CalendarCron::new(
            store,
            Arc::new(MockCalendar::new()),
            Arc::new(MemoryLock::new()),
            config("a"),
        );
        assert_eq!(cron.run_cycle().await.unwrap(), CycleOutcome::NotConfigured);
    }

    #[tokio::test]
    async fn test_app_config_error_surfaces_and_releases_lock() {
        let store = store_with_failing_host().await;
        store.fail_app_config(true).await;
        let lock = Arc::new(MemoryLock::new());
        let cron = CalendarCron::new(store, Arc::new(MockCalendar::new()), lock.clone(), config("a"));

        assert_err!(cron.run_cycle().await);
        assert!(lock.holder(LOCK_NAME).await.is_none());
    }

    /// Stalls every `upsert_event` call.
    struct SlowStore {
        inner: Arc<MemoryStore>,
        delay: Duration,
    }

    #[async_trait]
    impl Datastore for SlowStore {
        async fn app_config(&self) -> CronResult<AppConfig> {
            self.inner.app_config().await
        }

        async fn list_calendar_enabled_teams(&self) -> CronResult<Vec<Team>> {
            self.inner.list_calendar_enabled_teams().await
        }

        async fn calendar_policies(&self, team_id: Uuid) -> CronResult<Vec<CalendarPolicy>> {
            self.inner.calendar_policies(team_id).await
        }

        async fn policy_detail(&self, policy_id: Uuid) -> CronResult<PolicyDetail> {
            self.inner.policy_detail(policy_id).await
        }

        async fn team_host_compliance(
            &self,
            domain: &str,
            team_id: Uuid,
            policy_ids: &[Uuid],
        ) -> CronResult<Vec<HostComplianceRow>> {
            self.inner.team_host_compliance(domain, team_id, policy_ids).await
        }

        async fn event_by_email(
            &self,
            email: &str,
        ) -> CronResult<(Option<HostCalendarEvent>, CalendarEvent)> {
            self.inner.event_by_email(email).await
        }

        async fn upsert_event(&self, event: NewCalendarEvent) -> CronResult<CalendarEvent> {
            tokio::time::sleep(self.delay).await;
            self.inner.upsert_event(event).await
        }

        async fn delete_event(&self, calendar_event_id: Uuid) -> CronResult<()> {
            self.inner.delete_event(calendar_event_id).await
        }
    }

    fn slow_cron(
        store: &Arc<MemoryStore>,
        calendar: &Arc<MockCalendar>,
        lock: &Arc<MemoryLock>,
    ) -> CalendarCron {
        CalendarCron::new(
            Arc::new(SlowStore {
                inner: store.clone(),
                delay: Duration::from_millis(200),
            }),
            calendar.clone(),
            lock.clone(),
            CronConfig {
                cycle_deadline: Duration::from_millis(50),
                host_concurrency: 1,
                ..config("a")
            },
        )
    }

    #[tokio::test]
    async fn test_deadline_lets_started_host_persist() {
        let store = store_with_failing_host().await;
        let calendar = Arc::new(MockCalendar::new());
        let lock = Arc::new(MemoryLock::new());

        let outcome = assert_ok!(slow_cron(&store, &calendar, &lock).run_cycle().await);
        match outcome {
            CycleOutcome::Completed(stats) => assert_eq!(stats.events_created, 1),
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(calendar.events_for("user1@example.com").await.len(), 1);
        assert_eq!(store.events().await.len(), 1);

        let cron = CalendarCron::new(store.clone(), calendar.clone(), lock.clone(), config("a"));
        assert_ok!(cron.run_cycle().await);
        assert_eq!(calendar.events_for("user1@example.com").await.len(), 1);
        assert_eq!(store.upsert_count().await, 1);
    }

    #[tokio::test]
    async fn test_deadline_defers_unstarted_hosts() {
        let store = store_with_failing_host().await;
        let team_id = Uuid::from_u128(1);
        let policy = Uuid::from_u128(10);
        let hosts = (1..=3)
            .map(|n| HostComplianceRow {
                host_id: Uuid::from_u128(100 + n),
                host_display_name: format!("Host {}", n),
                host_hardware_serial: format!("serial{}", n),
                email: format!("user{}@example.com", n),
                passing: false,
                failing_policy_ids: policy.to_string(),
            })
            .collect();
        store.set_host_compliance(team_id, hosts).await;

        let calendar = Arc::new(MockCalendar::new());
        let lock = Arc::new(MemoryLock::new());

        let err = assert_err!(slow_cron(&store, &calendar, &lock).run_cycle().await);
        assert!(matches!(err, CronError::Deadline(_)));
        assert!(lock.holder(LOCK_NAME).await.is_none());
        // The host in flight at the deadline was stored; the others never started.
        assert_eq!(calendar.events().await.len(), 1);
        assert_eq!(store.events().await.len(), 1);

        let cron = CalendarCron::new(store.clone(), calendar.clone(), lock.clone(), config("a"));
        match assert_ok!(cron.run_cycle().await) {
            CycleOutcome::Completed(stats) => {
                assert_eq!(stats.events_created, 2);
                assert_eq!(stats.hosts_unchanged, 1);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        for n in 1..=3 {
            let email = format!("user{}@example.com", n);
            assert_eq!(calendar.events_for(&email).await.len(), 1);
        }
        assert_eq!(store.events().await.len(), 3);
    }
}
