//! Calendar event reconciliation.
//!
//! One cycle walks every calendar-enabled team, loads the compliance state of
//! its hosts and converges the stored calendar events onto it:
//!
//! - a failing host with an in-domain email gets exactly one event, booked on
//!   the next preferred meeting slot
//! - a passing host has its event removed, remotely and locally
//! - an event bound to a different host is never touched
//!
//! Teams run concurrently, as do hosts within a team. Work for the same email
//! is serialized through a per-email lock shared by the whole cycle.
//!
//! A cycle deadline stops new work only. Teams and hosts not yet started when
//! it passes are deferred to the next cycle; a host already started always
//! finishes, so a remote event is never left without its stored record.

use crate::body::{self, EVENT_SUMMARY};
use crate::calendar::{CalendarProvider, EventRequest};
use crate::config::{CronConfig, ExistingEventPolicy};
use crate::datastore::Datastore;
use crate::error::{CronError, CronResult};
use crate::snapshot;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use shared_types::{
    CalendarEvent, CalendarIntegration, HostComplianceRow, NewCalendarEvent, PolicyDetail, Team,
    WebhookStatus,
};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Counters for one reconciliation cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleStats {
    pub teams_processed: usize,
    /// Teams with no calendar-enabled policies
    pub teams_skipped: usize,
    pub teams_failed: usize,
    pub events_created: usize,
    pub events_deleted: usize,
    pub events_regenerated: usize,
    /// Unbound events taken over by a failing host with the same email
    pub events_adopted: usize,
    pub hosts_unchanged: usize,
    /// Hosts whose email already has an event bound to another host
    pub hosts_foreign: usize,
    /// Hosts without an email in the integration domain
    pub hosts_outside_domain: usize,
    pub host_failures: usize,
    /// Teams not started before the cycle deadline
    pub teams_deferred: usize,
    /// Hosts not started before the cycle deadline
    pub hosts_deferred: usize,
}

impl CycleStats {
    /// Whether the deadline left any work for the next cycle.
    pub fn deferred(&self) -> bool {
        self.teams_deferred > 0 || self.hosts_deferred > 0
    }

    fn merge(&mut self, other: &CycleStats) {
        self.teams_processed += other.teams_processed;
        self.teams_skipped += other.teams_skipped;
        self.teams_failed += other.teams_failed;
        self.events_created += other.events_created;
        self.events_deleted += other.events_deleted;
        self.events_regenerated += other.events_regenerated;
        self.events_adopted += other.events_adopted;
        self.hosts_unchanged += other.hosts_unchanged;
        self.hosts_foreign += other.hosts_foreign;
        self.hosts_outside_domain += other.hosts_outside_domain;
        self.host_failures += other.host_failures;
        self.teams_deferred += other.teams_deferred;
        self.hosts_deferred += other.hosts_deferred;
    }

    fn record(&mut self, outcome: HostOutcome) {
        match outcome {
            HostOutcome::Created => self.events_created += 1,
            HostOutcome::Deleted => self.events_deleted += 1,
            HostOutcome::Regenerated => self.events_regenerated += 1,
            HostOutcome::Adopted => self.events_adopted += 1,
            HostOutcome::Unchanged => self.hosts_unchanged += 1,
            HostOutcome::Foreign => self.hosts_foreign += 1,
            HostOutcome::Failed => self.host_failures += 1,
            HostOutcome::Deferred => self.hosts_deferred += 1,
        }
    }
}

impl fmt::Display for CycleStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} teams ({} skipped, {} failed, {} deferred), {} created, {} deleted, {} regenerated, {} adopted, {} unchanged, {} foreign, {} outside domain, {} deferred, {} host failures",
            self.teams_processed,
            self.teams_skipped,
            self.teams_failed,
            self.teams_deferred,
            self.events_created,
            self.events_deleted,
            self.events_regenerated,
            self.events_adopted,
            self.hosts_unchanged,
            self.hosts_foreign,
            self.hosts_outside_domain,
            self.hosts_deferred,
            self.host_failures
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HostOutcome {
    Created,
    Deleted,
    Regenerated,
    Adopted,
    Unchanged,
    Foreign,
    Failed,
    Deferred,
}

/// Serializes work on the same email across all teams of a cycle.
#[derive(Default)]
struct EmailLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl EmailLocks {
    async fn lock(&self, email: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks.entry(email.to_ascii_lowercase()).or_default().clone()
        };
        lock.lock_owned().await
    }
}

/// Policy details looked up at most once per cycle.
#[derive(Default)]
struct PolicyDetailCache {
    entries: Mutex<HashMap<Uuid, Option<PolicyDetail>>>,
}

impl PolicyDetailCache {
    /// `None` means the text falls back to the defaults.
    async fn get(&self, datastore: &dyn Datastore, policy_id: Uuid) -> Option<PolicyDetail> {
        if let Some(cached) = self.entries.lock().await.get(&policy_id) {
            return cached.clone();
        }

        let detail = match datastore.policy_detail(policy_id).await {
            Ok(detail) => Some(detail),
            Err(e) if e.is_not_found() => {
                debug!("Policy {} no longer exists, using default text", policy_id);
                None
            }
            Err(e) => {
                // Not cached so a later host can retry.
                warn!("Failed to look up policy {}: {}", policy_id, e);
                return None;
            }
        };

        self.entries.lock().await.insert(policy_id, detail.clone());
        detail
    }
}

struct CycleContext {
    org_name: String,
    integration: CalendarIntegration,
    now: DateTime<Utc>,
    deadline: Option<Instant>,
    email_locks: EmailLocks,
    details: PolicyDetailCache,
}

impl CycleContext {
    fn past_deadline(&self) -> bool {
        self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }
}

pub struct Reconciler {
    datastore: Arc<dyn Datastore>,
    calendar: Arc<dyn CalendarProvider>,
    config: CronConfig,
}

impl Reconciler {
    pub fn new(
        datastore: Arc<dyn Datastore>,
        calendar: Arc<dyn CalendarProvider>,
        config: CronConfig,
    ) -> Self {
        Self {
            datastore,
            calendar,
            config,
        }
    }

    /// Run one reconciliation pass over every calendar-enabled team.
    ///
    /// Returns `Ok(None)` when no calendar integration is configured. Failing
    /// to read the global configuration or the team list aborts the cycle;
    /// failures of a single team or host are logged and counted.
    pub async fn reconcile(&self) -> CronResult<Option<CycleStats>> {
        self.reconcile_at(Utc::now()).await
    }

    /// Like `reconcile`, but starts no team or host after `deadline`.
    ///
    /// Work in flight when the deadline passes runs to completion; the rest
    /// is counted as deferred.
    pub async fn reconcile_until(&self, deadline: Instant) -> CronResult<Option<CycleStats>> {
        self.run(Utc::now(), Some(deadline)).await
    }

    /// Like `reconcile`, booking meetings relative to `now`.
    pub async fn reconcile_at(&self, now: DateTime<Utc>) -> CronResult<Option<CycleStats>> {
        self.run(now, None).await
    }

    async fn run(
        &self,
        now: DateTime<Utc>,
        deadline: Option<Instant>,
    ) -> CronResult<Option<CycleStats>> {
        let app_config = self.datastore.app_config().await?;
        let Some(integration) = app_config.calendar else {
            debug!("No calendar integration configured, skipping cycle");
            return Ok(None);
        };

        let teams = self.datastore.list_calendar_enabled_teams().await?;
        let teams: Vec<Team> = teams.into_iter().filter(Team::calendar_enabled).collect();
        debug!("Reconciling calendar events for {} teams", teams.len());

        let ctx = CycleContext {
            org_name: app_config.org_name,
            integration,
            now,
            deadline,
            email_locks: EmailLocks::default(),
            details: PolicyDetailCache::default(),
        };
        let ctx = &ctx;

        let stats = stream::iter(teams)
            .map(|team| async move { self.reconcile_team(ctx, &team).await })
            .buffer_unordered(self.config.team_concurrency.max(1))
            .fold(CycleStats::default(), |mut total, team_stats| async move {
                total.merge(&team_stats);
                total
            })
            .await;

        Ok(Some(stats))
    }

    async fn reconcile_team(&self, ctx: &CycleContext, team: &Team) -> CycleStats {
        let mut stats = CycleStats::default();

        if ctx.past_deadline() {
            warn!("Cycle deadline reached, deferring team {}", team.name);
            stats.teams_deferred += 1;
            return stats;
        }

        let snapshot =
            match snapshot::load_snapshot(self.datastore.as_ref(), &ctx.integration.domain, team)
                .await
            {
                Ok(Some(snapshot)) => snapshot,
                Ok(None) => {
                    debug!("Team {} has no calendar policies, skipping", team.name);
                    stats.teams_skipped += 1;
                    return stats;
                }
                Err(e) => {
                    error!(
                        "Failed to load compliance for team {} ({}): {}",
                        team.name, team.id, e
                    );
                    stats.teams_failed += 1;
                    return stats;
                }
            };
        stats.teams_processed += 1;

        let (hosts, outside): (Vec<_>, Vec<_>) =
            snapshot.hosts.into_iter().partition(HostComplianceRow::has_email);
        stats.hosts_outside_domain += outside.len();

        let host_stats = stream::iter(hosts)
            .map(|host| async move { self.reconcile_host(ctx, &host).await })
            .buffer_unordered(self.config.host_concurrency.max(1))
            .fold(CycleStats::default(), |mut total, outcome| async move {
                total.record(outcome);
                total
            })
            .await;
        stats.merge(&host_stats);

        if host_stats.hosts_deferred > 0 {
            warn!(
                "Cycle deadline reached, deferred {} hosts of team {}",
                host_stats.hosts_deferred, team.name
            );
        }

        debug!("Team {}: {}", team.name, stats);
        stats
    }

    async fn reconcile_host(&self, ctx: &CycleContext, host: &HostComplianceRow) -> HostOutcome {
        let _guard = ctx.email_locks.lock(&host.email).await;

        if ctx.past_deadline() {
            debug!("Cycle deadline reached, deferring host {}", host.host_id);
            return HostOutcome::Deferred;
        }

        let result = if host.passing {
            self.release_passing_host(ctx, host).await
        } else {
            self.book_failing_host(ctx, host).await
        };

        match result {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(
                    "Calendar reconciliation failed for host {} ({}): {}",
                    host.host_id, host.email, e
                );
                HostOutcome::Failed
            }
        }
    }

    async fn release_passing_host(
        &self,
        ctx: &CycleContext,
        host: &HostComplianceRow,
    ) -> CronResult<HostOutcome> {
        let (host_event, event) = match self.datastore.event_by_email(&host.email).await {
            Ok(found) => found,
            Err(e) if e.is_not_found() => return Ok(HostOutcome::Unchanged),
            Err(e) => return Err(e),
        };

        match host_event {
            Some(host_event) if host_event.host_id != host.host_id => {
                debug!(
                    "Event for {} belongs to host {}, leaving it for that host",
                    host.email, host_event.host_id
                );
                return Ok(HostOutcome::Foreign);
            }
            Some(_) => {}
            None => {
                debug!(
                    "Event for {} is not bound to any host, leaving it for cleanup",
                    host.email
                );
                return Ok(HostOutcome::Unchanged);
            }
        }

        self.remove_event(ctx, &event).await?;
        info!(
            "Removed calendar event for {} now that host {} passes",
            host.email, host.host_id
        );
        Ok(HostOutcome::Deleted)
    }

    async fn book_failing_host(
        &self,
        ctx: &CycleContext,
        host: &HostComplianceRow,
    ) -> CronResult<HostOutcome> {
        let failing = host.failing_policy_ids();

        match self.datastore.event_by_email(&host.email).await {
            Ok((host_event, event)) => {
                let adopted = match host_event {
                    Some(host_event) if host_event.host_id != host.host_id => {
                        debug!(
                            "Event for {} belongs to host {}, not booking for host {}",
                            host.email, host_event.host_id, host.host_id
                        );
                        return Ok(HostOutcome::Foreign);
                    }
                    Some(_) => false,
                    None => {
                        self.adopt_event(host, &event).await?;
                        true
                    }
                };

                if self.config.existing_event_policy == ExistingEventPolicy::Regenerate
                    && event.details.failing_policies_differ(&failing)
                {
                    self.remove_event(ctx, &event).await?;
                    self.create_event(ctx, host, &failing).await?;
                    return Ok(HostOutcome::Regenerated);
                }

                Ok(if adopted {
                    HostOutcome::Adopted
                } else {
                    HostOutcome::Unchanged
                })
            }
            Err(e) if e.is_not_found() => {
                self.create_event(ctx, host, &failing).await?;
                Ok(HostOutcome::Created)
            }
            Err(e) => Err(e),
        }
    }

    /// Bind an unbound event to `host`, keeping the remote event as it is.
    async fn adopt_event(&self, host: &HostComplianceRow, event: &CalendarEvent) -> CronResult<()> {
        self.datastore
            .upsert_event(NewCalendarEvent {
                uuid: event.uuid,
                email: event.email.clone(),
                start_time: event.start_time,
                end_time: event.end_time,
                details: event.details.clone(),
                timezone: event.timezone.clone(),
                host_id: host.host_id,
                webhook_status: WebhookStatus::None,
            })
            .await?;

        info!(
            "Bound existing calendar event {} for {} to host {}",
            event.details.id, event.email, host.host_id
        );
        Ok(())
    }

    /// Delete remotely (already gone is fine), then locally.
    async fn remove_event(&self, ctx: &CycleContext, event: &CalendarEvent) -> CronResult<()> {
        match self
            .calendar
            .delete_event(&ctx.integration, &event.email, &event.details)
            .await
        {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                debug!(
                    "Remote event {} for {} was already deleted",
                    event.details.id, event.email
                );
            }
            Err(e) => return Err(e),
        }

        self.datastore.delete_event(event.id).await
    }

    async fn create_event(
        &self,
        ctx: &CycleContext,
        host: &HostComplianceRow,
        failing: &[Uuid],
    ) -> CronResult<CalendarEvent> {
        let mut policies = Vec::with_capacity(failing.len());
        for policy_id in failing {
            policies.push(ctx.details.get(self.datastore.as_ref(), *policy_id).await);
        }
        let description = body::event_body(&ctx.org_name, &host.host_display_name, &policies);

        let (start, end) = self.config.slot.next_after(ctx.now).ok_or_else(|| {
            CronError::config(format!("No meeting slot available after {}", ctx.now))
        })?;
        let timezone = Some(self.config.slot.timezone_name().to_string());

        let request = EventRequest {
            email: host.email.clone(),
            summary: EVENT_SUMMARY.to_string(),
            description,
            start,
            end,
            timezone: timezone.clone(),
        };

        let details = self
            .calendar
            .create_event(&ctx.integration, &request)
            .await?
            .with_failing_policies(failing);

        let new_event = NewCalendarEvent {
            uuid: Uuid::new_v4(),
            email: host.email.clone(),
            start_time: start,
            end_time: end,
            details: details.clone(),
            timezone,
            host_id: host.host_id,
            webhook_status: WebhookStatus::None,
        };

        match self.datastore.upsert_event(new_event).await {
            Ok(stored) => {
                info!(
                    "Booked calendar event {} for host {} ({}) at {}",
                    details.id, host.host_id, host.email, start
                );
                Ok(stored)
            }
            Err(e) => {
                warn!(
                    "Failed to store calendar event for {}, deleting remote event {}",
                    host.email, details.id
                );
                if let Err(cleanup) = self
                    .calendar
                    .delete_event(&ctx.integration, &host.email, &details)
                    .await
                {
                    warn!(
                        "Failed to delete orphaned remote event {} for {}: {}",
                        details.id, host.email, cleanup
                    );
                }
                Err(e)
            }
        }
    }
}
