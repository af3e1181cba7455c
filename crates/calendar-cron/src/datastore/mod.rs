//! Datastore collaborator used by the reconciliation engine.
//!
//! `PgDatastore` is the production implementation; `MemoryStore` keeps
//! everything in process and is used by tests and local dry runs.

use crate::error::CronResult;
use async_trait::async_trait;
use shared_types::{
    AppConfig, CalendarEvent, CalendarPolicy, HostCalendarEvent, HostComplianceRow,
    NewCalendarEvent, PolicyDetail, Team,
};
use uuid::Uuid;

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgDatastore;

#[async_trait]
pub trait Datastore: Send + Sync {
    /// Global configuration, including calendar integration credentials.
    async fn app_config(&self) -> CronResult<AppConfig>;

    async fn list_calendar_enabled_teams(&self) -> CronResult<Vec<Team>>;

    /// Policies of a team flagged to book a meeting on failure.
    async fn calendar_policies(&self, team_id: Uuid) -> CronResult<Vec<CalendarPolicy>>;

    /// Fails with `CronError::NotFound` if the policy was deleted.
    async fn policy_detail(&self, policy_id: Uuid) -> CronResult<PolicyDetail>;

    /// Per-host pass/fail state of a team against `policy_ids`.
    ///
    /// Hosts without an email in `domain` are returned with a blank email.
    async fn team_host_compliance(
        &self,
        domain: &str,
        team_id: Uuid,
        policy_ids: &[Uuid],
    ) -> CronResult<Vec<HostComplianceRow>>;

    /// Event booked for `email` and the host it is bound to, if any.
    ///
    /// The binding is `None` when its host was rebound to another event.
    /// Fails with `CronError::NotFound` when no event exists.
    async fn event_by_email(
        &self,
        email: &str,
    ) -> CronResult<(Option<HostCalendarEvent>, CalendarEvent)>;

    /// Atomically store an event and its host binding, keyed by `event.uuid`.
    ///
    /// A host has a single binding: storing an event for a host that is
    /// bound elsewhere moves the binding and leaves the old event unbound.
    async fn upsert_event(&self, event: NewCalendarEvent) -> CronResult<CalendarEvent>;

    /// Delete an event together with its host binding.
    async fn delete_event(&self, calendar_event_id: Uuid) -> CronResult<()>;
}
