//! In-process datastore.
//!
//! Behaves like the Postgres datastore for everything the engine relies on
//! (email natural key, uuid idempotency, one binding per host, domain
//! filtering) and can be told to fail specific calls.

use super::Datastore;
use crate::error::{CronError, CronResult};
use async_trait::async_trait;
use chrono::Utc;
use shared_types::{
    AppConfig, CalendarEvent, CalendarPolicy, HostCalendarEvent, HostComplianceRow,
    NewCalendarEvent, PolicyDetail, Team,
};
use std::collections::{HashMap, HashSet};
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
struct MemoryState {
    app_config: AppConfig,
    fail_app_config: bool,
    fail_upserts: bool,
    teams: Vec<Team>,
    failing_teams: HashSet<Uuid>,
    policies: HashMap<Uuid, Vec<CalendarPolicy>>,
    details: HashMap<Uuid, PolicyDetail>,
    compliance: HashMap<Uuid, Vec<HostComplianceRow>>,
    events: HashMap<String, CalendarEvent>,
    bindings: HashMap<Uuid, HostCalendarEvent>,
    upserts: usize,
    deletes: usize,
    detail_lookups: usize,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_app_config(&self, config: AppConfig) {
        self.state.lock().await.app_config = config;
    }

    pub async fn fail_app_config(&self, fail: bool) {
        self.state.lock().await.fail_app_config = fail;
    }

    pub async fn fail_upserts(&self, fail: bool) {
        self.state.lock().await.fail_upserts = fail;
    }

    pub async fn add_team(&self, team: Team) {
        self.state.lock().await.teams.push(team);
    }

    /// Make every per-team query for `team_id` fail.
    pub async fn fail_team(&self, team_id: Uuid) {
        self.state.lock().await.failing_teams.insert(team_id);
    }

    pub async fn set_calendar_policies(&self, team_id: Uuid, policies: Vec<CalendarPolicy>) {
        self.state.lock().await.policies.insert(team_id, policies);
    }

    pub async fn add_policy_detail(&self, detail: PolicyDetail) {
        self.state.lock().await.details.insert(detail.id, detail);
    }

    /// Replace a team's host rows. Emails outside the integration domain are
    /// blanked at query time.
    pub async fn set_host_compliance(&self, team_id: Uuid, hosts: Vec<HostComplianceRow>) {
        self.state.lock().await.compliance.insert(team_id, hosts);
    }

    /// Store an event as if some earlier cycle had booked it.
    pub async fn insert_event(&self, host_id: Uuid, event: CalendarEvent) {
        let host_event = HostCalendarEvent {
            id: Uuid::new_v4(),
            host_id,
            calendar_event_id: event.id,
            webhook_status: Default::default(),
            created_at: event.created_at,
            updated_at: event.updated_at,
        };
        let mut state = self.state.lock().await;
        state.bindings.insert(host_id, host_event);
        state.events.insert(event.email.clone(), event);
    }

    /// Store an event no host is bound to.
    pub async fn insert_unbound_event(&self, event: CalendarEvent) {
        self.state.lock().await.events.insert(event.email.clone(), event);
    }

    /// Bound events with their bindings, ordered by email.
    pub async fn events(&self) -> Vec<(HostCalendarEvent, CalendarEvent)> {
        let state = self.state.lock().await;
        let mut events: Vec<_> = state
            .events
            .values()
            .filter_map(|event| Some((state.binding_of(event.id)?.clone(), event.clone())))
            .collect();
        events.sort_by(|a, b| a.1.email.cmp(&b.1.email));
        events
    }

    pub async fn unbound_events(&self) -> Vec<CalendarEvent> {
        let state = self.state.lock().await;
        let mut events: Vec<_> = state
            .events
            .values()
            .filter(|event| state.binding_of(event.id).is_none())
            .cloned()
            .collect();
        events.sort_by(|a, b| a.email.cmp(&b.email));
        events
    }

    pub async fn upsert_count(&self) -> usize {
        self.state.lock().await.upserts
    }

    pub async fn delete_count(&self) -> usize {
        self.state.lock().await.deletes
    }

    pub async fn detail_lookup_count(&self) -> usize {
        self.state.lock().await.detail_lookups
    }
}

impl MemoryState {
    fn binding_of(&self, calendar_event_id: Uuid) -> Option<&HostCalendarEvent> {
        self.bindings
            .values()
            .find(|binding| binding.calendar_event_id == calendar_event_id)
    }
}

fn in_domain(email: &str, domain: &str) -> bool {
    email
        .rsplit_once('@')
        .map(|(_, d)| d.eq_ignore_ascii_case(domain.trim()))
        .unwrap_or(false)
}

#[async_trait]
impl Datastore for MemoryStore {
    async fn app_config(&self) -> CronResult<AppConfig> {
        let state = self.state.lock().await;
        if state.fail_app_config {
            return Err(CronError::Internal(anyhow::anyhow!("app config unavailable")));
        }
        Ok(state.app_config.clone())
    }

    async fn list_calendar_enabled_teams(&self) -> CronResult<Vec<Team>> {
        let state = self.state.lock().await;
        Ok(state
            .teams
            .iter()
            .filter(|team| team.calendar_enabled())
            .cloned()
            .collect())
    }

    async fn calendar_policies(&self, team_id: Uuid) -> CronResult<Vec<CalendarPolicy>> {
        let state = self.state.lock().await;
        if state.failing_teams.contains(&team_id) {
            return Err(CronError::Internal(anyhow::anyhow!(
                "policies unavailable for team {}",
                team_id
            )));
        }
        Ok(state.policies.get(&team_id).cloned().unwrap_or_default())
    }

    async fn policy_detail(&self, policy_id: Uuid) -> CronResult<PolicyDetail> {
        let mut state = self.state.lock().await;
        state.detail_lookups += 1;
        state
            .details
            .get(&policy_id)
            .cloned()
            .ok_or_else(|| CronError::not_found(format!("Policy {}", policy_id)))
    }

    async fn team_host_compliance(
        &self,
        domain: &str,
        team_id: Uuid,
        policy_ids: &[Uuid],
    ) -> CronResult<Vec<HostComplianceRow>> {
        let state = self.state.lock().await;
        if state.failing_teams.contains(&team_id) {
            return Err(CronError::Internal(anyhow::anyhow!(
                "compliance unavailable for team {}",
                team_id
            )));
        }
        if policy_ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows = state
            .compliance
            .get(&team_id)
            .map(|rows| {
                rows.iter()
                    .cloned()
                    .map(|mut row| {
                        if !in_domain(&row.email, domain) {
                            row.email.clear();
                        }
                        row
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(rows)
    }

    async fn event_by_email(
        &self,
        email: &str,
    ) -> CronResult<(Option<HostCalendarEvent>, CalendarEvent)> {
        let state = self.state.lock().await;
        let event = state
            .events
            .get(email)
            .cloned()
            .ok_or_else(|| CronError::not_found(format!("Calendar event for {}", email)))?;
        Ok((state.binding_of(event.id).cloned(), event))
    }

    async fn upsert_event(&self, event: NewCalendarEvent) -> CronResult<CalendarEvent> {
        let mut state = self.state.lock().await;
        if state.fail_upserts {
            return Err(CronError::Internal(anyhow::anyhow!("upsert rejected")));
        }
        state.upserts += 1;

        let now = Utc::now();
        let (id, created_at) = match state.events.get(&event.email) {
            Some(existing) if existing.uuid != event.uuid => {
                return Err(CronError::Internal(anyhow::anyhow!(
                    "calendar event for {} already exists",
                    event.email
                )));
            }
            Some(existing) => (existing.id, existing.created_at),
            None => (Uuid::new_v4(), now),
        };

        let stored = CalendarEvent {
            id,
            uuid: event.uuid,
            email: event.email.clone(),
            start_time: event.start_time,
            end_time: event.end_time,
            details: event.details,
            timezone: event.timezone,
            created_at,
            updated_at: now,
        };
        // Replaces any previous binding of the host, like ON CONFLICT (host_id).
        let (binding_id, bound_at) = match state.bindings.get(&event.host_id) {
            Some(existing) => (existing.id, existing.created_at),
            None => (Uuid::new_v4(), now),
        };
        state.bindings.insert(
            event.host_id,
            HostCalendarEvent {
                id: binding_id,
                host_id: event.host_id,
                calendar_event_id: id,
                webhook_status: event.webhook_status,
                created_at: bound_at,
                updated_at: now,
            },
        );
        state.events.insert(event.email, stored.clone());

        Ok(stored)
    }

    async fn delete_event(&self, calendar_event_id: Uuid) -> CronResult<()> {
        let mut state = self.state.lock().await;
        state.deletes += 1;
        state
            .bindings
            .retain(|_, binding| binding.calendar_event_id != calendar_event_id);
        state.events.retain(|_, event| event.id != calendar_event_id);
        Ok(())
    }
}
