use super::Datastore;
use crate::db::DbPool;
use crate::error::{CronError, CronResult};
use crate::models::{
    AppConfigRow, CalendarEventRow, HostCalendarEventRow, HostComplianceRecord,
    NewCalendarEventRow, NewHostCalendarEventRow, TeamRow,
};
use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use diesel::upsert::excluded;
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use shared_types::{
    AppConfig, CalendarEvent, CalendarPolicy, HostCalendarEvent, HostComplianceRow,
    NewCalendarEvent, PolicyDetail, Team,
};
use uuid::Uuid;

/// Postgres-backed datastore
#[derive(Clone)]
pub struct PgDatastore {
    pool: DbPool,
}

impl PgDatastore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Datastore for PgDatastore {
    async fn app_config(&self) -> CronResult<AppConfig> {
        let mut conn = self.pool.get().await?;
        settings_queries::get(&mut conn).await
    }

    async fn list_calendar_enabled_teams(&self) -> CronResult<Vec<Team>> {
        let mut conn = self.pool.get().await?;
        team_queries::list_calendar_enabled(&mut conn).await
    }

    async fn calendar_policies(&self, team_id: Uuid) -> CronResult<Vec<CalendarPolicy>> {
        let mut conn = self.pool.get().await?;
        policy_queries::list_calendar_enabled(&mut conn, team_id).await
    }

    async fn policy_detail(&self, policy_id: Uuid) -> CronResult<PolicyDetail> {
        let mut conn = self.pool.get().await?;
        policy_queries::get_detail(&mut conn, policy_id).await
    }

    async fn team_host_compliance(
        &self,
        domain: &str,
        team_id: Uuid,
        policy_ids: &[Uuid],
    ) -> CronResult<Vec<HostComplianceRow>> {
        let mut conn = self.pool.get().await?;
        compliance_queries::team_hosts(&mut conn, domain, team_id, policy_ids).await
    }

    async fn event_by_email(
        &self,
        email: &str,
    ) -> CronResult<(Option<HostCalendarEvent>, CalendarEvent)> {
        let mut conn = self.pool.get().await?;
        event_queries::get_by_email(&mut conn, email).await
    }

    async fn upsert_event(&self, event: NewCalendarEvent) -> CronResult<CalendarEvent> {
        let mut conn = self.pool.get().await?;
        event_queries::upsert(&mut conn, event).await
    }

    async fn delete_event(&self, calendar_event_id: Uuid) -> CronResult<()> {
        let mut conn = self.pool.get().await?;
        event_queries::delete(&mut conn, calendar_event_id).await
    }
}

mod settings_queries {
    use super::*;

    pub async fn get(conn: &mut AsyncPgConnection) -> CronResult<AppConfig> {
        use crate::schema::app_config::dsl::*;

        let row = app_config
            .order_by(id.asc())
            .select(AppConfigRow::as_select())
            .first::<AppConfigRow>(conn)
            .await
            .optional()?;

        match row {
            Some(row) => row.try_into(),
            None => Ok(AppConfig::default()),
        }
    }
}

mod team_queries {
    use super::*;

    pub async fn list_calendar_enabled(conn: &mut AsyncPgConnection) -> CronResult<Vec<Team>> {
        use crate::schema::teams::dsl::*;

        let rows = teams
            .filter(calendar_enabled.eq(true))
            .order_by(name.asc())
            .select(TeamRow::as_select())
            .load::<TeamRow>(conn)
            .await?;

        Ok(rows.into_iter().map(Team::from).collect())
    }
}

mod policy_queries {
    use super::*;

    pub async fn list_calendar_enabled(
        conn: &mut AsyncPgConnection,
        team: Uuid,
    ) -> CronResult<Vec<CalendarPolicy>> {
        use crate::schema::policies::dsl::*;

        let rows = policies
            .filter(team_id.eq(team))
            .filter(calendar_events_enabled.eq(true))
            .order_by(id.asc())
            .select((id, name))
            .load::<CalendarPolicy>(conn)
            .await?;

        Ok(rows)
    }

    pub async fn get_detail(conn: &mut AsyncPgConnection, policy: Uuid) -> CronResult<PolicyDetail> {
        use crate::schema::policies::dsl::*;

        policies
            .filter(id.eq(policy))
            .select((id, description, resolution))
            .first::<PolicyDetail>(conn)
            .await
            .optional()?
            .ok_or_else(|| CronError::not_found(format!("Policy {}", policy)))
    }
}

mod compliance_queries {
    use super::*;
    use diesel::sql_types::{Array, Text, Uuid as SqlUuid};

    // Unknown results (NULL) count as not passing but are not listed as failing.
    const TEAM_HOST_COMPLIANCE: &str = r#"
        SELECT
            h.id AS host_id,
            h.display_name AS host_display_name,
            h.hardware_serial AS host_hardware_serial,
            COALESCE(he.email, '') AS email,
            pm.passing AS passing,
            COALESCE(pm.failing_policy_ids, '') AS failing_policy_ids
        FROM (
            SELECT
                host_id,
                BOOL_AND(COALESCE(passes, FALSE)) AS passing,
                STRING_AGG(
                    CASE WHEN passes = FALSE THEN policy_id::text END,
                    ',' ORDER BY policy_id
                ) AS failing_policy_ids
            FROM policy_membership
            WHERE policy_id = ANY($1)
            GROUP BY host_id
        ) pm
        JOIN hosts h ON h.id = pm.host_id
        LEFT JOIN (
            SELECT host_id, MIN(email) AS email
            FROM host_emails
            WHERE LOWER(SPLIT_PART(email, '@', 2)) = LOWER($2)
            GROUP BY host_id
        ) he ON he.host_id = h.id
        WHERE h.team_id = $3
        ORDER BY h.id
    "#;

    pub async fn team_hosts(
        conn: &mut AsyncPgConnection,
        domain: &str,
        team_id: Uuid,
        policy_ids: &[Uuid],
    ) -> CronResult<Vec<HostComplianceRow>> {
        let records = diesel::sql_query(TEAM_HOST_COMPLIANCE)
            .bind::<Array<SqlUuid>, _>(policy_ids.to_vec())
            .bind::<Text, _>(domain.trim())
            .bind::<SqlUuid, _>(team_id)
            .load::<HostComplianceRecord>(conn)
            .await?;

        Ok(records.into_iter().map(HostComplianceRow::from).collect())
    }
}

mod event_queries {
    use super::*;
    use crate::schema::{calendar_events, host_calendar_events};

    pub async fn get_by_email(
        conn: &mut AsyncPgConnection,
        email: &str,
    ) -> CronResult<(Option<HostCalendarEvent>, CalendarEvent)> {
        let found = calendar_events::table
            .left_join(host_calendar_events::table)
            .filter(calendar_events::email.eq(email))
            .select((
                CalendarEventRow::as_select(),
                host_calendar_events::all_columns.nullable(),
            ))
            .first::<(CalendarEventRow, Option<HostCalendarEventRow>)>(conn)
            .await
            .optional()?;

        match found {
            Some((event, host_event)) => {
                let host_event = host_event.map(HostCalendarEvent::try_from).transpose()?;
                Ok((host_event, event.into()))
            }
            None => Err(CronError::not_found(format!("Calendar event for {}", email))),
        }
    }

    /// Insert or update the event keyed by its uuid, then bind it to the host.
    ///
    /// A host has a single binding; rebinding leaves any previous event
    /// unbound until a host with that email adopts it.
    pub async fn upsert(
        conn: &mut AsyncPgConnection,
        new_event: NewCalendarEvent,
    ) -> CronResult<CalendarEvent> {
        conn.transaction::<_, CronError, _>(|conn| {
            async move {
                let now = Utc::now();
                let row = diesel::insert_into(calendar_events::table)
                    .values(&NewCalendarEventRow {
                        event_uuid: new_event.uuid,
                        email: new_event.email.clone(),
                        start_time: new_event.start_time,
                        end_time: new_event.end_time,
                        event_details: new_event.details.clone(),
                        timezone: new_event.timezone.clone(),
                    })
                    .on_conflict(calendar_events::event_uuid)
                    .do_update()
                    .set((
                        calendar_events::start_time.eq(excluded(calendar_events::start_time)),
                        calendar_events::end_time.eq(excluded(calendar_events::end_time)),
                        calendar_events::event_details.eq(excluded(calendar_events::event_details)),
                        calendar_events::timezone.eq(excluded(calendar_events::timezone)),
                        calendar_events::updated_at.eq(now),
                    ))
                    .get_result::<CalendarEventRow>(conn)
                    .await?;

                diesel::insert_into(host_calendar_events::table)
                    .values(&NewHostCalendarEventRow {
                        host_id: new_event.host_id,
                        calendar_event_id: row.id,
                        webhook_status: new_event.webhook_status.as_str().to_string(),
                    })
                    .on_conflict(host_calendar_events::host_id)
                    .do_update()
                    .set((
                        host_calendar_events::calendar_event_id
                            .eq(excluded(host_calendar_events::calendar_event_id)),
                        host_calendar_events::webhook_status
                            .eq(excluded(host_calendar_events::webhook_status)),
                        host_calendar_events::updated_at.eq(now),
                    ))
                    .execute(conn)
                    .await?;

                Ok(CalendarEvent::from(row))
            }
            .scope_boxed()
        })
        .await
    }

    pub async fn delete(conn: &mut AsyncPgConnection, event_id: Uuid) -> CronResult<()> {
        conn.transaction::<_, CronError, _>(|conn| {
            async move {
                diesel::delete(
                    host_calendar_events::table
                        .filter(host_calendar_events::calendar_event_id.eq(event_id)),
                )
                .execute(conn)
                .await?;

                diesel::delete(calendar_events::table.filter(calendar_events::id.eq(event_id)))
                    .execute(conn)
                    .await?;

                Ok(())
            }
            .scope_boxed()
        })
        .await
    }
}
