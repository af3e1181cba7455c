// Database models for Diesel
use crate::error::CronError;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::sql_types::{Bool, Text};
use shared_types::{
    AppConfig, CalendarEvent, CalendarIntegration, EventDetails, HostCalendarEvent,
    HostComplianceRow, Team, TeamCalendarIntegration, WebhookStatus,
};
use uuid::Uuid;

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = crate::schema::teams)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct TeamRow {
    pub id: Uuid,
    pub name: String,
    pub calendar_enabled: bool,
    pub calendar_webhook_url: String,
    pub created_at: DateTime<Utc>,
}

impl From<TeamRow> for Team {
    fn from(row: TeamRow) -> Self {
        Team {
            id: row.id,
            name: row.name,
            calendar: TeamCalendarIntegration {
                enabled: row.calendar_enabled,
                webhook_url: row.calendar_webhook_url,
            },
        }
    }
}

/// Single-row global settings table
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = crate::schema::app_config)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct AppConfigRow {
    pub id: i32,
    pub org_name: String,
    pub calendar_domain: Option<String>,
    pub calendar_api_key: Option<String>, // JSON stored as TEXT
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<AppConfigRow> for AppConfig {
    type Error = CronError;

    /// The integration is only considered configured when both the domain
    /// and the service account key are present.
    fn try_from(row: AppConfigRow) -> Result<Self, Self::Error> {
        let domain = row
            .calendar_domain
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());
        let api_key = row.calendar_api_key.filter(|k| !k.trim().is_empty());

        let calendar = match (domain, api_key) {
            (Some(domain), Some(key)) => Some(CalendarIntegration {
                domain,
                api_key: serde_json::from_str(&key)?,
            }),
            _ => None,
        };

        Ok(AppConfig {
            org_name: row.org_name,
            calendar,
        })
    }
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = crate::schema::calendar_events)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct CalendarEventRow {
    pub id: Uuid,
    pub event_uuid: Uuid,
    pub email: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub event_details: EventDetails, // JSON stored as TEXT
    pub timezone: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<CalendarEventRow> for CalendarEvent {
    fn from(row: CalendarEventRow) -> Self {
        CalendarEvent {
            id: row.id,
            uuid: row.event_uuid,
            email: row.email,
            start_time: row.start_time,
            end_time: row.end_time,
            details: row.event_details,
            timezone: row.timezone,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::calendar_events)]
pub struct NewCalendarEventRow {
    pub event_uuid: Uuid,
    pub email: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub event_details: EventDetails,
    pub timezone: Option<String>,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = crate::schema::host_calendar_events)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct HostCalendarEventRow {
    pub id: Uuid,
    pub host_id: Uuid,
    pub calendar_event_id: Uuid,
    pub webhook_status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<HostCalendarEventRow> for HostCalendarEvent {
    type Error = CronError;

    fn try_from(row: HostCalendarEventRow) -> Result<Self, Self::Error> {
        let webhook_status = row
            .webhook_status
            .parse::<WebhookStatus>()
            .map_err(|e| CronError::Internal(anyhow::anyhow!(e)))?;

        Ok(HostCalendarEvent {
            id: row.id,
            host_id: row.host_id,
            calendar_event_id: row.calendar_event_id,
            webhook_status,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::host_calendar_events)]
pub struct NewHostCalendarEventRow {
    pub host_id: Uuid,
    pub calendar_event_id: Uuid,
    pub webhook_status: String,
}

/// Result row of the team compliance query (raw SQL)
#[derive(Debug, Clone, QueryableByName)]
pub struct HostComplianceRecord {
    #[diesel(sql_type = diesel::sql_types::Uuid)]
    pub host_id: Uuid,
    #[diesel(sql_type = Text)]
    pub host_display_name: String,
    #[diesel(sql_type = Text)]
    pub host_hardware_serial: String,
    #[diesel(sql_type = Text)]
    pub email: String,
    #[diesel(sql_type = Bool)]
    pub passing: bool,
    #[diesel(sql_type = Text)]
    pub failing_policy_ids: String,
}

impl From<HostComplianceRecord> for HostComplianceRow {
    fn from(record: HostComplianceRecord) -> Self {
        HostComplianceRow {
            host_id: record.host_id,
            host_display_name: record.host_display_name,
            host_hardware_serial: record.host_hardware_serial,
            email: record.email,
            passing: record.passing,
            failing_policy_ids: record.failing_policy_ids,
        }
    }
}
