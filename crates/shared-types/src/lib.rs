use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

mod details;

pub use details::EventDetails;

/// Per-team calendar integration settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamCalendarIntegration {
    pub enabled: bool,
    pub webhook_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    pub id: Uuid,
    pub name: String,
    pub calendar: TeamCalendarIntegration,
}

impl Team {
    pub fn calendar_enabled(&self) -> bool {
        self.calendar.enabled
    }
}

/// A policy whose failure should book a remediation meeting
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "diesel", derive(diesel::Queryable))]
pub struct CalendarPolicy {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "diesel", derive(diesel::Queryable))]
pub struct PolicyDetail {
    pub id: Uuid,
    pub description: String,
    pub resolution: Option<String>,
}

impl PolicyDetail {
    /// Description with surrounding whitespace removed, `None` when blank.
    pub fn description_text(&self) -> Option<&str> {
        non_blank(&self.description)
    }

    /// Resolution with surrounding whitespace removed, `None` when absent or blank.
    pub fn resolution_text(&self) -> Option<&str> {
        self.resolution.as_deref().and_then(non_blank)
    }
}

fn non_blank(s: &str) -> Option<&str> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

/// Pass/fail state of one host against a team's calendar policies.
///
/// `email` is empty when none of the host's identities belong to the
/// configured calendar domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostComplianceRow {
    pub host_id: Uuid,
    pub host_display_name: String,
    pub host_hardware_serial: String,
    pub email: String,
    pub passing: bool,
    /// Comma-joined list of failing calendar policy ids
    pub failing_policy_ids: String,
}

impl HostComplianceRow {
    /// Whether this host can be scheduled at all
    pub fn has_email(&self) -> bool {
        !self.email.trim().is_empty()
    }

    /// Parse `failing_policy_ids`, skipping blank and malformed entries.
    pub fn failing_policy_ids(&self) -> Vec<Uuid> {
        self.failing_policy_ids
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .filter_map(|s| match Uuid::parse_str(s) {
                Ok(id) => Some(id),
                Err(e) => {
                    tracing::warn!(
                        "Ignoring malformed failing policy id {:?} for host {}: {}",
                        s,
                        self.host_id,
                        e
                    );
                    None
                }
            })
            .collect()
    }
}

/// Webhook delivery state of a host calendar event.
///
/// This engine only ever writes `None`; the webhook subsystem owns the
/// remaining transitions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookStatus {
    #[default]
    None,
    Pending,
    Sent,
    Failed,
}

impl WebhookStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WebhookStatus::None => "none",
            WebhookStatus::Pending => "pending",
            WebhookStatus::Sent => "sent",
            WebhookStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for WebhookStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownWebhookStatus(pub String);

impl fmt::Display for UnknownWebhookStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown webhook status: {}", self.0)
    }
}

impl std::error::Error for UnknownWebhookStatus {}

impl FromStr for WebhookStatus {
    type Err = UnknownWebhookStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(WebhookStatus::None),
            "pending" => Ok(WebhookStatus::Pending),
            "sent" => Ok(WebhookStatus::Sent),
            "failed" => Ok(WebhookStatus::Failed),
            other => Err(UnknownWebhookStatus(other.to_string())),
        }
    }
}

/// A calendar event booked for one user (natural key: `email`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub id: Uuid,
    /// Idempotency token supplied at creation
    pub uuid: Uuid,
    pub email: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub details: EventDetails,
    pub timezone: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Binding between a host and the calendar event booked for it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostCalendarEvent {
    pub id: Uuid,
    pub host_id: Uuid,
    pub calendar_event_id: Uuid,
    pub webhook_status: WebhookStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Everything needed to persist a freshly created remote event
#[derive(Debug, Clone, PartialEq)]
pub struct NewCalendarEvent {
    pub uuid: Uuid,
    pub email: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub details: EventDetails,
    pub timezone: Option<String>,
    pub host_id: Uuid,
    pub webhook_status: WebhookStatus,
}

/// Global calendar integration credentials
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarIntegration {
    /// Only users with an email in this domain get meetings
    pub domain: String,
    /// Service account key JSON used to impersonate users
    pub api_key: serde_json::Value,
}

impl fmt::Debug for CalendarIntegration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CalendarIntegration")
            .field("domain", &self.domain)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    pub org_name: String,
    pub calendar: Option<CalendarIntegration>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(failing: &str) -> HostComplianceRow {
        HostComplianceRow {
            host_id: Uuid::from_u128(1),
            host_display_name: "Host 1".to_string(),
            host_hardware_serial: "serial1".to_string(),
            email: "user@example.com".to_string(),
            passing: false,
            failing_policy_ids: failing.to_string(),
        }
    }

    #[test]
    fn test_failing_policy_ids_parsed_in_order() {
        let a = Uuid::from_u128(10);
        let b = Uuid::from_u128(11);
        let ids = row(&format!("{},{}", a, b)).failing_policy_ids();
        assert_eq!(ids, vec![a, b]);
    }

    #[test]
    fn test_failing_policy_ids_skips_blank_and_malformed() {
        let a = Uuid::from_u128(10);
        let ids = row(&format!(" {} ,,not-a-uuid,", a)).failing_policy_ids();
        assert_eq!(ids, vec![a]);
        assert!(row("").failing_policy_ids().is_empty());
    }

    #[test]
    fn test_has_email() {
        let mut r = row("");
        assert!(r.has_email());
        r.email = "  ".to_string();
        assert!(!r.has_email());
    }

    #[test]
    fn test_webhook_status_strings() {
        for status in [
            WebhookStatus::None,
            WebhookStatus::Pending,
            WebhookStatus::Sent,
            WebhookStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<WebhookStatus>(), Ok(status));
        }
        assert!("delivered".parse::<WebhookStatus>().is_err());
        assert_eq!(WebhookStatus::default(), WebhookStatus::None);
    }

    #[test]
    fn test_policy_detail_blank_text() {
        let detail = PolicyDetail {
            id: Uuid::from_u128(1),
            description: "   ".to_string(),
            resolution: Some(String::new()),
        };
        assert_eq!(detail.description_text(), None);
        assert_eq!(detail.resolution_text(), None);

        let detail = PolicyDetail {
            resolution: Some(" Turn on FileVault ".to_string()),
            ..detail
        };
        assert_eq!(detail.resolution_text(), Some("Turn on FileVault"));
    }

    #[test]
    fn test_integration_debug_redacts_key() {
        let integration = CalendarIntegration {
            domain: "example.com".to_string(),
            api_key: serde_json::json!({ "private_key": "secret" }),
        };
        let printed = format!("{:?}", integration);
        assert!(printed.contains("example.com"));
        assert!(!printed.contains("secret"));
    }
}
