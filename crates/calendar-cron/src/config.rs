use crate::error::{CronError, CronResult};
use crate::schedule::MeetingSlot;
use chrono_tz::Tz;
use std::str::FromStr;
use std::time::Duration;

/// What to do with an event already booked for the same host
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExistingEventPolicy {
    /// Leave it alone (events are immutable once created)
    #[default]
    Keep,
    /// Replace it when the host's failing policy set has changed
    Regenerate,
}

impl FromStr for ExistingEventPolicy {
    type Err = CronError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "keep" => Ok(ExistingEventPolicy::Keep),
            "regenerate" => Ok(ExistingEventPolicy::Regenerate),
            other => Err(CronError::config(format!(
                "CALENDAR_EXISTING_EVENT_POLICY must be 'keep' or 'regenerate', got '{}'",
                other
            ))),
        }
    }
}

/// Configuration for the calendar reconciliation cron
#[derive(Debug, Clone)]
pub struct CronConfig {
    /// How often a cycle is scheduled (also the run lock lease, default: 5 minutes)
    pub periodicity: Duration,
    /// Upper bound on a single cycle's reconcile stage
    pub cycle_deadline: Duration,
    /// Teams reconciled in parallel
    pub team_concurrency: usize,
    /// Hosts reconciled in parallel within one team
    pub host_concurrency: usize,
    /// Owner value written into the distributed lock
    pub instance_id: String,
    pub slot: MeetingSlot,
    pub existing_event_policy: ExistingEventPolicy,
}

impl Default for CronConfig {
    fn default() -> Self {
        let periodicity = Duration::from_secs(300); // 5 minutes
        Self {
            periodicity,
            cycle_deadline: periodicity,
            team_concurrency: 4,
            host_concurrency: 32,
            instance_id: uuid::Uuid::new_v4().to_string(),
            slot: MeetingSlot::default(),
            existing_event_policy: ExistingEventPolicy::Keep,
        }
    }
}

impl CronConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> CronResult<Self> {
        let defaults = Self::default();

        let periodicity_secs = env_or("CALENDAR_CRON_PERIODICITY_SECS", 300u64).max(1);
        let deadline_secs = env_or("CALENDAR_CRON_DEADLINE_SECS", periodicity_secs).max(1);
        let team_concurrency = env_or("CALENDAR_CRON_TEAM_CONCURRENCY", defaults.team_concurrency).max(1);
        let host_concurrency = env_or("CALENDAR_CRON_HOST_CONCURRENCY", defaults.host_concurrency).max(1);

        let instance_id = std::env::var("CALENDAR_CRON_INSTANCE_ID")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(defaults.instance_id);

        let start_hour = env_or("CALENDAR_EVENT_START_HOUR", defaults.slot.start_hour);
        if start_hour > 23 {
            return Err(CronError::config(format!(
                "CALENDAR_EVENT_START_HOUR must be between 0 and 23, got {}",
                start_hour
            )));
        }
        let duration_mins = env_or("CALENDAR_EVENT_DURATION_MINS", 30i64).max(1);

        let timezone = match std::env::var("CALENDAR_EVENT_TIMEZONE") {
            Ok(name) => Tz::from_str(name.trim()).map_err(|e| {
                CronError::config(format!("CALENDAR_EVENT_TIMEZONE '{}' is invalid: {}", name, e))
            })?,
            Err(_) => defaults.slot.timezone,
        };

        let existing_event_policy = match std::env::var("CALENDAR_EXISTING_EVENT_POLICY") {
            Ok(value) => value.parse()?,
            Err(_) => defaults.existing_event_policy,
        };

        Ok(Self {
            periodicity: Duration::from_secs(periodicity_secs),
            cycle_deadline: Duration::from_secs(deadline_secs),
            team_concurrency,
            host_concurrency,
            instance_id,
            slot: MeetingSlot {
                start_hour,
                duration: chrono::Duration::minutes(duration_mins),
                timezone,
            },
            existing_event_policy,
        })
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CronConfig::default();
        assert_eq!(config.periodicity, Duration::from_secs(300));
        assert_eq!(config.cycle_deadline, config.periodicity);
        assert_eq!(config.existing_event_policy, ExistingEventPolicy::Keep);
        assert_eq!(config.slot.start_hour, 9);
        assert!(!config.instance_id.is_empty());
    }

    #[test]
    fn test_existing_event_policy_parse() {
        assert_eq!("keep".parse::<ExistingEventPolicy>().unwrap(), ExistingEventPolicy::Keep);
        assert_eq!(
            " Regenerate ".parse::<ExistingEventPolicy>().unwrap(),
            ExistingEventPolicy::Regenerate
        );
        let err = "update".parse::<ExistingEventPolicy>().unwrap_err();
        assert!(matches!(err, CronError::Config(_)));
    }

    #[test]
    fn test_env_or_falls_back_on_garbage() {
        std::env::set_var("CALENDAR_CRON_TEST_NUMBER", "not-a-number");
        assert_eq!(env_or("CALENDAR_CRON_TEST_NUMBER", 7u64), 7);
        std::env::set_var("CALENDAR_CRON_TEST_NUMBER", " 42 ");
        assert_eq!(env_or("CALENDAR_CRON_TEST_NUMBER", 7u64), 42);
        std::env::remove_var("CALENDAR_CRON_TEST_NUMBER");
        assert_eq!(env_or("CALENDAR_CRON_TEST_NUMBER", 7u64), 7);
    }
}
