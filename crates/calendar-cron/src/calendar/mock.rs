use super::{CalendarProvider, EventRequest};
use crate::error::{CronError, CronResult};
use async_trait::async_trait;
use shared_types::{CalendarIntegration, EventDetails};
use std::collections::{BTreeMap, HashSet};
use tokio::sync::Mutex;

/// Event held by the mock provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockEvent {
    pub id: String,
    pub request: EventRequest,
}

#[derive(Default)]
struct MockState {
    next_id: u64,
    events: BTreeMap<String, MockEvent>,
    failing_emails: HashSet<String>,
}

/// Calendar provider that keeps events in memory.
///
/// Used by tests and by `--provider mock` dry runs against a real database.
#[derive(Default)]
pub struct MockCalendar {
    state: Mutex<MockState>,
}

impl MockCalendar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call for `email` fail with a provider error.
    pub async fn fail_for(&self, email: &str) {
        self.state.lock().await.failing_emails.insert(email.to_string());
    }

    pub async fn recover(&self, email: &str) {
        self.state.lock().await.failing_emails.remove(email);
    }

    /// Remove an event behind the engine's back.
    pub async fn forget(&self, event_id: &str) {
        self.state.lock().await.events.remove(event_id);
    }

    pub async fn events(&self) -> Vec<MockEvent> {
        self.state.lock().await.events.values().cloned().collect()
    }

    pub async fn events_for(&self, email: &str) -> Vec<MockEvent> {
        self.state
            .lock()
            .await
            .events
            .values()
            .filter(|event| event.request.email == email)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl CalendarProvider for MockCalendar {
    async fn create_event(
        &self,
        _integration: &CalendarIntegration,
        request: &EventRequest,
    ) -> CronResult<EventDetails> {
        let mut state = self.state.lock().await;
        if state.failing_emails.contains(&request.email) {
            return Err(CronError::provider(format!(
                "mock calendar rejected event for {}",
                request.email
            )));
        }

        state.next_id += 1;
        let id = format!("mock-{}", state.next_id);
        state.events.insert(
            id.clone(),
            MockEvent {
                id: id.clone(),
                request: request.clone(),
            },
        );

        Ok(EventDetails::new(id)
            .with_field("status", "confirmed")
            .with_field("organizer", request.email.clone()))
    }

    async fn delete_event(
        &self,
        _integration: &CalendarIntegration,
        email: &str,
        details: &EventDetails,
    ) -> CronResult<()> {
        let mut state = self.state.lock().await;
        if state.failing_emails.contains(email) {
            return Err(CronError::provider(format!(
                "mock calendar rejected delete for {}",
                email
            )));
        }

        match state.events.remove(&details.id) {
            Some(_) => Ok(()),
            None => Err(CronError::not_found(format!("Remote event {}", details.id))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn integration() -> CalendarIntegration {
        CalendarIntegration {
            domain: "example.com".to_string(),
            api_key: serde_json::json!({}),
        }
    }

    fn request(email: &str) -> EventRequest {
        let start = Utc::now();
        EventRequest {
            email: email.to_string(),
            summary: "Scheduled maintenance".to_string(),
            description: "body".to_string(),
            start,
            end: start + chrono::Duration::minutes(30),
            timezone: None,
        }
    }

    #[tokio::test]
    async fn test_create_then_delete() {
        let calendar = MockCalendar::new();
        let details = calendar
            .create_event(&integration(), &request("a@example.com"))
            .await
            .unwrap();
        assert_eq!(details.id, "mock-1");
        assert_eq!(calendar.events_for("a@example.com").await.len(), 1);

        calendar
            .delete_event(&integration(), "a@example.com", &details)
            .await
            .unwrap();
        assert!(calendar.events().await.is_empty());

        let err = calendar
            .delete_event(&integration(), "a@example.com", &details)
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let calendar = MockCalendar::new();
        calendar.fail_for("a@example.com").await;
        let err = calendar
            .create_event(&integration(), &request("a@example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, CronError::Provider(_)));

        calendar.recover("a@example.com").await;
        assert!(calendar
            .create_event(&integration(), &request("a@example.com"))
            .await
            .is_ok());
    }
}
