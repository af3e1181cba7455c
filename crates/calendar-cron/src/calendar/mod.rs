//! Remote calendar providers.

use crate::error::CronResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared_types::{CalendarIntegration, EventDetails};

pub mod google;
pub mod mock;

pub use google::GoogleCalendar;
pub use mock::MockCalendar;

/// A meeting to book on a user's primary calendar
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRequest {
    pub email: String,
    pub summary: String,
    pub description: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// IANA name the event is displayed in
    pub timezone: Option<String>,
}

#[async_trait]
pub trait CalendarProvider: Send + Sync {
    /// Create the event and return the provider's description of it.
    async fn create_event(
        &self,
        integration: &CalendarIntegration,
        request: &EventRequest,
    ) -> CronResult<EventDetails>;

    /// Delete a previously created event.
    ///
    /// Fails with `CronError::NotFound` when the remote event is already gone.
    async fn delete_event(
        &self,
        integration: &CalendarIntegration,
        email: &str,
        details: &EventDetails,
    ) -> CronResult<()>;
}
