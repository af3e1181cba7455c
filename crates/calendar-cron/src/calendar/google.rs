//! Google Calendar provider.
//!
//! Events are written to each user's primary calendar by a service account
//! with domain-wide delegation, impersonating the user.

use super::{CalendarProvider, EventRequest};
use crate::error::{CronError, CronResult};
use async_trait::async_trait;
use google_calendar3::api::{Event, EventDateTime, Scope};
use google_calendar3::hyper_rustls::HttpsConnector;
use google_calendar3::CalendarHub;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use shared_types::{CalendarIntegration, EventDetails};

const PRIMARY_CALENDAR: &str = "primary";

type Hub = CalendarHub<HttpsConnector<HttpConnector>>;

pub struct GoogleCalendar {
    calendar_id: String,
}

impl Default for GoogleCalendar {
    fn default() -> Self {
        Self::new()
    }
}

impl GoogleCalendar {
    pub fn new() -> Self {
        Self {
            calendar_id: PRIMARY_CALENDAR.to_string(),
        }
    }

    /// Build a hub authenticated as `email`.
    async fn hub_for(&self, integration: &CalendarIntegration, email: &str) -> CronResult<Hub> {
        let key = google_calendar3::yup_oauth2::parse_service_account_key(
            integration.api_key.to_string(),
        )
        .map_err(|e| CronError::config(format!("Invalid calendar service account key: {}", e)))?;

        let auth = google_calendar3::yup_oauth2::ServiceAccountAuthenticator::builder(key)
            .subject(email)
            .build()
            .await
            .map_err(|e| CronError::provider(format!("Failed to build authenticator: {}", e)))?;

        let connector = google_calendar3::hyper_rustls::HttpsConnectorBuilder::new()
            .with_native_roots()
            .map_err(|e| CronError::provider(format!("Failed to load native TLS roots: {}", e)))?
            .https_or_http()
            .enable_http1()
            .build();

        let client = Client::builder(TokioExecutor::new()).build(connector);
        Ok(CalendarHub::new(client, auth))
    }
}

fn event_from_request(request: &EventRequest) -> Event {
    Event {
        summary: Some(request.summary.clone()),
        description: Some(request.description.clone()),
        start: Some(EventDateTime {
            date_time: Some(request.start),
            time_zone: request.timezone.clone(),
            ..Default::default()
        }),
        end: Some(EventDateTime {
            date_time: Some(request.end),
            time_zone: request.timezone.clone(),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Whether an API error means the event no longer exists.
fn is_gone(err: &google_calendar3::Error) -> bool {
    match err {
        google_calendar3::Error::BadRequest(body) => matches!(
            body.pointer("/error/code").and_then(serde_json::Value::as_u64),
            Some(404) | Some(410)
        ),
        google_calendar3::Error::Failure(response) => {
            matches!(response.status().as_u16(), 404 | 410)
        }
        _ => false,
    }
}

#[async_trait]
impl CalendarProvider for GoogleCalendar {
    async fn create_event(
        &self,
        integration: &CalendarIntegration,
        request: &EventRequest,
    ) -> CronResult<EventDetails> {
        let hub = self.hub_for(integration, &request.email).await?;

        let (_, created) = hub
            .events()
            .insert(event_from_request(request), &self.calendar_id)
            .add_scope(Scope::Event)
            .doit()
            .await
            .map_err(|e| {
                CronError::provider(format!(
                    "Failed to create calendar event for {}: {}",
                    request.email, e
                ))
            })?;

        if created.id.is_none() {
            return Err(CronError::provider(format!(
                "Calendar API returned an event without an id for {}",
                request.email
            )));
        }

        // Keep the whole provider response so later deletes have what they need.
        let details: EventDetails = serde_json::from_value(serde_json::to_value(&created)?)?;

        tracing::info!(
            "Created calendar event {} for {} at {}",
            details.id,
            request.email,
            request.start
        );

        Ok(details)
    }

    async fn delete_event(
        &self,
        integration: &CalendarIntegration,
        email: &str,
        details: &EventDetails,
    ) -> CronResult<()> {
        let hub = self.hub_for(integration, email).await?;

        match hub
            .events()
            .delete(&self.calendar_id, &details.id)
            .add_scope(Scope::Event)
            .doit()
            .await
        {
            Ok(_) => Ok(()),
            Err(e) if is_gone(&e) => Err(CronError::not_found(format!(
                "Remote calendar event {}",
                details.id
            ))),
            Err(e) => Err(CronError::provider(format!(
                "Failed to delete calendar event {} for {}: {}",
                details.id, email, e
            ))),
        }
    }
}
