//! Calendar backend — creates events through a Google-Calendar-style
//! HTTP API with a bearer token.

use secrecy::{ExposeSecret, SecretString};
use tracing::info;

use crate::actions::model::CalendarEventPayload;
use crate::error::ExecutorError;

/// Calendar API configuration.
#[derive(Clone)]
pub struct CalendarConfig {
    pub api_base: String,
    pub calendar_id: String,
    pub access_token: SecretString,
}

impl CalendarConfig {
    /// Build from environment variables. Returns `None` when
    /// `CALENDAR_ACCESS_TOKEN` is not set (backend disabled).
    pub fn from_env() -> Option<Self> {
        let access_token = std::env::var("CALENDAR_ACCESS_TOKEN").ok()?;
        Some(Self {
            api_base: std::env::var("CALENDAR_API_BASE")
                .unwrap_or_else(|_| "https://www.googleapis.com/calendar/v3".to_string()),
            calendar_id: std::env::var("CALENDAR_ID").unwrap_or_else(|_| "primary".to_string()),
            access_token: SecretString::from(access_token),
        })
    }
}

/// Thin HTTP client over the events API.
pub struct CalendarClient {
    config: CalendarConfig,
    client: reqwest::Client,
}

impl CalendarClient {
    pub fn new(config: CalendarConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
        }
    }

    fn events_url(&self) -> String {
        format!(
            "{}/calendars/{}/events",
            self.config.api_base.trim_end_matches('/'),
            self.config.calendar_id
        )
    }

    /// Create one event. Returns the provider event id when available.
    pub async fn create_event(
        &self,
        payload: &CalendarEventPayload,
    ) -> Result<Option<String>, ExecutorError> {
        let body = event_body(payload);

        let resp = self
            .client
            .post(self.events_url())
            .bearer_auth(self.config.access_token.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| ExecutorError::Failed {
                kind: "calendar_event".to_string(),
                reason: e.to_string(),
            })?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(ExecutorError::Failed {
                kind: "calendar_event".to_string(),
                reason: format!("events insert returned {status}: {text}"),
            });
        }

        let data: serde_json::Value = resp.json().await.unwrap_or_default();
        let event_id = data.get("id").and_then(|v| v.as_str()).map(String::from);
        info!(title = %payload.title, ?event_id, "Calendar event created");
        Ok(event_id)
    }
}

/// Wire shape for an event insert.
fn event_body(payload: &CalendarEventPayload) -> serde_json::Value {
    serde_json::json!({
        "summary": payload.title,
        "description": payload.description,
        "start": { "dateTime": payload.starts_at.to_rfc3339() },
        "end": { "dateTime": payload.ends_at.to_rfc3339() },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn event_body_shape() {
        let starts = Utc.with_ymd_and_hms(2026, 8, 5, 14, 30, 0).unwrap();
        let payload = CalendarEventPayload {
            title: "Reunión".into(),
            starts_at: starts,
            ends_at: starts + chrono::Duration::hours(1),
            description: "agendada por chat".into(),
        };
        let body = event_body(&payload);
        assert_eq!(body["summary"], "Reunión");
        assert_eq!(body["start"]["dateTime"], "2026-08-05T14:30:00+00:00");
        assert_eq!(body["end"]["dateTime"], "2026-08-05T15:30:00+00:00");
    }

    #[test]
    fn events_url_includes_calendar_id() {
        let client = CalendarClient::new(CalendarConfig {
            api_base: "https://www.googleapis.com/calendar/v3/".into(),
            calendar_id: "primary".into(),
            access_token: SecretString::from("tok"),
        });
        assert_eq!(
            client.events_url(),
            "https://www.googleapis.com/calendar/v3/calendars/primary/events"
        );
    }
}
