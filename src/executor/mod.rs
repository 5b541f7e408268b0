//! Action execution — performs approved side effects.

pub mod calendar;
pub mod email;

pub use calendar::{CalendarClient, CalendarConfig};
pub use email::{EmailConfig, SmtpMailer};

use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use crate::actions::{ActionPayload, PendingAction};
use crate::error::ExecutorError;

/// Upper bound on any single downstream call.
const EXECUTION_TIMEOUT: Duration = Duration::from_secs(30);

/// Performs the side effect an approved action proposes.
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    /// Execute the action. Returns a short operator-facing summary of
    /// what happened. Never retries.
    async fn execute(&self, action: &PendingAction) -> Result<String, ExecutorError>;
}

/// Default executor: email replies over SMTP, calendar events over the
/// calendar HTTP API. Kinds without a configured backend fail cleanly.
pub struct RelayExecutor {
    mailer: Option<SmtpMailer>,
    calendar: Option<CalendarClient>,
}

impl RelayExecutor {
    pub fn new(mailer: Option<SmtpMailer>, calendar: Option<CalendarClient>) -> Self {
        Self { mailer, calendar }
    }

    /// Build from the environment; backends without credentials stay off.
    pub fn from_env() -> Self {
        let mailer = EmailConfig::from_env().map(SmtpMailer::new);
        let calendar = CalendarConfig::from_env().map(CalendarClient::new);
        Self::new(mailer, calendar)
    }

    pub fn email_configured(&self) -> bool {
        self.mailer.is_some()
    }

    pub fn calendar_configured(&self) -> bool {
        self.calendar.is_some()
    }
}

#[async_trait]
impl ActionExecutor for RelayExecutor {
    async fn execute(&self, action: &PendingAction) -> Result<String, ExecutorError> {
        let kind = action.kind.to_string();

        let work = async {
            match &action.payload {
                ActionPayload::EmailReply(payload) => {
                    let mailer = self.mailer.as_ref().ok_or_else(|| {
                        ExecutorError::NotConfigured { kind: kind.clone() }
                    })?;
                    mailer
                        .send(&payload.to, &payload.subject, &payload.suggested_reply)
                        .await
                        .map_err(|e| ExecutorError::Failed {
                            kind: kind.clone(),
                            reason: e.to_string(),
                        })?;
                    Ok(format!("Correo enviado a {}", payload.to))
                }
                ActionPayload::CalendarEvent(payload) => {
                    let calendar = self.calendar.as_ref().ok_or_else(|| {
                        ExecutorError::NotConfigured { kind: kind.clone() }
                    })?;
                    calendar
                        .create_event(payload)
                        .await
                        .map_err(|e| ExecutorError::Failed {
                            kind: kind.clone(),
                            reason: e.to_string(),
                        })?;
                    Ok(format!(
                        "Evento creado: {} a las {}",
                        payload.title,
                        payload.starts_at.format("%H:%M")
                    ))
                }
                ActionPayload::Opaque(_) => {
                    Err(ExecutorError::NotConfigured { kind: kind.clone() })
                }
            }
        };

        let summary = tokio::time::timeout(EXECUTION_TIMEOUT, work)
            .await
            .map_err(|_| ExecutorError::Timeout {
                kind: action.kind.to_string(),
                timeout: EXECUTION_TIMEOUT,
            })??;

        info!(action_id = %action.id, kind = %action.kind, "Action executed");
        Ok(summary)
    }
}
