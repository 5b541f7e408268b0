//! Pending-action data model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle of a pending action. Expiry is a derived predicate
/// (`PendingAction::is_expired`), not a status — an abandoned action
/// stays `Pending` until the sweep removes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    Pending,
    Approved,
    Rejected,
}

/// What kind of side effect an action proposes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// Send a drafted reply to a message (email).
    EmailReply,
    /// Create a calendar event.
    CalendarEvent,
    /// A kind the executor understands but the core does not interpret.
    #[serde(untagged)]
    Other(String),
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmailReply => write!(f, "email_reply"),
            Self::CalendarEvent => write!(f, "calendar_event"),
            Self::Other(kind) => write!(f, "{kind}"),
        }
    }
}

/// Payload for a drafted email reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailReplyPayload {
    /// Who the reply goes to.
    pub to: String,
    /// Subject line (already carries `Re:` when replying in-thread).
    pub subject: String,
    /// Short summary of the message being answered.
    pub summary: String,
    /// The drafted reply body awaiting approval.
    pub suggested_reply: String,
    /// Provider id of the message being replied to, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_ref: Option<String>,
}

/// Payload for a proposed calendar event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarEventPayload {
    pub title: String,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    #[serde(default)]
    pub description: String,
}

/// Structured payload per known kind, with an opaque fallback for kinds
/// only the executor interprets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ActionPayload {
    EmailReply(EmailReplyPayload),
    CalendarEvent(CalendarEventPayload),
    Opaque(serde_json::Value),
}

impl ActionPayload {
    /// The kind this payload implies. Opaque payloads report the kind
    /// stored on the action itself.
    pub fn implied_kind(&self) -> Option<ActionKind> {
        match self {
            Self::EmailReply(_) => Some(ActionKind::EmailReply),
            Self::CalendarEvent(_) => Some(ActionKind::CalendarEvent),
            Self::Opaque(_) => None,
        }
    }
}

/// A proposed side effect awaiting operator approval, with a deadline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingAction {
    /// Unique action id.
    pub id: Uuid,
    /// Action kind tag.
    pub kind: ActionKind,
    /// Kind-specific payload.
    pub payload: ActionPayload,
    /// When the action was created.
    pub created_at: DateTime<Utc>,
    /// Fixed at creation; never extended.
    pub expires_at: DateTime<Utc>,
    /// Current status.
    pub status: ActionStatus,
    /// Verbatim text of the resolving reply, once resolved.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_response: Option<String>,
    /// When the action was resolved.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
}

impl PendingAction {
    /// Create a fresh pending action expiring `ttl` from now.
    pub fn new(kind: ActionKind, payload: ActionPayload, ttl: chrono::Duration) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            kind,
            payload,
            created_at: now,
            expires_at: now + ttl,
            status: ActionStatus::Pending,
            user_response: None,
            resolved_at: None,
        }
    }

    /// Shorthand for a drafted email reply.
    pub fn email_reply(payload: EmailReplyPayload, ttl: chrono::Duration) -> Self {
        Self::new(ActionKind::EmailReply, ActionPayload::EmailReply(payload), ttl)
    }

    /// Shorthand for a proposed calendar event.
    pub fn calendar_event(payload: CalendarEventPayload, ttl: chrono::Duration) -> Self {
        Self::new(
            ActionKind::CalendarEvent,
            ActionPayload::CalendarEvent(payload),
            ttl,
        )
    }

    /// Whether the approval window has closed.
    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }

    /// One-line operator-facing description.
    pub fn summary_line(&self) -> String {
        match &self.payload {
            ActionPayload::EmailReply(p) => {
                format!("Responder a {}: {}", p.to, p.subject)
            }
            ActionPayload::CalendarEvent(p) => format!(
                "Crear evento: {} el {}",
                p.title,
                p.starts_at.format("%d/%m %H:%M")
            ),
            ActionPayload::Opaque(value) => format!(
                "{}: {}",
                self.kind,
                value
                    .get("description")
                    .and_then(|d| d.as_str())
                    .unwrap_or("(sin descripción)")
            ),
        }
    }

    /// Full approval request shown to the operator, ending in the ✅/❌
    /// prompt the matcher recognizes.
    pub fn approval_request_text(&self) -> String {
        match &self.payload {
            ActionPayload::EmailReply(p) => format!(
                "📧 Correo de {}\n📋 Asunto: {}\n\n📝 Resumen: {}\n\n💬 Respuesta sugerida:\n{}\n\n¿Enviar? ✅/❌  (acción #{})",
                p.to, p.subject, p.summary, p.suggested_reply, self.id
            ),
            ActionPayload::CalendarEvent(p) => format!(
                "📅 Evento propuesto\n📋 Título: {}\n⏰ Inicio: {}\n⏱️ Fin: {}\n\n¿Crear evento? ✅/❌  (acción #{})",
                p.title,
                p.starts_at.format("%d/%m/%Y %H:%M"),
                p.ends_at.format("%d/%m/%Y %H:%M"),
                self.id
            ),
            ActionPayload::Opaque(value) => format!(
                "🤖 Acción requerida: {}\n\n{}\n\n¿Aprobar? ✅/❌  (acción #{})",
                self.kind, value, self.id
            ),
        }
    }
}
