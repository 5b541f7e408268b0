//! Message router — the dispatch state machine.
//!
//! One inbound webhook becomes one `dispatch` call: parse, loop-guard
//! gate, approval resolution, command table, pending-action gating, then
//! conversational fallthrough. Every outbound send passes the cooldown
//! charge first and duplicate suppression second; adapter failures are
//! converted to outcomes and never escape.

pub mod commands;

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use regex::Regex;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::actions::model::CalendarEventPayload;
use crate::actions::{ActionStore, ApprovalMatcher, Intent, PendingAction, Resolution};
use crate::agent::ConversationAgent;
use crate::channels::MessageChannel;
use crate::config::RelayConfig;
use crate::events::InboundEvent;
use crate::executor::{ActionExecutor, EmailConfig};
use crate::guard::LoopGuard;
use crate::mailcheck::MailPoller;

/// Terminal status of one dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    /// An approved (or rejected) action was resolved.
    Executed,
    /// A slash command ran.
    CommandResult,
    /// The conversational agent answered.
    AiResponse,
    /// Unresolved pending actions blocked a new conversation turn.
    PendingActions,
    /// The loop guard refused the event.
    Skipped,
    /// The kill switch is engaged.
    EmergencyStop,
    /// The cooldown window suppressed the response.
    RateLimited,
    /// An identical recent outbound body suppressed the response.
    DuplicateSuppressed,
    /// Parse failure or downstream adapter failure.
    Error,
}

/// Result of one dispatch call.
#[derive(Debug, Clone, Serialize)]
pub struct RouterOutcome {
    pub status: OutcomeStatus,
    pub message: String,
}

impl RouterOutcome {
    fn new(status: OutcomeStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

/// How a guarded send ended.
enum SendGate {
    Sent,
    RateLimited,
    Duplicate,
    Failed(String),
}

/// External collaborators handed to the router.
pub struct RouterDeps {
    pub channel: Arc<dyn MessageChannel>,
    pub agent: Arc<dyn ConversationAgent>,
    pub executor: Arc<dyn ActionExecutor>,
    pub store: Arc<ActionStore>,
    /// Mailbox credentials for the auto-check poller, when configured.
    pub mail_config: Option<EmailConfig>,
}

/// The dispatch orchestrator. One instance per relay process.
pub struct MessageRouter {
    pub(crate) config: RelayConfig,
    pub(crate) channel: Arc<dyn MessageChannel>,
    pub(crate) agent: Arc<dyn ConversationAgent>,
    pub(crate) executor: Arc<dyn ActionExecutor>,
    pub(crate) store: Arc<ActionStore>,
    pub(crate) matcher: ApprovalMatcher,
    pub(crate) guard: LoopGuard,
    pub(crate) mail_config: Option<EmailConfig>,
    pub(crate) autocheck: Mutex<Option<MailPoller>>,
}

impl MessageRouter {
    pub fn new(config: RelayConfig, deps: RouterDeps) -> Arc<Self> {
        let matcher = ApprovalMatcher::new(Arc::clone(&deps.store), config.patterns_path.clone());
        let guard = LoopGuard::new(config.clone());
        Arc::new(Self {
            config,
            channel: deps.channel,
            agent: deps.agent,
            executor: deps.executor,
            store: deps.store,
            matcher,
            guard,
            mail_config: deps.mail_config,
            autocheck: Mutex::new(None),
        })
    }

    // ── Entry point ─────────────────────────────────────────────────

    /// Process one raw webhook payload to a terminal outcome. Adapter
    /// errors are converted, never propagated.
    pub async fn dispatch(&self, raw: &serde_json::Value) -> RouterOutcome {
        let event = match self.channel.parse_inbound(raw) {
            Ok(event) => event,
            Err(e) => {
                warn!("Webhook parse failed: {e}");
                return RouterOutcome::new(OutcomeStatus::Error, format!("parse failed: {e}"));
            }
        };

        // The resume command must stay reachable while everything else
        // is suppressed, so it is recognized before the general gate.
        if self.guard.emergency_stopped()
            && event.involves_operator
            && self.is_resume_command(&event.body)
        {
            return self.handle_resume(&event).await;
        }

        if let Err(reason) = self.guard.should_process(&event) {
            info!(%reason, sender = %event.sender, "Event skipped");
            let status = match reason {
                crate::guard::SkipReason::EmergencyStop => OutcomeStatus::EmergencyStop,
                _ => OutcomeStatus::Skipped,
            };
            return RouterOutcome::new(status, reason.to_string());
        }

        let reply_to = event.reply_target(&self.config);

        // Approval resolution comes before command handling so a reply
        // like "approve <id>" is never misread as conversation.
        match self.matcher.resolve(&event.body).await {
            Resolution::Approved(action) => {
                return self.execute_approved(&action, &reply_to).await;
            }
            Resolution::Rejected(action) => {
                let note = format!(
                    "🚫 Acción rechazada: {}\nNo se ejecutó nada.",
                    action.summary_line()
                );
                self.guarded_send(&reply_to, &note).await;
                return RouterOutcome::new(
                    OutcomeStatus::Executed,
                    format!("action {} rejected", action.id),
                );
            }
            Resolution::Stale { reference } => {
                let note = "⌛ Esa acción ya expiró o no existe. \
                            Usa /status para ver las acciones pendientes."
                    .to_string();
                self.guarded_send(&reply_to, &note).await;
                return RouterOutcome::new(
                    OutcomeStatus::Error,
                    format!("stale action reference: {reference}"),
                );
            }
            Resolution::Indeterminate { action_id } => {
                let note = "🤔 No pude determinar si apruebas o rechazas. \
                            Responde ✅ para aprobar o ❌ para rechazar."
                    .to_string();
                self.guarded_send(&reply_to, &note).await;
                return RouterOutcome::new(
                    OutcomeStatus::Error,
                    format!("could not determine approval status for {action_id}"),
                );
            }
            Resolution::NotApproval => {}
        }

        if let Some(command) = self.strip_command(&event.body) {
            return self.handle_command(command, &reply_to).await;
        }

        // Unresolved pending actions block new conversation turns so
        // free text is never misread as a reply to a future prompt.
        if !self.store.list_pending().await.is_empty()
            && self.matcher.classify_intent(&event.body).await == Intent::None
        {
            let note = "⏳ Tienes acciones pendientes por resolver. \
                        Responde ✅ o ❌ antes de continuar."
                .to_string();
            self.guarded_send(&reply_to, &note).await;
            return RouterOutcome::new(
                OutcomeStatus::PendingActions,
                "please resolve pending actions first",
            );
        }

        // A free-text scheduling request proposes a calendar event
        // instead of a chat reply.
        if let Some(payload) = parse_schedule_request(&event.body) {
            return self.propose_event(payload, &event.body, &reply_to).await;
        }

        self.converse(&event, &reply_to).await
    }

    // ── Handlers ────────────────────────────────────────────────────

    async fn execute_approved(&self, action: &PendingAction, reply_to: &str) -> RouterOutcome {
        match self.executor.execute(action).await {
            Ok(summary) => {
                self.guarded_send(reply_to, &format!("✅ {summary}")).await;
                RouterOutcome::new(OutcomeStatus::Executed, summary)
            }
            Err(e) => {
                error!(action_id = %action.id, "Execution failed: {e}");
                self.guarded_send(reply_to, &format!("❌ Error al ejecutar la acción: {e}"))
                    .await;
                RouterOutcome::new(OutcomeStatus::Error, e.to_string())
            }
        }
    }

    async fn propose_event(
        &self,
        payload: CalendarEventPayload,
        original: &str,
        reply_to: &str,
    ) -> RouterOutcome {
        let mut payload = payload;
        payload.description = format!("Agendado por chat: {original}");
        let action = self
            .store
            .register(PendingAction::calendar_event(payload, self.config.action_ttl))
            .await;
        let request = action.approval_request_text();
        match self.guarded_send(reply_to, &request).await {
            SendGate::Sent => RouterOutcome::new(
                OutcomeStatus::AiResponse,
                format!("proposed calendar event {}", action.id),
            ),
            SendGate::RateLimited => {
                RouterOutcome::new(OutcomeStatus::RateLimited, "too soon since last response")
            }
            SendGate::Duplicate => RouterOutcome::new(
                OutcomeStatus::DuplicateSuppressed,
                "identical response suppressed",
            ),
            SendGate::Failed(reason) => RouterOutcome::new(OutcomeStatus::Error, reason),
        }
    }

    async fn converse(&self, event: &InboundEvent, reply_to: &str) -> RouterOutcome {
        let context = "Eres un asistente de WhatsApp inteligente y amigable.";
        let reply = match self.agent.respond(&event.body, context, &event.sender).await {
            Ok(reply) => reply,
            Err(e) => {
                error!("Conversation backend failed: {e}");
                let note = "Lo siento, estoy teniendo problemas para procesar tu mensaje. \
                            ¿Puedo ayudarte con algo más específico?";
                self.guarded_send(reply_to, note).await;
                return RouterOutcome::new(OutcomeStatus::Error, e.to_string());
            }
        };

        match self.guarded_send(reply_to, &reply).await {
            SendGate::Sent => RouterOutcome::new(OutcomeStatus::AiResponse, reply),
            SendGate::RateLimited => {
                RouterOutcome::new(OutcomeStatus::RateLimited, "too soon since last response")
            }
            SendGate::Duplicate => RouterOutcome::new(
                OutcomeStatus::DuplicateSuppressed,
                "identical response suppressed",
            ),
            SendGate::Failed(reason) => RouterOutcome::new(OutcomeStatus::Error, reason),
        }
    }

    // ── Operator tooling ────────────────────────────────────────────

    /// All unswept actions, optionally filtered by status.
    pub async fn pending_actions(
        &self,
        status: Option<crate::actions::ActionStatus>,
    ) -> Vec<PendingAction> {
        self.store.list(status).await
    }

    /// Add an auto-approve substring pattern. Returns false when already
    /// present or the pattern file cannot be written.
    pub async fn add_auto_approve_pattern(&self, pattern: &str) -> bool {
        self.matcher.add_auto_approve(pattern).await
    }

    /// Add an auto-reject substring pattern.
    pub async fn add_auto_reject_pattern(&self, pattern: &str) -> bool {
        self.matcher.add_auto_reject(pattern).await
    }

    // ── Outbound gate ───────────────────────────────────────────────

    /// Cooldown first (charged regardless of what happens next), then
    /// duplicate suppression, then the actual delivery.
    async fn guarded_send(&self, to: &str, body: &str) -> SendGate {
        if !self.guard.check_cooldown(to, Utc::now()) {
            return SendGate::RateLimited;
        }
        if !self.guard.should_send(to, body) {
            return SendGate::Duplicate;
        }
        match self.channel.send(to, body).await {
            Ok(_) => SendGate::Sent,
            Err(e) => {
                error!(to, "Outbound send failed: {e}");
                SendGate::Failed(e.to_string())
            }
        }
    }

    // ── Command helpers ─────────────────────────────────────────────

    fn strip_command<'a>(&self, body: &'a str) -> Option<&'a str> {
        body.trim().strip_prefix(&self.config.command_prefix)
    }

    fn is_resume_command(&self, body: &str) -> bool {
        self.strip_command(body)
            .is_some_and(|cmd| cmd.trim().eq_ignore_ascii_case("start"))
    }

    async fn handle_resume(&self, event: &InboundEvent) -> RouterOutcome {
        self.guard.set_emergency_stop(false);
        let reply_to = event.reply_target(&self.config);
        self.guarded_send(
            &reply_to,
            "✅ ASISTENTE ACTIVADO\n\nEl asistente está funcionando nuevamente.",
        )
        .await;
        RouterOutcome::new(OutcomeStatus::CommandResult, "assistant resumed")
    }
}

// ── Schedule-request detection ──────────────────────────────────────

/// Recognize a free-text scheduling request: a scheduling keyword plus
/// an `HH:MM` (optionally am/pm) time. The title comes from a quoted
/// phrase when present. Returns a one-hour event today at that time.
pub fn parse_schedule_request(body: &str) -> Option<CalendarEventPayload> {
    let lowered = body.to_lowercase();
    let keywords = ["programar", "agendar", "schedule", "book "];
    if !keywords.iter().any(|k| lowered.contains(k)) {
        return None;
    }

    let time_re = Regex::new(r"(\d{1,2}):(\d{2})\s*(am|pm)?").unwrap();
    let caps = time_re.captures(&lowered)?;
    let mut hour: u32 = caps[1].parse().ok()?;
    let minute: u32 = caps[2].parse().ok()?;
    match caps.get(3).map(|m| m.as_str()) {
        Some("pm") if hour != 12 => hour += 12,
        Some("am") if hour == 12 => hour = 0,
        _ => {}
    }
    if hour > 23 || minute > 59 {
        return None;
    }

    let title = Regex::new(r#""([^"]+)""#)
        .unwrap()
        .captures(body)
        .map(|c| c[1].to_string())
        .unwrap_or_else(|| "Reunión".to_string());

    let today = Utc::now().date_naive();
    let starts_at = Utc.from_utc_datetime(&today.and_hms_opt(hour, minute, 0)?);

    Some(CalendarEventPayload {
        title,
        starts_at,
        ends_at: starts_at + chrono::Duration::hours(1),
        description: String::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schedule_request_with_quoted_title() {
        let payload = parse_schedule_request(r#"programar "Demo con Alice" a las 2:30pm"#).unwrap();
        assert_eq!(payload.title, "Demo con Alice");
        assert_eq!(payload.starts_at.format("%H:%M").to_string(), "14:30");
        assert_eq!(payload.ends_at - payload.starts_at, chrono::Duration::hours(1));
    }

    #[test]
    fn schedule_request_defaults_title() {
        let payload = parse_schedule_request("agendar a las 9:15").unwrap();
        assert_eq!(payload.title, "Reunión");
        assert_eq!(payload.starts_at.format("%H:%M").to_string(), "09:15");
    }

    #[test]
    fn twelve_hour_edges() {
        let noon = parse_schedule_request("schedule 12:00pm").unwrap();
        assert_eq!(noon.starts_at.format("%H:%M").to_string(), "12:00");
        let midnight = parse_schedule_request("schedule 12:30am").unwrap();
        assert_eq!(midnight.starts_at.format("%H:%M").to_string(), "00:30");
    }

    #[test]
    fn keyword_without_time_is_not_a_request() {
        assert!(parse_schedule_request("hay que programar algo pronto").is_none());
    }

    #[test]
    fn time_without_keyword_is_not_a_request() {
        assert!(parse_schedule_request("nos vemos a las 2:30pm").is_none());
    }

    #[test]
    fn out_of_range_time_is_refused() {
        assert!(parse_schedule_request("programar a las 99:00").is_none());
    }
}
