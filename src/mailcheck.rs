//! Auto mail check — background poller that turns unread email into
//! pending email-reply actions.
//!
//! Toggled by the `/autocheck` command. Each cycle fetches unseen mail,
//! drafts a suggested reply through the conversation agent, registers a
//! pending action, and surfaces the approval request to the operator.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::actions::model::EmailReplyPayload;
use crate::actions::{ActionStore, PendingAction};
use crate::agent::ConversationAgent;
use crate::channels::MessageChannel;
use crate::config::RelayConfig;
use crate::executor::email::{FetchedEmail, fetch_unseen_imap};
use crate::executor::EmailConfig;

/// Handle to a running poller. Dropping without `stop` leaves the task
/// running until its next shutdown check.
pub struct MailPoller {
    handle: JoinHandle<()>,
    shutdown: Arc<AtomicBool>,
}

impl MailPoller {
    /// Stop the poller. Safe to call more than once.
    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
        self.handle.abort();
        info!("Mail poller stopped");
    }
}

/// Spawn the polling loop.
pub fn spawn_mail_poller(
    mail_config: EmailConfig,
    relay_config: RelayConfig,
    store: Arc<ActionStore>,
    agent: Arc<dyn ConversationAgent>,
    channel: Arc<dyn MessageChannel>,
) -> MailPoller {
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_flag = Arc::clone(&shutdown);

    let handle = tokio::spawn(async move {
        info!(
            interval_secs = relay_config.mail_poll_interval.as_secs(),
            host = %mail_config.imap_host,
            "Mail poller started"
        );
        let mut seen: HashSet<String> = HashSet::new();
        let mut tick = tokio::time::interval(relay_config.mail_poll_interval);

        loop {
            tick.tick().await;
            if shutdown.load(Ordering::Relaxed) {
                info!("Mail poller shutting down");
                return;
            }
            poll_once(
                &mail_config,
                &relay_config,
                &store,
                &agent,
                &channel,
                &mut seen,
            )
            .await;
        }
    });

    MailPoller {
        handle,
        shutdown: shutdown_flag,
    }
}

/// One poll cycle: fetch unseen → draft → register → surface.
async fn poll_once(
    mail_config: &EmailConfig,
    relay_config: &RelayConfig,
    store: &Arc<ActionStore>,
    agent: &Arc<dyn ConversationAgent>,
    channel: &Arc<dyn MessageChannel>,
    seen: &mut HashSet<String>,
) {
    let cfg = mail_config.clone();
    let fetched = match tokio::task::spawn_blocking(move || fetch_unseen_imap(&cfg)).await {
        Ok(Ok(messages)) => messages,
        Ok(Err(e)) => {
            error!("Mail poll failed: {e}");
            return;
        }
        Err(e) => {
            error!("Mail poll task panicked: {e}");
            return;
        }
    };

    if fetched.is_empty() {
        return;
    }
    debug!(count = fetched.len(), "Fetched unseen emails");

    for email in fetched {
        if email
            .sender
            .eq_ignore_ascii_case(&mail_config.from_address)
        {
            debug!(sender = %email.sender, "Skipping self-sent email");
            continue;
        }
        if !seen.insert(email.message_id.clone()) {
            continue;
        }

        let action = draft_reply_action(relay_config, agent, &email).await;
        let action = store.register(action).await;

        if let Err(e) = channel
            .send(&relay_config.operator_chat, &action.approval_request_text())
            .await
        {
            error!(action_id = %action.id, "Failed to surface approval request: {e}");
        }
    }
}

/// Build the pending email-reply action for one fetched message.
async fn draft_reply_action(
    relay_config: &RelayConfig,
    agent: &Arc<dyn ConversationAgent>,
    email: &FetchedEmail,
) -> PendingAction {
    let context = format!(
        "Redacta una respuesta breve y cortés al siguiente correo de {}. \
         Responde solo con el cuerpo del correo.",
        email.sender
    );
    let suggested_reply = match agent.respond(&email.body, &context, &email.sender).await {
        Ok(draft) => draft,
        Err(e) => {
            error!("Draft generation failed: {e}");
            "Gracias por tu correo. Te respondo en cuanto pueda.".to_string()
        }
    };

    let summary: String = email.body.chars().take(200).collect();
    let subject = if email.subject.to_lowercase().starts_with("re:") {
        email.subject.clone()
    } else {
        format!("Re: {}", email.subject)
    };

    PendingAction::email_reply(
        EmailReplyPayload {
            to: email.sender.clone(),
            subject,
            summary,
            suggested_reply,
            message_ref: Some(email.message_id.clone()),
        },
        relay_config.action_ttl,
    )
}
