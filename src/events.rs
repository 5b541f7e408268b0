//! Normalized inbound events.

use serde::{Deserialize, Serialize};

use crate::config::RelayConfig;

/// One inbound webhook event, normalized by the channel adapter.
///
/// Created once per webhook call, consumed once by the router, never
/// mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundEvent {
    /// Provider message id, when the provider supplies one.
    pub message_id: Option<String>,
    /// Sender identity (e.g. `5215664087506@c.us`).
    pub sender: String,
    /// Recipient identity.
    pub recipient: String,
    /// Message body text.
    pub body: String,
    /// Provider event tag (`message`, `message_ack`, `message_create`, ...).
    pub event_type: Option<String>,
    /// True when the event's sender or recipient matches the configured
    /// operator identity. Anything else is external noise.
    pub involves_operator: bool,
}

impl InboundEvent {
    /// Where a reply to this event should go: back to the sender when the
    /// operator sent it, otherwise to the operator's own chat.
    pub fn reply_target(&self, config: &RelayConfig) -> String {
        if config.is_operator(&self.sender) {
            self.sender.clone()
        } else {
            config.operator_chat.clone()
        }
    }
}
