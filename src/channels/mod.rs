//! Messaging-channel abstraction.

pub mod whatsapp;

pub use whatsapp::WhatsAppChannel;

use async_trait::async_trait;

use crate::error::ChannelError;
use crate::events::InboundEvent;

/// Receipt for one delivered outbound message.
#[derive(Debug, Clone)]
pub struct SendReceipt {
    /// Provider message id, when the provider returns one.
    pub provider_id: Option<String>,
}

/// Outbound chat delivery plus inbound webhook normalization.
///
/// Pure I/O — loop prevention, cooldowns, and approval matching all live
/// in the router and its guard.
#[async_trait]
pub trait MessageChannel: Send + Sync {
    /// Channel name (e.g. "whatsapp").
    fn name(&self) -> &str;

    /// Whether the channel has credentials to actually deliver messages.
    fn is_configured(&self) -> bool;

    /// Normalize a provider webhook payload into an `InboundEvent`.
    fn parse_inbound(&self, raw: &serde_json::Value) -> Result<InboundEvent, ChannelError>;

    /// Deliver a message.
    async fn send(&self, to: &str, body: &str) -> Result<SendReceipt, ChannelError>;

    /// Verify the provider is reachable.
    async fn health_check(&self) -> Result<(), ChannelError>;
}
