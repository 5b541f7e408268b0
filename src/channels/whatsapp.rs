//! WhatsApp channel — UltraMsg-style HTTP API.
//!
//! Outbound sends POST to `{api_url}/{instance}/messages/chat`; inbound
//! webhooks arrive either bare or wrapped in a `data` envelope and are
//! normalized into `InboundEvent`.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, info};

use crate::channels::{MessageChannel, SendReceipt};
use crate::config::RelayConfig;
use crate::error::ChannelError;
use crate::events::InboundEvent;

/// WhatsApp channel backed by an UltraMsg-compatible gateway.
pub struct WhatsAppChannel {
    api_url: String,
    instance_id: String,
    token: SecretString,
    config: RelayConfig,
    client: reqwest::Client,
}

impl WhatsAppChannel {
    pub fn new(
        api_url: impl Into<String>,
        instance_id: impl Into<String>,
        token: SecretString,
        config: RelayConfig,
    ) -> Self {
        Self {
            api_url: api_url.into().trim_end_matches('/').to_string(),
            instance_id: instance_id.into(),
            token,
            config,
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
        }
    }

    /// Build from environment variables (`ULTRAMSG_API_URL`,
    /// `ULTRAMSG_INSTANCE_ID`, `ULTRAMSG_TOKEN`). Returns `None` when
    /// the instance id is not set (channel disabled).
    pub fn from_env(config: RelayConfig) -> Option<Self> {
        let instance_id = std::env::var("ULTRAMSG_INSTANCE_ID").ok()?;
        let api_url = std::env::var("ULTRAMSG_API_URL")
            .unwrap_or_else(|_| "https://api.ultramsg.com".to_string());
        let token = std::env::var("ULTRAMSG_TOKEN").unwrap_or_default();
        Some(Self::new(
            api_url,
            instance_id,
            SecretString::from(token),
            config,
        ))
    }

    fn api_endpoint(&self, method: &str) -> String {
        // The configured URL may already carry the instance id
        if self.api_url.contains(&self.instance_id) {
            format!("{}/{method}", self.api_url)
        } else {
            format!("{}/{}/{method}", self.api_url, self.instance_id)
        }
    }
}

#[async_trait]
impl MessageChannel for WhatsAppChannel {
    fn name(&self) -> &str {
        "whatsapp"
    }

    fn is_configured(&self) -> bool {
        !self.instance_id.is_empty() && !self.token.expose_secret().is_empty()
    }

    fn parse_inbound(&self, raw: &serde_json::Value) -> Result<InboundEvent, ChannelError> {
        parse_webhook(raw, &self.config)
    }

    async fn send(&self, to: &str, body: &str) -> Result<SendReceipt, ChannelError> {
        let payload = serde_json::json!({
            "token": self.token.expose_secret(),
            "to": to,
            "body": body,
            "type": "text",
        });

        let resp = self
            .client
            .post(self.api_endpoint("messages/chat"))
            .json(&payload)
            .send()
            .await
            .map_err(|e| ChannelError::SendFailed {
                name: "whatsapp".into(),
                reason: e.to_string(),
            })?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(ChannelError::SendFailed {
                name: "whatsapp".into(),
                reason: format!("messages/chat returned {status}: {text}"),
            });
        }

        let data: serde_json::Value = resp.json().await.unwrap_or_default();
        let provider_id = data
            .get("id")
            .and_then(|v| {
                v.as_str()
                    .map(String::from)
                    .or_else(|| v.as_i64().map(|n| n.to_string()))
            });

        info!(to, "WhatsApp message sent");
        Ok(SendReceipt { provider_id })
    }

    async fn health_check(&self) -> Result<(), ChannelError> {
        let resp = self
            .client
            .get(self.api_endpoint("instance/status"))
            .query(&[("token", self.token.expose_secret())])
            .send()
            .await
            .map_err(|e| ChannelError::Http(e.to_string()))?;

        if resp.status().is_success() {
            Ok(())
        } else {
            Err(ChannelError::Http(format!(
                "instance/status returned {}",
                resp.status()
            )))
        }
    }
}

/// Normalize a provider webhook payload. The provider sometimes wraps
/// the message under a `data` key and sometimes posts it bare.
pub fn parse_webhook(
    raw: &serde_json::Value,
    config: &RelayConfig,
) -> Result<InboundEvent, ChannelError> {
    let message = raw.get("data").unwrap_or(raw);

    if !message.is_object() {
        return Err(ChannelError::InvalidPayload(
            "webhook payload is not an object".to_string(),
        ));
    }

    let text_field = |key: &str| -> Option<String> {
        message.get(key).and_then(|v| {
            v.as_str()
                .map(String::from)
                .or_else(|| v.as_i64().map(|n| n.to_string()))
        })
    };

    let sender = text_field("from").unwrap_or_default();
    let recipient = text_field("to").unwrap_or_default();
    if sender.is_empty() && recipient.is_empty() {
        return Err(ChannelError::InvalidPayload(
            "webhook payload has neither from nor to".to_string(),
        ));
    }

    let body = text_field("body").unwrap_or_default();
    let message_id = text_field("id").or_else(|| text_field("message_id"));

    // The provider puts the event tag on the envelope, not the message
    let event_type = raw
        .get("event_type")
        .or_else(|| raw.get("event"))
        .or_else(|| message.get("event_type"))
        .and_then(|v| v.as_str())
        .map(String::from);

    // Provider clients set fromMe on echoes of our own sends; those still
    // involve the operator identity but the event tag marks them.
    let from_me = message
        .get("fromMe")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);

    let involves_operator =
        config.is_operator(&sender) || config.is_operator(&recipient) || from_me;

    debug!(
        sender,
        recipient,
        ?event_type,
        involves_operator,
        "Parsed inbound webhook"
    );

    Ok(InboundEvent {
        message_id,
        sender,
        recipient,
        body,
        event_type,
        involves_operator,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::operator_identities_for;

    fn config() -> RelayConfig {
        RelayConfig {
            operator_identities: operator_identities_for("5215664087506"),
            operator_chat: "5215664087506@c.us".to_string(),
            ..RelayConfig::default()
        }
    }

    fn channel() -> WhatsAppChannel {
        WhatsAppChannel::new(
            "https://api.ultramsg.com",
            "instance123",
            SecretString::from("tok"),
            config(),
        )
    }

    #[test]
    fn api_endpoint_appends_instance() {
        assert_eq!(
            channel().api_endpoint("messages/chat"),
            "https://api.ultramsg.com/instance123/messages/chat"
        );
    }

    #[test]
    fn api_endpoint_keeps_url_with_instance() {
        let ch = WhatsAppChannel::new(
            "https://api.ultramsg.com/instance123",
            "instance123",
            SecretString::from("tok"),
            config(),
        );
        assert_eq!(
            ch.api_endpoint("messages/chat"),
            "https://api.ultramsg.com/instance123/messages/chat"
        );
    }

    #[test]
    fn configured_requires_token() {
        assert!(channel().is_configured());
        let ch = WhatsAppChannel::new(
            "https://api.ultramsg.com",
            "instance123",
            SecretString::from(""),
            config(),
        );
        assert!(!ch.is_configured());
    }

    #[test]
    fn parses_bare_payload() {
        let raw = serde_json::json!({
            "id": "wamid.123",
            "from": "5215664087506@c.us",
            "to": "5664087506",
            "body": "hola",
            "type": "text",
        });
        let event = parse_webhook(&raw, &config()).unwrap();
        assert_eq!(event.message_id.as_deref(), Some("wamid.123"));
        assert_eq!(event.sender, "5215664087506@c.us");
        assert_eq!(event.body, "hola");
        assert!(event.involves_operator);
        assert!(event.event_type.is_none());
    }

    #[test]
    fn parses_data_envelope() {
        let raw = serde_json::json!({
            "event_type": "message",
            "data": {
                "id": 4567,
                "from": "5215664087506@c.us",
                "to": "5664087506",
                "body": "¿qué tal?",
            }
        });
        let event = parse_webhook(&raw, &config()).unwrap();
        // Numeric ids are normalized to strings
        assert_eq!(event.message_id.as_deref(), Some("4567"));
        assert_eq!(event.body, "¿qué tal?");
        // The envelope-level tag is picked up
        assert_eq!(event.event_type.as_deref(), Some("message"));
    }

    #[test]
    fn event_type_survives_parsing() {
        let raw = serde_json::json!({
            "from": "5215664087506@c.us",
            "to": "5664087506",
            "body": "ack",
            "event_type": "message_ack",
        });
        let event = parse_webhook(&raw, &config()).unwrap();
        assert_eq!(event.event_type.as_deref(), Some("message_ack"));
    }

    #[test]
    fn external_traffic_does_not_involve_operator() {
        let raw = serde_json::json!({
            "from": "5210000000000@c.us",
            "to": "5219999999999@c.us",
            "body": "spam",
        });
        let event = parse_webhook(&raw, &config()).unwrap();
        assert!(!event.involves_operator);
    }

    #[test]
    fn from_me_flag_counts_as_operator_traffic() {
        let raw = serde_json::json!({
            "from": "gateway",
            "to": "5210000000000@c.us",
            "body": "echo of our own send",
            "fromMe": true,
        });
        let event = parse_webhook(&raw, &config()).unwrap();
        assert!(event.involves_operator);
    }

    #[test]
    fn rejects_non_object_payload() {
        assert!(parse_webhook(&serde_json::json!("nope"), &config()).is_err());
        assert!(parse_webhook(&serde_json::json!(42), &config()).is_err());
    }

    #[test]
    fn rejects_payload_without_addresses() {
        let raw = serde_json::json!({"body": "hola"});
        assert!(parse_webhook(&raw, &config()).is_err());
    }
}
