//! Relay configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Core relay configuration — operator identity, guard windows, caches.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Identities recognized as the operator (phone number in both the
    /// bare and `@c.us` chat-id forms).
    pub operator_identities: Vec<String>,
    /// Where operator-facing replies are sent.
    pub operator_chat: String,
    /// Prefix that marks a control command (`/status`, `/help`, ...).
    pub command_prefix: String,
    /// Minimum time between two outbound sends to the same peer.
    pub cooldown_window: Duration,
    /// How long a pending action stays approvable.
    pub action_ttl: chrono::Duration,
    /// Maximum tracked processed webhook message ids.
    pub max_processed_ids: usize,
    /// Per-recipient recent-outbound cache size (duplicate suppression).
    pub max_recent_outbound: usize,
    /// Where the auto-approve/auto-reject pattern lists are persisted.
    pub patterns_path: PathBuf,
    /// Interval between unread-mail polls when auto-check is on.
    pub mail_poll_interval: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            operator_identities: Vec::new(),
            operator_chat: String::new(),
            command_prefix: "/".to_string(),
            cooldown_window: Duration::from_secs(5),
            action_ttl: chrono::Duration::minutes(30),
            max_processed_ids: 100,
            max_recent_outbound: 5,
            patterns_path: PathBuf::from("data/approval_patterns.json"),
            mail_poll_interval: Duration::from_secs(60),
        }
    }
}

impl RelayConfig {
    /// Build config from environment variables. `OPERATOR_PHONE` is
    /// required; everything else falls back to defaults.
    pub fn from_env() -> Result<Self, crate::error::ConfigError> {
        let phone = std::env::var("OPERATOR_PHONE").map_err(|_| {
            crate::error::ConfigError::MissingEnvVar("OPERATOR_PHONE".to_string())
        })?;

        let mut cfg = Self {
            operator_identities: operator_identities_for(&phone),
            operator_chat: phone,
            ..Self::default()
        };

        if let Ok(raw) = std::env::var("RELAY_COOLDOWN_SECS")
            && let Ok(secs) = raw.parse::<u64>()
        {
            cfg.cooldown_window = Duration::from_secs(secs);
        }
        if let Ok(raw) = std::env::var("RELAY_ACTION_TTL_MIN")
            && let Ok(minutes) = raw.parse::<i64>()
        {
            cfg.action_ttl = chrono::Duration::minutes(minutes);
        }
        if let Ok(raw) = std::env::var("RELAY_MAIL_POLL_SECS")
            && let Ok(secs) = raw.parse::<u64>()
        {
            cfg.mail_poll_interval = Duration::from_secs(secs);
        }
        if let Ok(path) = std::env::var("RELAY_PATTERNS_PATH") {
            cfg.patterns_path = PathBuf::from(path);
        }

        Ok(cfg)
    }

    /// Check whether an identity string matches the configured operator.
    pub fn is_operator(&self, identity: &str) -> bool {
        !identity.is_empty()
            && self
                .operator_identities
                .iter()
                .any(|id| id == identity)
    }
}

/// Expand a bare phone number into the identity forms the provider uses
/// (`5215664087506` and `5215664087506@c.us`).
pub fn operator_identities_for(phone: &str) -> Vec<String> {
    let bare = phone.trim_end_matches("@c.us").to_string();
    let chat_id = format!("{bare}@c.us");
    vec![bare, chat_id]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_windows() {
        let cfg = RelayConfig::default();
        assert_eq!(cfg.cooldown_window, Duration::from_secs(5));
        assert_eq!(cfg.action_ttl, chrono::Duration::minutes(30));
        assert_eq!(cfg.max_processed_ids, 100);
        assert_eq!(cfg.max_recent_outbound, 5);
        assert_eq!(cfg.command_prefix, "/");
    }

    #[test]
    fn operator_identity_forms() {
        let ids = operator_identities_for("5215664087506");
        assert_eq!(ids, vec!["5215664087506", "5215664087506@c.us"]);

        // Already in chat-id form — both forms still recognized
        let ids = operator_identities_for("5215664087506@c.us");
        assert_eq!(ids, vec!["5215664087506", "5215664087506@c.us"]);
    }

    #[test]
    fn is_operator_matches_either_form() {
        let cfg = RelayConfig {
            operator_identities: operator_identities_for("5215664087506"),
            ..RelayConfig::default()
        };
        assert!(cfg.is_operator("5215664087506"));
        assert!(cfg.is_operator("5215664087506@c.us"));
        assert!(!cfg.is_operator("5219999999999@c.us"));
        assert!(!cfg.is_operator(""));
    }
}
