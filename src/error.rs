//! Error types for Chat Relay.

use std::time::Duration;

/// Top-level error type for the relay.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Agent error: {0}")]
    Agent(#[from] AgentError),

    #[error("Executor error: {0}")]
    Executor(#[from] ExecutorError),

    #[error("Mail error: {0}")]
    Mail(#[from] MailError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Messaging-channel errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Invalid webhook payload: {0}")]
    InvalidPayload(String),

    #[error("Failed to send on channel {name}: {reason}")]
    SendFailed { name: String, reason: String },

    #[error("Send on channel {name} timed out after {timeout:?}")]
    Timeout { name: String, timeout: Duration },

    #[error("Channel {name} is not configured: {reason}")]
    NotConfigured { name: String, reason: String },

    #[error("HTTP error: {0}")]
    Http(String),
}

/// Conversation-agent errors.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("No conversation backend configured")]
    NotConfigured,
}

/// Action-execution errors.
#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    #[error("No executor configured for action kind {kind}")]
    NotConfigured { kind: String },

    #[error("Executing {kind} failed: {reason}")]
    Failed { kind: String, reason: String },

    #[error("Executing {kind} timed out after {timeout:?}")]
    Timeout { kind: String, timeout: Duration },
}

/// Mailbox (IMAP/SMTP) errors.
#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("IMAP error: {0}")]
    Imap(String),

    #[error("SMTP error: {0}")]
    Smtp(String),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for the relay.
pub type Result<T> = std::result::Result<T, Error>;
