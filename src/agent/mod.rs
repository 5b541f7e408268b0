//! Conversational agent — generates chat replies for the operator.
//!
//! The router only sees the `ConversationAgent` trait. Two
//! implementations exist: `RigAgent` (Anthropic/OpenAI via rig-core) and
//! `PatternAgent`, the keyword fallback used when no API key is set.

pub mod fallback;
pub mod rig_agent;

pub use fallback::PatternAgent;
pub use rig_agent::{AgentBackend, RigAgent, RigAgentConfig};

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::AgentError;

/// Personality traits reported by the `/personality` command.
#[derive(Debug, Clone, Serialize)]
pub struct Personality {
    pub tone: String,
    pub formality: String,
    pub humor: String,
    pub language: String,
    pub response_length: String,
}

impl Default for Personality {
    fn default() -> Self {
        Self {
            tone: "amigable".to_string(),
            formality: "casual".to_string(),
            humor: "ligero".to_string(),
            language: "español".to_string(),
            response_length: "media".to_string(),
        }
    }
}

/// Generates conversational replies and tracks lightweight history.
#[async_trait]
pub trait ConversationAgent: Send + Sync {
    /// Generate a reply to `message` for `peer`, under `context`.
    async fn respond(&self, message: &str, context: &str, peer: &str)
    -> Result<String, AgentError>;

    /// Forget the conversation so far.
    async fn clear_history(&self);

    /// Short human-readable summary of the conversation so far.
    async fn conversation_summary(&self) -> String;

    /// The agent's personality traits.
    fn personality(&self) -> &Personality;

    /// Whether a real generative backend is wired up.
    fn is_configured(&self) -> bool;
}

/// Pick an agent from the environment: `ANTHROPIC_API_KEY` first, then
/// `OPENAI_API_KEY`, else the pattern fallback.
pub fn create_agent_from_env() -> Arc<dyn ConversationAgent> {
    if let Ok(key) = std::env::var("ANTHROPIC_API_KEY") {
        let model = std::env::var("RELAY_MODEL")
            .unwrap_or_else(|_| "claude-sonnet-4-20250514".to_string());
        let config = RigAgentConfig {
            backend: AgentBackend::Anthropic,
            api_key: secrecy::SecretString::from(key),
            model,
        };
        if let Ok(agent) = RigAgent::new(config) {
            return Arc::new(agent);
        }
    }
    if let Ok(key) = std::env::var("OPENAI_API_KEY") {
        let model = std::env::var("RELAY_MODEL").unwrap_or_else(|_| "gpt-4o".to_string());
        let config = RigAgentConfig {
            backend: AgentBackend::OpenAi,
            api_key: secrecy::SecretString::from(key),
            model,
        };
        if let Ok(agent) = RigAgent::new(config) {
            return Arc::new(agent);
        }
    }
    tracing::warn!("No LLM API key set — using pattern-matching fallback agent");
    Arc::new(PatternAgent::new())
}
