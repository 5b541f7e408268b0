//! LLM-backed conversation agent via rig-core.
//!
//! Supports Anthropic and OpenAI. Keeps a short rolling history per
//! process (one operator, one conversation) folded into the preamble.

use std::collections::VecDeque;

use async_trait::async_trait;
use rig::client::CompletionClient;
use rig::completion::Prompt;
use rig::providers::{anthropic, openai};
use secrecy::ExposeSecret;
use tokio::sync::Mutex;

use super::{ConversationAgent, Personality};
use crate::error::AgentError;

/// How many past exchanges the preamble carries.
const MAX_HISTORY: usize = 20;

/// Supported generative backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentBackend {
    Anthropic,
    OpenAi,
}

/// Configuration for creating a rig-backed agent.
#[derive(Clone)]
pub struct RigAgentConfig {
    pub backend: AgentBackend,
    pub api_key: secrecy::SecretString,
    pub model: String,
}

enum RigClient {
    Anthropic(rig::client::Client<anthropic::client::AnthropicExt>),
    OpenAi(rig::client::Client<openai::client::OpenAIResponsesExt>),
}

/// One recorded conversation exchange.
struct Exchange {
    user: String,
    assistant: String,
}

/// Conversation agent backed by a rig-core provider.
pub struct RigAgent {
    client: RigClient,
    model: String,
    personality: Personality,
    history: Mutex<VecDeque<Exchange>>,
}

impl RigAgent {
    pub fn new(config: RigAgentConfig) -> Result<Self, AgentError> {
        let client = match config.backend {
            AgentBackend::Anthropic => {
                let client: rig::client::Client<anthropic::client::AnthropicExt> =
                    anthropic::Client::new(config.api_key.expose_secret()).map_err(|e| {
                        AgentError::RequestFailed {
                            provider: "anthropic".to_string(),
                            reason: format!("Failed to create Anthropic client: {e}"),
                        }
                    })?;
                tracing::info!("Using Anthropic (model: {})", config.model);
                RigClient::Anthropic(client)
            }
            AgentBackend::OpenAi => {
                let client: rig::client::Client<openai::client::OpenAIResponsesExt> =
                    openai::Client::new(config.api_key.expose_secret()).map_err(|e| {
                        AgentError::RequestFailed {
                            provider: "openai".to_string(),
                            reason: format!("Failed to create OpenAI client: {e}"),
                        }
                    })?;
                tracing::info!("Using OpenAI (model: {})", config.model);
                RigClient::OpenAi(client)
            }
        };

        Ok(Self {
            client,
            model: config.model,
            personality: Personality::default(),
            history: Mutex::new(VecDeque::new()),
        })
    }

    fn provider_name(&self) -> &'static str {
        match self.client {
            RigClient::Anthropic(_) => "anthropic",
            RigClient::OpenAi(_) => "openai",
        }
    }

    async fn build_preamble(&self, context: &str) -> String {
        let mut preamble = String::new();
        if context.is_empty() {
            preamble.push_str(
                "Eres un asistente de WhatsApp inteligente y amigable. \
                 Responde en español, breve y natural.",
            );
        } else {
            preamble.push_str(context);
        }

        let history = self.history.lock().await;
        if !history.is_empty() {
            preamble.push_str("\n\nConversación reciente:\n");
            for exchange in history.iter() {
                preamble.push_str(&format!(
                    "Usuario: {}\nAsistente: {}\n",
                    exchange.user, exchange.assistant
                ));
            }
        }
        preamble
    }

    async fn record(&self, user: &str, assistant: &str) {
        let mut history = self.history.lock().await;
        history.push_back(Exchange {
            user: user.to_string(),
            assistant: assistant.to_string(),
        });
        while history.len() > MAX_HISTORY {
            history.pop_front();
        }
    }
}

#[async_trait]
impl ConversationAgent for RigAgent {
    async fn respond(
        &self,
        message: &str,
        context: &str,
        peer: &str,
    ) -> Result<String, AgentError> {
        let preamble = self.build_preamble(context).await;

        let reply = match &self.client {
            RigClient::Anthropic(client) => client
                .agent(&self.model)
                .preamble(&preamble)
                .max_tokens(1024)
                .temperature(0.7)
                .build()
                .prompt(message)
                .await
                .map_err(|e| AgentError::RequestFailed {
                    provider: "anthropic".to_string(),
                    reason: e.to_string(),
                })?,
            RigClient::OpenAi(client) => client
                .agent(&self.model)
                .preamble(&preamble)
                .max_tokens(1024)
                .temperature(0.7)
                .build()
                .prompt(message)
                .await
                .map_err(|e| AgentError::RequestFailed {
                    provider: "openai".to_string(),
                    reason: e.to_string(),
                })?,
        };

        tracing::debug!(
            peer,
            provider = self.provider_name(),
            chars = reply.len(),
            "Generated conversational reply"
        );
        self.record(message, &reply).await;
        Ok(reply)
    }

    async fn clear_history(&self) {
        self.history.lock().await.clear();
    }

    async fn conversation_summary(&self) -> String {
        let history = self.history.lock().await;
        if history.is_empty() {
            return "📝 Sin conversación registrada todavía.".to_string();
        }
        let mut summary = format!(
            "📝 Resumen de la conversación ({} intercambios)\n\nÚltimos mensajes:\n",
            history.len()
        );
        for exchange in history.iter().rev().take(3) {
            summary.push_str(&format!("• {}\n", exchange.user));
        }
        summary
    }

    fn personality(&self) -> &Personality {
        &self.personality
    }

    fn is_configured(&self) -> bool {
        true
    }
}
