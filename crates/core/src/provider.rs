//! Provider trait: the abstraction over streamed completion endpoints.
//!
//! A Provider sends a conversation context to a language model and yields
//! the reply as an ordered stream of [`ContentDelta`]s. Deltas are handed
//! over raw: tool-call argument fragments are *not* merged here, that is the
//! job of the agent's accumulator.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use crate::error::ProviderError;
use crate::message::Message;

/// A single completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRequest {
    /// The model to use (e.g., "gpt-4o")
    pub model: String,

    /// The conversation messages
    pub messages: Vec<Message>,

    /// Sampling temperature; provider default when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Available tools the model can call (empty = tools disabled)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,
}

/// A tool definition sent to the LLM so it knows what tools it can call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The tool name
    pub name: String,

    /// Description of what the tool does
    pub description: String,

    /// JSON Schema describing the tool's parameters
    pub parameters: serde_json::Value,
}

/// One incremental unit of streamed output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContentDelta {
    /// Partial reply text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    /// Partial tool call fragments
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallFragment>,
}

impl ContentDelta {
    /// A delta carrying only text.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            tool_calls: Vec::new(),
        }
    }

    /// A delta carrying only tool call fragments.
    pub fn tool_calls(fragments: Vec<ToolCallFragment>) -> Self {
        Self {
            text: None,
            tool_calls: fragments,
        }
    }
}

/// A piece of one logical tool invocation, identified by `index`.
///
/// `id` and `name` arrive on the first fragment of an index only; argument
/// chunks for the same index concatenate, in arrival order, to a JSON object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallFragment {
    pub index: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,
}

/// The receiving end of a streamed completion.
///
/// The stream ends when the sender is dropped; an `Err` item aborts the round.
pub type DeltaReceiver = tokio::sync::mpsc::Receiver<Result<ContentDelta, ProviderError>>;

/// The core Provider trait.
///
/// The round driver calls `stream()` without knowing which endpoint sits
/// behind it.
#[async_trait]
pub trait Provider: Send + Sync {
    /// A human-readable name for this provider (e.g., "openai").
    fn name(&self) -> &str;

    /// Open a streamed completion.
    async fn stream(&self, request: ProviderRequest) -> Result<DeltaReceiver, ProviderError>;

    /// Health check: can we reach the provider?
    async fn health_check(&self) -> Result<bool, ProviderError> {
        Ok(true)
    }
}

/// Per-user client settings, resolved once per conversation.
///
/// Never mutated after construction; a provider is built from it fresh for
/// every conversation.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientSettings {
    /// API key for the completion endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Endpoint base URL override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// Model override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Whether tool schemas are sent with each round
    #[serde(default)]
    pub enable_tools: bool,
}

impl std::fmt::Debug for ClientSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientSettings")
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("enable_tools", &self.enable_tools)
            .finish()
    }
}

/// Builds a provider from per-user settings.
pub trait ProviderFactory: Send + Sync {
    /// Construct a provider for these settings.
    fn build(&self, settings: &ClientSettings) -> Result<Arc<dyn Provider>, ProviderError>;

    /// The model used when the settings do not name one.
    fn default_model(&self) -> &str;
}
