//! Error types for the streamgram domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum; `Error` aggregates them.

use thiserror::Error;

/// The top-level error type for all streamgram operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Completion transport errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Display surface errors ---
    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    // --- History store errors ---
    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Failures of the completion transport. These abort the current round.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError {
        status_code: u16,
        message: String,
    },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Malformed stream frame: {0}")]
    MalformedFrame(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

impl ProviderError {
    /// Whether a new round may succeed where this one failed.
    ///
    /// Credential and configuration problems will fail identically on every
    /// attempt, so they end the conversation instead of burning retries.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            ProviderError::AuthenticationFailed(_) | ProviderError::NotConfigured(_)
        )
    }
}

/// Failures of a display surface (create/edit of an outbound page).
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("Channel not configured: {0}")]
    NotConfigured(String),

    #[error("Message delivery failed to {channel}: {reason}")]
    DeliveryFailed { channel: String, reason: String },

    #[error("Message rejected by {channel}: {description}")]
    Rejected { channel: String, description: String },

    #[error("Channel connection lost: {0}")]
    ConnectionLost(String),
}

/// Failures of the history store.
#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Tool timed out: {tool_name} after {timeout_secs}s")]
    Timeout { tool_name: String, timeout_secs: u64 },

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),
}
