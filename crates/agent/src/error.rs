//! Errors surfaced by the conversation machinery.

use streamgram_core::error::{MemoryError, ProviderError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentError {
    /// The completion transport failed; the round was aborted.
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Reading or writing conversation history failed.
    #[error("History store error: {0}")]
    History(#[from] MemoryError),

    /// The caller abandoned the conversation.
    #[error("Conversation cancelled")]
    Cancelled,

    /// Every attempt ended blank or failed.
    #[error("No usable reply after {attempts} attempts")]
    AttemptsExhausted {
        attempts: u32,
        last_error: Option<ProviderError>,
    },
}

impl AgentError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, AgentError::Cancelled)
    }
}
