//! History store trait: conversation contexts keyed by message identifier.
//!
//! Every outbound page and every inbound user message gets the full context
//! stored under its own key, so replying to any of them continues that
//! conversation. Keys are independent slots; no cross-key transaction is
//! needed.

use async_trait::async_trait;
use crate::error::MemoryError;
use crate::message::Message;

/// Build the storage key for a message in a user's history.
pub fn history_key(user_id: &str, message_id: &str) -> String {
    format!("user:{user_id}:messages:{message_id}")
}

/// The core HistoryStore trait.
///
/// Implementations: in-memory (for testing and ephemeral sessions) and
/// JSON-file backed.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// The backend name (e.g., "memory", "file").
    fn name(&self) -> &str;

    /// Fetch the context stored under `key`.
    async fn get(&self, key: &str) -> Result<Option<Vec<Message>>, MemoryError>;

    /// Store `messages` under `key`, replacing anything already there.
    async fn put(&self, key: &str, messages: Vec<Message>) -> Result<(), MemoryError>;
}
