//! In-memory history store: useful for testing and ephemeral sessions.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use streamgram_core::error::MemoryError;
use streamgram_core::history::HistoryStore;
use streamgram_core::message::Message;
use tokio::sync::RwLock;

/// A history store that keeps every context in a HashMap.
/// Useful for testing and sessions where persistence isn't needed.
#[derive(Clone, Default)]
pub struct InMemoryHistory {
    entries: Arc<RwLock<HashMap<String, Vec<Message>>>>,
}

impl InMemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// All stored keys, sorted.
    pub async fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.read().await.keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistory {
    fn name(&self) -> &str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<Message>>, MemoryError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, messages: Vec<Message>) -> Result<(), MemoryError> {
        self.entries.write().await.insert(key.to_string(), messages);
        Ok(())
    }
}
