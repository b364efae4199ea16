//! File-based history store: persistent JSON-lines storage.
//!
//! Each line is one `{"key": ..., "messages": [...]}` record. Writes append
//! a line; on load the last record for a key wins. Corrupted lines are
//! skipped.
//!
//! Storage location: `~/.streamgram/history.json` unless configured.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use streamgram_core::error::MemoryError;
use streamgram_core::history::HistoryStore;
use streamgram_core::message::Message;
use tokio::sync::RwLock;
use tracing::{debug, warn};

#[derive(Serialize, Deserialize)]
struct Record {
    key: String,
    messages: Vec<Message>,
}

/// A file-backed history store.
///
/// Contexts are loaded into memory on creation and every `put` is appended
/// to disk before it returns.
pub struct FileHistory {
    path: PathBuf,
    entries: Arc<RwLock<HashMap<String, Vec<Message>>>>,
}

impl FileHistory {
    /// Open the store at `path`; a missing file starts empty.
    pub fn open(path: PathBuf) -> Self {
        let entries = Self::load_from_disk(&path);
        debug!(path = %path.display(), count = entries.len(), "File history loaded");
        Self {
            path,
            entries: Arc::new(RwLock::new(entries)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load_from_disk(path: &Path) -> HashMap<String, Vec<Message>> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(_) => return HashMap::new(),
        };

        let mut entries = HashMap::new();
        for line in content.lines().filter(|line| !line.trim().is_empty()) {
            match serde_json::from_str::<Record>(line) {
                Ok(record) => {
                    entries.insert(record.key, record.messages);
                }
                Err(e) => warn!(error = %e, "Skipping corrupted history record"),
            }
        }
        entries
    }

    fn append(&self, line: &str) -> Result<(), MemoryError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                MemoryError::Storage(format!("Failed to create history directory: {e}"))
            })?;
        }
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| MemoryError::Storage(format!("Failed to open history file: {e}")))?;
        writeln!(file, "{line}")
            .map_err(|e| MemoryError::Storage(format!("Failed to write history file: {e}")))
    }

    /// Rewrite the file with one record per key.
    pub async fn compact(&self) -> Result<(), MemoryError> {
        let entries = self.entries.read().await;
        let mut content = String::new();
        for (key, messages) in entries.iter() {
            let line = serde_json::to_string(&Record {
                key: key.clone(),
                messages: messages.clone(),
            })
            .map_err(|e| MemoryError::Serialization(e.to_string()))?;
            content.push_str(&line);
            content.push('\n');
        }
        std::fs::write(&self.path, content)
            .map_err(|e| MemoryError::Storage(format!("Failed to write history file: {e}")))
    }
}

#[async_trait]
impl HistoryStore for FileHistory {
    fn name(&self) -> &str {
        "file"
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<Message>>, MemoryError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, messages: Vec<Message>) -> Result<(), MemoryError> {
        let record = Record {
            key: key.to_string(),
            messages,
        };
        let line =
            serde_json::to_string(&record).map_err(|e| MemoryError::Serialization(e.to_string()))?;

        // Hold the write lock across the append so lines land in put order.
        let mut entries = self.entries.write().await;
        self.append(&line)?;
        entries.insert(record.key, record.messages);
        Ok(())
    }
}
