//! Display surface trait: the abstraction over a messaging platform's
//! outbound side.
//!
//! A surface can create a new outbound message in a thread and edit one it
//! created earlier. Both calls take a [`MarkupMode`]; the renderer falls back
//! to [`MarkupMode::Plain`] when the platform rejects markup.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use crate::error::ChannelError;

/// Where new pages are posted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ThreadTarget {
    /// The chat/group/DM identifier
    pub chat_id: String,

    /// The message that new pages reply to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
}

impl ThreadTarget {
    pub fn new(chat_id: impl Into<String>) -> Self {
        Self {
            chat_id: chat_id.into(),
            reply_to: None,
        }
    }

    pub fn replying_to(mut self, message_id: impl Into<String>) -> Self {
        self.reply_to = Some(message_id.into());
        self
    }
}

/// Opaque handle to an outbound message created by a surface.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PageHandle {
    pub chat_id: String,
    pub message_id: String,
}

impl std::fmt::Display for PageHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.chat_id, self.message_id)
    }
}

/// How the surface should interpret the text it is given.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarkupMode {
    /// Restricted inline HTML (b, i, code, s, pre and aliases)
    Html,
    /// Literal text
    Plain,
}

/// An inbound user message, as delivered by the messaging transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncomingMessage {
    /// Platform user identifier
    pub user_id: String,

    /// Sender's handle (if available)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    /// Human-readable sender name (if available)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,

    /// The chat the message arrived in
    pub chat_id: String,

    /// This message's identifier within the chat
    pub message_id: String,

    /// The text content
    pub text: String,

    /// The earlier message this one replies to, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to_message_id: Option<String>,
}

/// The core DisplaySurface trait.
///
/// Implementations handle platform-specific formatting, authentication and
/// timeouts; every failure surfaces as a `ChannelError`.
#[async_trait]
pub trait DisplaySurface: Send + Sync {
    /// Human-readable surface name (e.g., "telegram", "console").
    fn name(&self) -> &str;

    /// Post a new message into `target` and return its handle.
    async fn create(
        &self,
        target: &ThreadTarget,
        text: &str,
        mode: MarkupMode,
    ) -> Result<PageHandle, ChannelError>;

    /// Replace the text of a message previously returned by `create`.
    async fn edit(&self, handle: &PageHandle, text: &str, mode: MarkupMode)
        -> Result<(), ChannelError>;
}
