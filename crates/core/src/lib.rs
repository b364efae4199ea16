//! # streamgram core
//!
//! Domain types, traits, and error definitions for the streamgram relay.
//! This crate has **no transport dependencies**; it defines the domain model
//! that all other crates implement against.
//!
//! Every external collaborator (completion endpoint, display surface, history
//! store, tools) is a trait here. Implementations live in their own crates,
//! which keeps the agent testable with scripted stand-ins.

pub mod channel;
pub mod error;
pub mod history;
pub mod message;
pub mod provider;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use channel::{DisplaySurface, IncomingMessage, MarkupMode, PageHandle, ThreadTarget};
pub use error::{Error, Result};
pub use history::{HistoryStore, history_key};
pub use message::{Message, Role, ToolCall};
pub use provider::{
    ClientSettings, ContentDelta, DeltaReceiver, Provider, ProviderFactory, ProviderRequest,
    ToolCallFragment, ToolDefinition,
};
pub use tool::{Tool, ToolRegistry, ToolResult};
