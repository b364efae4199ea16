//! Conversation history stores for streamgram.

pub mod file_backend;
pub mod in_memory;

pub use file_backend::FileHistory;
pub use in_memory::InMemoryHistory;
