//! Display surface implementations for streamgram.
//!
//! Each surface knows how to create and edit an outbound message on one
//! platform. Surfaces are trait-based; the renderer never sees which one it
//! is talking to.
//!
//! Available surfaces:
//! - **Telegram**: Bot API `sendMessage` / `editMessageText`
//! - **Console**: Terminal output for `streamgram chat`

pub mod console;
pub mod telegram;

pub use console::ConsoleDisplay;
pub use telegram::{TelegramConfig, TelegramDisplay};
