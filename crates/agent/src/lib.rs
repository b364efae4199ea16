//! The streaming reply engine of streamgram.
//!
//! A conversation runs as a series of completion rounds:
//!
//! 1. **Stream** a completion; text goes to the [`StreamingRenderer`],
//!    tool-call fragments to the [`ToolCallAccumulator`]
//! 2. **Render** the growing reply by editing pages in place, cutting a new
//!    page at a safe boundary when one fills up
//! 3. **If tool calls**: run them, append one result per call, go back to 1
//! 4. **If text**: store the conversation under every page and stop
//!
//! The loop ends on the first non-blank reply without tool calls, or when
//! the attempt ceiling is reached.

pub mod conversation;
pub mod error;
pub mod handler;
pub mod markup;
pub mod pagination;
pub mod renderer;
pub mod round;
pub mod tool_calls;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use conversation::{ConversationLoop, ConversationOutcome};
pub use error::AgentError;
pub use handler::{APOLOGY, ChatHandler, ChatSettings, HandleOutcome, MISSING_KEY_NOTICE};
pub use markup::{sanitize, sanitize_detailed};
pub use renderer::{PLACEHOLDER, RenderOutcome, RenderSettings, StreamingRenderer};
pub use round::{PageCarry, RoundDriver, RoundOutput};
pub use tool_calls::ToolCallAccumulator;
