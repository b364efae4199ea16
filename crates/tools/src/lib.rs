//! Built-in tool implementations for streamgram.
//!
//! Tools give the model a way to look things up mid-conversation:
//! the current time and the text of a web page.

pub mod clock;
pub mod web_content;

use streamgram_core::tool::ToolRegistry;
use tracing::warn;

pub use clock::CurrentTimeTool;
pub use web_content::WebContentTool;

/// Create a default tool registry with all built-in tools.
pub fn default_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(CurrentTimeTool));
    match WebContentTool::new(20) {
        Ok(tool) => registry.register(Box::new(tool)),
        Err(e) => warn!(error = %e, "get_web_content unavailable"),
    }
    registry
}
