//! Clock tool: reports the current UTC time.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use streamgram_core::error::ToolError;
use streamgram_core::tool::{Tool, ToolResult};

pub struct CurrentTimeTool;

/// Render a timestamp the way the tool reports it.
pub fn describe_time(now: DateTime<Utc>) -> String {
    format!("The current time is {}. (UTC)", now.format("%Y-%m-%d %H:%M:%S"))
}

#[async_trait]
impl Tool for CurrentTimeTool {
    fn name(&self) -> &str {
        "get_current_time"
    }

    fn description(&self) -> &str {
        "Get the current time"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {},
            "required": [],
            "additionalProperties": false
        })
    }

    async fn execute(&self, _arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        Ok(ToolResult::ok(describe_time(Utc::now())))
    }
}
