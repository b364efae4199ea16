//! Web content tool: fetches a page and returns its readable text.
//!
//! Markup, scripts and styles are stripped and whitespace is collapsed so
//! the result fits comfortably in a model context.

use async_trait::async_trait;
use std::time::Duration;
use streamgram_core::error::ToolError;
use streamgram_core::tool::{Tool, ToolResult};
use tracing::debug;

const TOOL_NAME: &str = "get_web_content";

/// Upper bound on returned characters.
pub const DEFAULT_MAX_CHARS: usize = 12_000;

pub struct WebContentTool {
    client: reqwest::Client,
    timeout_secs: u64,
    max_chars: usize,
}

impl WebContentTool {
    pub fn new(timeout_secs: u64) -> Result<Self, ToolError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(concat!("streamgram/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: TOOL_NAME.into(),
                reason: format!("HTTP client: {e}"),
            })?;
        Ok(Self {
            client,
            timeout_secs,
            max_chars: DEFAULT_MAX_CHARS,
        })
    }

    pub fn with_max_chars(mut self, max_chars: usize) -> Self {
        self.max_chars = max_chars;
        self
    }

    fn failed(reason: impl Into<String>) -> ToolError {
        ToolError::ExecutionFailed {
            tool_name: TOOL_NAME.into(),
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl Tool for WebContentTool {
    fn name(&self) -> &str {
        TOOL_NAME
    }

    fn description(&self) -> &str {
        "Get the content of a web page"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "url": {
                    "type": "string",
                    "description": "The URL of the web page to get the content from"
                }
            },
            "required": ["url"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let url = arguments["url"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'url' argument".into()))?;

        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(ToolError::InvalidArguments(
                "URL must start with http:// or https://".into(),
            ));
        }

        debug!(url, "Fetching web content");
        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                ToolError::Timeout {
                    tool_name: TOOL_NAME.into(),
                    timeout_secs: self.timeout_secs,
                }
            } else {
                Self::failed(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(Self::failed(format!("{url} returned {status}")));
        }

        let body = response.text().await.map_err(|e| Self::failed(e.to_string()))?;
        let text = truncate_chars(&html_to_text(&body), self.max_chars);
        Ok(ToolResult::ok(text))
    }
}

/// Reduce an HTML document to its visible text.
pub fn html_to_text(html: &str) -> String {
    let mut out = String::with_capacity(html.len() / 2);
    let lower = html.to_ascii_lowercase();
    let mut i = 0;

    while i < html.len() {
        let rest = &html[i..];
        if rest.starts_with('<') {
            let lower_rest = &lower[i..];
            // Drop whole script/style blocks
            let skip_to = ["script", "style"].iter().find_map(|tag| {
                let open = format!("<{tag}");
                if lower_rest.starts_with(&open) {
                    let close = format!("</{tag}>");
                    Some(lower_rest.find(&close).map_or(html.len(), |p| i + p + close.len()))
                } else {
                    None
                }
            });
            if let Some(end) = skip_to {
                i = end;
                out.push(' ');
                continue;
            }
            match rest.find('>') {
                Some(p) => {
                    i += p + 1;
                    out.push(' ');
                }
                None => break,
            }
        } else {
            let next = rest.find('<').unwrap_or(rest.len());
            out.push_str(&rest[..next]);
            i += next;
        }
    }

    let decoded = out
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&");
    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
