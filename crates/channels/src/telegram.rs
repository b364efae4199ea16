//! Telegram display surface.
//!
//! Posts pages with `sendMessage` and updates them with `editMessageText`
//! through the Bot API over HTTPS. Inbound updates are not handled here.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use streamgram_core::channel::{DisplaySurface, MarkupMode, PageHandle, ThreadTarget};
use streamgram_core::error::ChannelError;
use tracing::{debug, trace};

const CHANNEL: &str = "telegram";

/// Telegram surface configuration.
#[derive(Clone)]
pub struct TelegramConfig {
    /// Bot token from @BotFather.
    pub bot_token: String,
    /// Bot API base URL.
    pub api_base: String,
}

impl std::fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("bot_token", &"[REDACTED]")
            .field("api_base", &self.api_base)
            .finish()
    }
}

/// Telegram Bot API display surface.
pub struct TelegramDisplay {
    config: TelegramConfig,
    client: reqwest::Client,
}

impl TelegramDisplay {
    pub fn new(config: TelegramConfig) -> Result<Self, ChannelError> {
        if config.bot_token.trim().is_empty() {
            return Err(ChannelError::NotConfigured("telegram bot token is empty".into()));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ChannelError::NotConfigured(format!("HTTP client: {e}")))?;
        Ok(Self { config, client })
    }

    fn method_url(&self, method: &str) -> String {
        format!(
            "{}/bot{}/{}",
            self.config.api_base.trim_end_matches('/'),
            self.config.bot_token,
            method
        )
    }

    async fn call<T: for<'de> Deserialize<'de>>(
        &self,
        method: &str,
        body: &serde_json::Value,
    ) -> Result<ApiReply<T>, ChannelError> {
        let response = self
            .client
            .post(self.method_url(method))
            .json(body)
            .send()
            .await
            .map_err(|e| ChannelError::DeliveryFailed {
                channel: CHANNEL.into(),
                // reqwest errors include the URL, which carries the token
                reason: e.without_url().to_string(),
            })?;

        let status = response.status().as_u16();
        let reply: ApiReply<T> = response.json().await.map_err(|e| ChannelError::DeliveryFailed {
            channel: CHANNEL.into(),
            reason: format!("unreadable {method} response (status {status}): {}", e.without_url()),
        })?;
        trace!(method, status, ok = reply.ok, "Bot API call");
        Ok(reply)
    }
}

fn parse_mode(mode: MarkupMode) -> Option<&'static str> {
    match mode {
        MarkupMode::Html => Some("HTML"),
        MarkupMode::Plain => None,
    }
}

fn parse_message_id(raw: &str) -> Result<i64, ChannelError> {
    raw.parse().map_err(|_| ChannelError::DeliveryFailed {
        channel: CHANNEL.into(),
        reason: format!("invalid message id '{raw}'"),
    })
}

fn send_message_body(
    target: &ThreadTarget,
    text: &str,
    mode: MarkupMode,
) -> Result<serde_json::Value, ChannelError> {
    let mut body = serde_json::json!({
        "chat_id": target.chat_id,
        "text": text,
    });
    if let Some(pm) = parse_mode(mode) {
        body["parse_mode"] = serde_json::json!(pm);
    }
    if let Some(reply_to) = &target.reply_to {
        body["reply_parameters"] = serde_json::json!({
            "message_id": parse_message_id(reply_to)?,
            "allow_sending_without_reply": true,
        });
    }
    Ok(body)
}

fn edit_message_body(
    handle: &PageHandle,
    text: &str,
    mode: MarkupMode,
) -> Result<serde_json::Value, ChannelError> {
    let mut body = serde_json::json!({
        "chat_id": handle.chat_id,
        "message_id": parse_message_id(&handle.message_id)?,
        "text": text,
    });
    if let Some(pm) = parse_mode(mode) {
        body["parse_mode"] = serde_json::json!(pm);
    }
    Ok(body)
}

/// Editing a message to identical content is reported as an error by the
/// Bot API; for a renderer that is a no-op.
fn is_not_modified(description: &str) -> bool {
    description.contains("message is not modified")
}

#[async_trait]
impl DisplaySurface for TelegramDisplay {
    fn name(&self) -> &str {
        CHANNEL
    }

    async fn create(
        &self,
        target: &ThreadTarget,
        text: &str,
        mode: MarkupMode,
    ) -> Result<PageHandle, ChannelError> {
        let body = send_message_body(target, text, mode)?;
        let reply: ApiReply<SentMessage> = self.call("sendMessage", &body).await?;
        let sent = reply.into_result()?;
        debug!(chat_id = %target.chat_id, message_id = sent.message_id, "Page created");
        Ok(PageHandle {
            chat_id: target.chat_id.clone(),
            message_id: sent.message_id.to_string(),
        })
    }

    async fn edit(&self, handle: &PageHandle, text: &str, mode: MarkupMode) -> Result<(), ChannelError> {
        let body = edit_message_body(handle, text, mode)?;
        let reply: ApiReply<serde_json::Value> = self.call("editMessageText", &body).await?;
        match reply.into_result() {
            Ok(_) => Ok(()),
            Err(ChannelError::Rejected { description, .. }) if is_not_modified(&description) => {
                trace!(page = %handle, "Edit was a no-op");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

// --- Bot API types (internal) ---

#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
struct ApiReply<T> {
    ok: bool,
    #[serde(default)]
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
}

impl<T> ApiReply<T> {
    fn into_result(self) -> Result<T, ChannelError> {
        match (self.ok, self.result) {
            (true, Some(result)) => Ok(result),
            (true, None) => Err(ChannelError::DeliveryFailed {
                channel: CHANNEL.into(),
                reason: "response carried no result".into(),
            }),
            (false, _) => Err(ChannelError::Rejected {
                channel: CHANNEL.into(),
                description: self.description.unwrap_or_else(|| "unknown error".into()),
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    message_id: i64,
}
