//! `streamgram send`: Relay one message to a Telegram chat.
//!
//! The reply streams into the chat through the Bot API, paged and edited in
//! place exactly as it would be for an inbound message.

use std::sync::Arc;
use streamgram_agent::HandleOutcome;
use streamgram_channels::{TelegramConfig, TelegramDisplay};
use streamgram_config::AppConfig;
use streamgram_core::channel::IncomingMessage;

use super::{build_handler, client_settings, ctrl_c_token, history_store};

/// Stands in for the inbound message id; Telegram sends without a reply
/// anchor when it does not exist.
const LOCAL_MESSAGE_ID: &str = "0";

pub async fn run(
    chat_id: String,
    reply_to: Option<String>,
    text: String,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    let bot_token = config
        .telegram
        .bot_token
        .clone()
        .ok_or("No Telegram bot token configured (set TELEGRAM_TOKEN or [telegram].bot_token)")?;
    let surface = TelegramDisplay::new(TelegramConfig {
        bot_token,
        api_base: config.telegram.api_base.clone(),
    })?;

    let handler = build_handler(&config, Arc::new(surface), history_store(&config, false));
    let message = IncomingMessage {
        user_id: chat_id.clone(),
        username: None,
        display_name: None,
        chat_id,
        message_id: LOCAL_MESSAGE_ID.into(),
        text,
        reply_to_message_id: reply_to,
    };

    let (cancel, listener) = ctrl_c_token();
    let result = handler.handle(&message, &client_settings(&config), cancel).await;
    listener.abort();

    match result? {
        HandleOutcome::Replied(outcome) => {
            let pages: Vec<String> = outcome.pages.iter().map(|p| p.message_id.clone()).collect();
            println!("Sent {} page(s): {}", pages.len(), pages.join(", "));
            Ok(())
        }
        HandleOutcome::Ignored => Err("Nothing to send: message text is empty".into()),
        HandleOutcome::MissingApiKey => Err("No API key configured".into()),
        HandleOutcome::Failed => Err("Conversation failed (run with --verbose for details)".into()),
    }
}
