//! `streamgram chat`: Interactive or single-message chat in the terminal.

use std::io::Write;
use std::sync::Arc;
use streamgram_agent::{AgentError, HandleOutcome};
use streamgram_channels::ConsoleDisplay;
use streamgram_config::AppConfig;
use streamgram_core::channel::IncomingMessage;
use tokio::io::{AsyncBufReadExt, BufReader};

use super::{build_handler, client_settings, ctrl_c_token, history_store};

const CONSOLE_CHAT: &str = "console";

fn incoming(text: &str, reply_to: Option<String>) -> IncomingMessage {
    IncomingMessage {
        user_id: CONSOLE_CHAT.into(),
        username: std::env::var("USER").ok(),
        display_name: None,
        chat_id: CONSOLE_CHAT.into(),
        message_id: format!("in-{}", uuid::Uuid::new_v4()),
        text: text.to_string(),
        reply_to_message_id: reply_to,
    }
}

pub async fn run(message: Option<String>, ephemeral: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    if !config.has_api_key() {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    STREAMGRAM_API_KEY=sk-...");
        eprintln!("    OPENAI_API_KEY=sk-...");
        eprintln!();
        eprintln!("  Or add it to your config file:");
        eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }

    let surface = Arc::new(ConsoleDisplay::stdout());
    let handler = build_handler(&config, surface, history_store(&config, ephemeral));
    let client = client_settings(&config);

    if let Some(text) = message {
        let (cancel, listener) = ctrl_c_token();
        let result = handler.handle(&incoming(&text, None), &client, cancel).await;
        listener.abort();
        println!();
        return match result? {
            HandleOutcome::Failed => Err("Conversation failed (run with --verbose for details)".into()),
            _ => Ok(()),
        };
    }

    println!();
    println!("  streamgram: interactive chat");
    println!();
    println!("  Model:   {}", config.provider.default_model);
    println!("  Tools:   {}", if client.enable_tools { "enabled" } else { "disabled" });
    println!("  History: {}", if ephemeral { "memory" } else { config.history.backend.as_str() });
    println!();
    println!("  Type your message and press Enter.");
    println!("  Ctrl+C interrupts a reply; type 'exit' or press Ctrl+D to quit.");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    // The last page shown; the next message continues from it.
    let mut last_page: Option<String> = None;

    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let text = line.trim();
        if text.is_empty() {
            continue;
        }
        if matches!(text, "exit" | "quit") {
            break;
        }

        let (cancel, listener) = ctrl_c_token();
        let result = handler.handle(&incoming(text, last_page.clone()), &client, cancel).await;
        listener.abort();
        println!();

        match result {
            Ok(HandleOutcome::Replied(outcome)) => {
                if let Some(page) = outcome.pages.last() {
                    last_page = Some(page.message_id.clone());
                }
            }
            Ok(_) => {}
            Err(AgentError::Cancelled) => eprintln!("  [interrupted]"),
            Err(e) => eprintln!("  [Error] {e}"),
        }
        println!();
    }

    println!();
    Ok(())
}
