//! streamgram CLI: the main entry point.
//!
//! Commands:
//! - `onboard`: Write a default config
//! - `chat`   : Interactive or single-message chat in the terminal
//! - `send`   : Relay one message to a Telegram chat
//! - `config` : Show the effective configuration

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "streamgram",
    about = "streamgram: streamed LLM replies, paged for chat surfaces",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize configuration
    Onboard,

    /// Chat in the terminal
    Chat {
        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,

        /// Keep history in memory only, whatever the config says
        #[arg(long)]
        ephemeral: bool,
    },

    /// Send a message to a Telegram chat and stream the reply there
    Send {
        /// Target chat id
        #[arg(long)]
        chat_id: String,

        /// Continue the conversation stored under this page id
        #[arg(long)]
        reply_to: Option<String>,

        /// The message text
        text: String,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration (secrets redacted)
    Show,
    /// Validate the configuration
    Validate,
    /// Print the config file path
    Path,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Logs go to stderr so they never interleave with streamed replies.
    let filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    match cli.command {
        Commands::Onboard => commands::onboard::run().await?,
        Commands::Chat { message, ephemeral } => commands::chat::run(message, ephemeral).await?,
        Commands::Send {
            chat_id,
            reply_to,
            text,
        } => commands::send::run(chat_id, reply_to, text).await?,
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config_cmd::show().await?,
            ConfigAction::Validate => commands::config_cmd::validate().await?,
            ConfigAction::Path => commands::config_cmd::path().await?,
        },
    }

    Ok(())
}
