//! Subcommand implementations and the wiring they share.

pub mod chat;
pub mod config_cmd;
pub mod onboard;
pub mod send;

use std::sync::Arc;
use std::time::Duration;
use streamgram_agent::{ChatHandler, ChatSettings};
use streamgram_config::AppConfig;
use streamgram_core::channel::DisplaySurface;
use streamgram_core::history::HistoryStore;
use streamgram_core::provider::ClientSettings;
use streamgram_memory::{FileHistory, InMemoryHistory};
use streamgram_providers::OpenAiCompatFactory;

/// The sender settings a local operator gets: everything from the config.
pub(crate) fn client_settings(config: &AppConfig) -> ClientSettings {
    ClientSettings {
        api_key: config.provider.api_key.clone(),
        endpoint: Some(config.provider.api_url.clone()),
        model: Some(config.provider.default_model.clone()),
        enable_tools: config.conversation.enable_tools,
    }
}

pub(crate) fn history_store(config: &AppConfig, ephemeral: bool) -> Arc<dyn HistoryStore> {
    if ephemeral || config.history.backend == "memory" {
        return Arc::new(InMemoryHistory::new());
    }
    let path = config.history.resolved_path();
    tracing::debug!(path = %path.display(), "Using file history");
    Arc::new(FileHistory::open(path))
}

/// Build a handler that renders onto `surface`.
pub(crate) fn build_handler(
    config: &AppConfig,
    surface: Arc<dyn DisplaySurface>,
    history: Arc<dyn HistoryStore>,
) -> ChatHandler {
    let factory = OpenAiCompatFactory::new(&config.provider.api_url, &config.provider.default_model)
        .with_timeout(Duration::from_secs(config.provider.timeout_secs));
    ChatHandler::new(Arc::new(factory), surface, history)
        .with_tools(Arc::new(streamgram_tools::default_registry()))
        .with_settings(ChatSettings::from(config))
}

/// A token cancelled on Ctrl+C, plus the task listening for it.
pub(crate) fn ctrl_c_token() -> (tokio_util::sync::CancellationToken, tokio::task::JoinHandle<()>) {
    let cancel = tokio_util::sync::CancellationToken::new();
    let token = cancel.clone();
    let listener = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            token.cancel();
        }
    });
    (cancel, listener)
}
