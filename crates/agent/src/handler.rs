//! Chat handler: turns one incoming message into a streamed reply.
//!
//! Loads the conversation the message replies to (or starts a new one),
//! records the user turn, builds a provider from the sender's settings and
//! runs the [`ConversationLoop`]. Failures end in a single generic apology;
//! the detail goes to the log.

use std::sync::Arc;
use streamgram_config::AppConfig;
use streamgram_core::channel::{DisplaySurface, IncomingMessage, MarkupMode, ThreadTarget};
use streamgram_core::history::{HistoryStore, history_key};
use streamgram_core::message::Message;
use streamgram_core::provider::{ClientSettings, ProviderFactory};
use streamgram_core::tool::ToolRegistry;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::conversation::{ConversationLoop, ConversationOutcome};
use crate::error::AgentError;
use crate::renderer::RenderSettings;

/// Shown when a conversation fails for any reason.
pub const APOLOGY: &str =
    "I'm sorry, but I'm having trouble understanding your message. Please try again.";

/// Shown when the sender has no API key configured.
pub const MISSING_KEY_NOTICE: &str =
    "Please set your OpenAI API key using /set_openai_key <your_openai_api_key>.";

/// Handler-wide settings.
#[derive(Debug, Clone)]
pub struct ChatSettings {
    /// System prompt for new conversations; `{user}` is replaced by the sender.
    pub system_prompt: String,
    pub render: RenderSettings,
    pub max_attempts: u32,
    /// Send tool schemas even when the sender's settings do not ask for it.
    pub enable_tools: bool,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for ChatSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            system_prompt: config.conversation.system_prompt.clone(),
            render: RenderSettings::from(&config.render),
            max_attempts: config.conversation.max_attempts,
            enable_tools: config.conversation.enable_tools,
        }
    }
}

/// How a message was dealt with.
#[derive(Debug)]
pub enum HandleOutcome {
    /// Nothing to answer.
    Ignored,
    /// The sender was asked to configure an API key.
    MissingApiKey,
    Replied(ConversationOutcome),
    /// The conversation failed and the apology was shown.
    Failed,
}

pub struct ChatHandler {
    factory: Arc<dyn ProviderFactory>,
    surface: Arc<dyn DisplaySurface>,
    history: Arc<dyn HistoryStore>,
    tools: Arc<ToolRegistry>,
    settings: ChatSettings,
}

impl ChatHandler {
    pub fn new(
        factory: Arc<dyn ProviderFactory>,
        surface: Arc<dyn DisplaySurface>,
        history: Arc<dyn HistoryStore>,
    ) -> Self {
        Self {
            factory,
            surface,
            history,
            tools: Arc::new(ToolRegistry::new()),
            settings: ChatSettings::default(),
        }
    }

    pub fn with_tools(mut self, tools: Arc<ToolRegistry>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_settings(mut self, settings: ChatSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Answer `message`.
    ///
    /// Only cancellation and history load failures are returned as errors;
    /// everything else is reported to the sender.
    pub async fn handle(
        &self,
        message: &IncomingMessage,
        client: &ClientSettings,
        cancel: CancellationToken,
    ) -> Result<HandleOutcome, AgentError> {
        if message.text.trim().is_empty() {
            debug!(chat_id = %message.chat_id, "Ignoring empty message");
            return Ok(HandleOutcome::Ignored);
        }

        let mut context = self.load_context(message).await?;
        context.push(Message::user(message.text.clone()));

        let user_key = history_key(&message.user_id, &message.message_id);
        if let Err(e) = self.history.put(&user_key, context.clone()).await {
            warn!(key = %user_key, error = %e, "Failed to store user turn");
        }

        let target = ThreadTarget::new(message.chat_id.clone()).replying_to(message.message_id.clone());

        let provider = match self.factory.build(client) {
            Ok(provider) => provider,
            Err(e) if !e.is_retryable() => {
                info!(user_id = %message.user_id, error = %e, "No usable API key for sender");
                self.notify(&target, MISSING_KEY_NOTICE).await;
                return Ok(HandleOutcome::MissingApiKey);
            }
            Err(e) => {
                error!(user_id = %message.user_id, error = %e, "Failed to build provider");
                self.notify(&target, APOLOGY).await;
                return Ok(HandleOutcome::Failed);
            }
        };

        let model = client
            .model
            .clone()
            .unwrap_or_else(|| self.factory.default_model().to_string());

        let conversation = ConversationLoop::new(provider, self.surface.clone(), model)
            .with_tools(self.tools.clone(), client.enable_tools || self.settings.enable_tools)
            .with_max_attempts(self.settings.max_attempts)
            .with_render_settings(self.settings.render.clone())
            .with_history(self.history.clone(), message.user_id.clone())
            .with_cancellation(cancel);

        match conversation.run(&target, &mut context).await {
            Ok(outcome) => Ok(HandleOutcome::Replied(outcome)),
            Err(AgentError::Cancelled) => Err(AgentError::Cancelled),
            Err(e) => {
                error!(
                    user_id = %message.user_id,
                    chat_id = %message.chat_id,
                    error = %e,
                    "Conversation failed"
                );
                self.notify(&target, APOLOGY).await;
                Ok(HandleOutcome::Failed)
            }
        }
    }

    async fn load_context(&self, message: &IncomingMessage) -> Result<Vec<Message>, AgentError> {
        if let Some(parent) = &message.reply_to_message_id {
            let key = history_key(&message.user_id, parent);
            match self.history.get(&key).await? {
                Some(context) => {
                    debug!(key = %key, messages = context.len(), "Continuing conversation");
                    return Ok(context);
                }
                None => debug!(key = %key, "No stored conversation for reply, starting fresh"),
            }
        }
        Ok(vec![Message::system(self.system_prompt_for(message))])
    }

    fn system_prompt_for(&self, message: &IncomingMessage) -> String {
        let who = match (&message.username, &message.display_name) {
            (Some(handle), Some(name)) => format!("@{handle}, {name}"),
            (Some(handle), None) => format!("@{handle}"),
            (None, Some(name)) => name.clone(),
            (None, None) => "the user".to_string(),
        };
        self.settings.system_prompt.replace("{user}", &who)
    }

    /// Post a standalone plain-text notice.
    async fn notify(&self, target: &ThreadTarget, text: &str) {
        if let Err(e) = self.surface.create(target, text, MarkupMode::Plain).await {
            warn!(chat_id = %target.chat_id, error = %e, "Failed to deliver notice");
        }
    }
}
