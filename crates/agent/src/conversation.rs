//! The conversation loop.
//!
//! Runs completion rounds until the model produces a non-blank reply with
//! no tool calls, or the attempt ceiling is reached:
//!
//! 1. **Generate** a round from the current context
//! 2. **If tool calls**: append the assistant turn, resolve every call,
//!    append one `tool` message per call, go back to 1
//! 3. **If blank**: retry without touching the context
//! 4. **Otherwise** append the reply and stop
//!
//! After every round that grew the context, it is stored under each page
//! the round produced, and under pages left behind by aborted rounds.

use std::sync::Arc;
use streamgram_core::channel::{DisplaySurface, PageHandle, ThreadTarget};
use streamgram_core::error::ToolError;
use streamgram_core::history::{HistoryStore, history_key};
use streamgram_core::message::{Message, ToolCall};
use streamgram_core::provider::{Provider, ProviderRequest};
use streamgram_core::tool::ToolRegistry;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::AgentError;
use crate::renderer::{RenderSettings, until_cancelled};
use crate::round::{PageCarry, RoundDriver};

/// The successful end of a conversation.
#[derive(Debug, Clone)]
pub struct ConversationOutcome {
    /// The final reply text.
    pub reply_text: String,
    /// Every page shown during the conversation, in order.
    pub pages: Vec<PageHandle>,
    /// Rounds used, including retried ones.
    pub attempts: u32,
}

pub struct ConversationLoop {
    provider: Arc<dyn Provider>,
    surface: Arc<dyn DisplaySurface>,
    model: String,
    tools: Arc<ToolRegistry>,
    tools_enabled: bool,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
    max_attempts: u32,
    render: RenderSettings,
    history: Option<(Arc<dyn HistoryStore>, String)>,
    cancel: CancellationToken,
}

impl ConversationLoop {
    pub fn new(
        provider: Arc<dyn Provider>,
        surface: Arc<dyn DisplaySurface>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            surface,
            model: model.into(),
            tools: Arc::new(ToolRegistry::new()),
            tools_enabled: false,
            temperature: None,
            max_tokens: None,
            max_attempts: 10,
            render: RenderSettings::default(),
            history: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Attach a tool registry; its schemas are sent only when `enabled`.
    pub fn with_tools(mut self, tools: Arc<ToolRegistry>, enabled: bool) -> Self {
        self.tools = tools;
        self.tools_enabled = enabled;
        self
    }

    /// Set the maximum number of completion rounds.
    pub fn with_max_attempts(mut self, max: u32) -> Self {
        self.max_attempts = max.max(1);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set the max tokens per completion round.
    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    pub fn with_render_settings(mut self, render: RenderSettings) -> Self {
        self.render = render;
        self
    }

    /// Store context under every produced page, keyed for `user_id`.
    pub fn with_history(mut self, store: Arc<dyn HistoryStore>, user_id: impl Into<String>) -> Self {
        self.history = Some((store, user_id.into()));
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    fn request(&self, context: &[Message]) -> ProviderRequest {
        ProviderRequest {
            model: self.model.clone(),
            messages: context.to_vec(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            tools: if self.tools_enabled {
                self.tools.definitions()
            } else {
                Vec::new()
            },
        }
    }

    /// Run the conversation, replying into `target`.
    ///
    /// `context` is the full history including the new user turn; it is
    /// appended to in place.
    pub async fn run(
        &self,
        target: &ThreadTarget,
        context: &mut Vec<Message>,
    ) -> Result<ConversationOutcome, AgentError> {
        info!(
            chat_id = %target.chat_id,
            messages = context.len(),
            model = %self.model,
            "Processing conversation"
        );

        let driver = RoundDriver::new(
            self.provider.as_ref(),
            self.surface.as_ref(),
            &self.render,
            &self.cancel,
        );
        let mut carry = PageCarry::default();
        let mut pages = Vec::new();
        let mut last_error = None;

        for attempt in 1..=self.max_attempts {
            debug!(chat_id = %target.chat_id, attempt, "Starting round");

            let round = match driver.run(self.request(context), target, &mut carry).await {
                Ok(round) => round,
                Err(AgentError::Provider(e)) if e.is_retryable() => {
                    warn!(chat_id = %target.chat_id, attempt, error = %e, "Round failed, retrying");
                    last_error = Some(e);
                    continue;
                }
                Err(e) => return Err(e),
            };

            if !round.tool_calls.is_empty() {
                context.push(Message::assistant_with_tool_calls(
                    round.reply_text.clone(),
                    round.tool_calls.clone(),
                ));
                self.resolve_tool_calls(&round.tool_calls, context).await?;
                let round_pages = Self::settle_pages(&mut carry, round.pages, &mut pages);
                self.persist(&round_pages, context).await;
                continue;
            }

            if round.reply_text.trim().is_empty() {
                debug!(chat_id = %target.chat_id, attempt, "Blank reply, retrying");
                pages.extend(round.pages);
                continue;
            }

            context.push(Message::assistant(round.reply_text.clone()));
            let round_pages = Self::settle_pages(&mut carry, round.pages, &mut pages);
            self.persist(&round_pages, context).await;
            info!(chat_id = %target.chat_id, attempt, pages = pages.len(), "Conversation complete");
            return Ok(ConversationOutcome {
                reply_text: round.reply_text,
                pages,
                attempts: attempt,
            });
        }

        error!(
            chat_id = %target.chat_id,
            attempts = self.max_attempts,
            last_error = ?last_error,
            "No usable reply, giving up"
        );
        Err(AgentError::AttemptsExhausted {
            attempts: self.max_attempts,
            last_error,
        })
    }

    /// Append one `tool` message per call.
    ///
    /// A call that cannot run still gets a result, carrying the diagnostic,
    /// so every requested call stays paired with an answer.
    async fn resolve_tool_calls(
        &self,
        calls: &[ToolCall],
        context: &mut Vec<Message>,
    ) -> Result<(), AgentError> {
        for call in calls {
            let output = if !self.tools.contains(&call.name) {
                warn!(tool = %call.name, call_id = %call.id, "Model requested unknown tool");
                format!("Error: unknown tool '{}'", call.name)
            } else {
                info!(tool = %call.name, call_id = %call.id, "Calling tool");
                match until_cancelled(&self.cancel, self.tools.execute(&call.name, &call.arguments)).await? {
                    Ok(result) => result.output,
                    Err(ToolError::InvalidArguments(detail)) => {
                        warn!(tool = %call.name, %detail, "Skipping tool call with invalid arguments");
                        format!("Error: invalid arguments for {}: {detail}", call.name)
                    }
                    Err(e) => {
                        warn!(tool = %call.name, error = %e, "Tool execution failed");
                        format!("Error: {e}")
                    }
                }
            };
            context.push(Message::tool_result(call.id.clone(), output));
        }
        Ok(())
    }

    /// Pages to store the grown context under: those left by aborted rounds
    /// followed by the round's own. All of them join the conversation's pages.
    fn settle_pages(
        carry: &mut PageCarry,
        round_pages: Vec<PageHandle>,
        pages: &mut Vec<PageHandle>,
    ) -> Vec<PageHandle> {
        let mut settled = carry.take_aborted();
        settled.extend(round_pages);
        pages.extend(settled.iter().cloned());
        settled
    }

    async fn persist(&self, pages: &[PageHandle], context: &[Message]) {
        let Some((store, user_id)) = &self.history else {
            return;
        };
        for page in pages {
            let key = history_key(user_id, &page.message_id);
            if let Err(e) = store.put(&key, context.to_vec()).await {
                warn!(key = %key, error = %e, "Failed to store conversation history");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{EchoArgsTool, RecordingSurface, ScriptedProvider, fragment, text_delta};
    use streamgram_core::error::ProviderError;
    use streamgram_core::message::{Role, unpaired_tool_results};
    use streamgram_core::provider::ContentDelta;
    use streamgram_memory::InMemoryHistory;
    use streamgram_tools::CurrentTimeTool;

    fn registry() -> Arc<ToolRegistry> {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(CurrentTimeTool));
        registry.register(Box::new(EchoArgsTool));
        Arc::new(registry)
    }

    fn tool_round(id: &str, name: &str, args: &str) -> Vec<Result<ContentDelta, ProviderError>> {
        vec![
            Ok(ContentDelta::tool_calls(vec![fragment(0, Some(id), Some(name), "")])),
            Ok(ContentDelta::tool_calls(vec![fragment(0, None, None, args)])),
        ]
    }

    #[tokio::test]
    async fn simple_reply() {
        let provider = Arc::new(ScriptedProvider::new(vec![vec![Ok(text_delta("Hi there!"))]]));
        let surface = Arc::new(RecordingSurface::new());
        let conversation = ConversationLoop::new(provider.clone(), surface.clone(), "mock-model");

        let mut context = vec![Message::user("Hello")];
        let outcome = conversation
            .run(&ThreadTarget::new("chat"), &mut context)
            .await
            .unwrap();

        assert_eq!(outcome.reply_text, "Hi there!");
        assert_eq!(outcome.attempts, 1);
        assert_eq!(context.len(), 2);
        assert_eq!(context[1].role, Role::Assistant);
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn tool_call_round_then_answer() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            tool_round("call_time", "get_current_time", "{}"),
            vec![Ok(text_delta("It is noon."))],
        ]));
        let surface = Arc::new(RecordingSurface::new());
        let conversation = ConversationLoop::new(provider.clone(), surface.clone(), "mock-model")
            .with_tools(registry(), true);

        let mut context = vec![Message::user("What time is it?")];
        let outcome = conversation
            .run(&ThreadTarget::new("chat"), &mut context)
            .await
            .unwrap();

        assert_eq!(outcome.reply_text, "It is noon.");
        assert_eq!(outcome.attempts, 2);

        // user, assistant(tool_calls), tool, assistant
        assert_eq!(context.len(), 4);
        assert_eq!(context[1].tool_calls[0].id, "call_time");
        assert_eq!(context[2].role, Role::Tool);
        assert_eq!(context[2].tool_call_id.as_deref(), Some("call_time"));
        assert!(context[2].content.starts_with("The current time is "));
        assert!(unpaired_tool_results(&context).is_empty());

        // The second round saw exactly one tool message for the call.
        let requests = provider.requests();
        let tool_msgs: Vec<_> = requests[1]
            .messages
            .iter()
            .filter(|m| m.role == Role::Tool)
            .collect();
        assert_eq!(tool_msgs.len(), 1);
        assert_eq!(requests[0].tools.len(), 2);

        // The tool-only round left its placeholder for the answer round.
        assert_eq!(surface.create_count(), 1);
    }

    #[tokio::test]
    async fn tools_not_sent_when_disabled() {
        let provider = Arc::new(ScriptedProvider::new(vec![vec![Ok(text_delta("ok"))]]));
        let surface = Arc::new(RecordingSurface::new());
        let conversation = ConversationLoop::new(provider.clone(), surface, "mock-model")
            .with_tools(registry(), false);

        let mut context = vec![Message::user("hi")];
        conversation.run(&ThreadTarget::new("chat"), &mut context).await.unwrap();
        assert!(provider.requests()[0].tools.is_empty());
    }

    #[tokio::test]
    async fn invalid_arguments_become_diagnostic_result() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            tool_round("call_1", "echo_args", "{\"text\": \"trunc"),
            vec![Ok(text_delta("Sorry about that."))],
        ]));
        let surface = Arc::new(RecordingSurface::new());
        let conversation = ConversationLoop::new(provider, surface, "mock-model")
            .with_tools(registry(), true);

        let mut context = vec![Message::user("echo please")];
        conversation.run(&ThreadTarget::new("chat"), &mut context).await.unwrap();

        let tool_msg = &context[2];
        assert_eq!(tool_msg.role, Role::Tool);
        assert_eq!(tool_msg.tool_call_id.as_deref(), Some("call_1"));
        assert!(tool_msg.content.starts_with("Error: invalid arguments"));
    }

    #[tokio::test]
    async fn unknown_tool_is_answered_with_diagnostic() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            tool_round("call_x", "launch_rockets", "{}"),
            vec![Ok(text_delta("I can't do that."))],
        ]));
        let surface = Arc::new(RecordingSurface::new());
        let conversation = ConversationLoop::new(provider, surface, "mock-model")
            .with_tools(registry(), true);

        let mut context = vec![Message::user("launch")];
        let outcome = conversation.run(&ThreadTarget::new("chat"), &mut context).await.unwrap();
        assert_eq!(outcome.reply_text, "I can't do that.");
        assert!(context[2].content.contains("unknown tool"));
        assert!(unpaired_tool_results(&context).is_empty());
    }

    #[tokio::test]
    async fn blank_replies_exhaust_attempts() {
        let rounds = (0..3).map(|_| vec![Ok(text_delta("  \n"))]).collect();
        let provider = Arc::new(ScriptedProvider::new(rounds));
        let surface = Arc::new(RecordingSurface::new());
        let conversation = ConversationLoop::new(provider.clone(), surface.clone(), "mock-model")
            .with_max_attempts(3);

        let mut context = vec![Message::user("hi")];
        let err = conversation
            .run(&ThreadTarget::new("chat"), &mut context)
            .await
            .unwrap_err();

        assert!(matches!(err, AgentError::AttemptsExhausted { attempts: 3, .. }));
        assert_eq!(provider.call_count(), 3);
        // No blank assistant turns were appended.
        assert_eq!(context.len(), 1);
        // One placeholder, reused for every attempt.
        assert_eq!(surface.create_count(), 1);
    }

    #[tokio::test]
    async fn transport_error_is_retried() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            vec![Ok(text_delta("partial")), Err(ProviderError::Network("reset".into()))],
            vec![Ok(text_delta("Complete answer"))],
        ]));
        let surface = Arc::new(RecordingSurface::new());
        let conversation = ConversationLoop::new(provider.clone(), surface, "mock-model");

        let mut context = vec![Message::user("hi")];
        let outcome = conversation.run(&ThreadTarget::new("chat"), &mut context).await.unwrap();
        assert_eq!(outcome.reply_text, "Complete answer");
        assert_eq!(outcome.attempts, 2);
        assert_eq!(context.len(), 2);
    }

    #[tokio::test]
    async fn aborted_round_pages_are_reused_and_stored() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            vec![
                Ok(text_delta(&"word ".repeat(30))),
                Err(ProviderError::Network("reset".into())),
            ],
            vec![Ok(text_delta("Complete answer"))],
        ]));
        let surface = Arc::new(RecordingSurface::new());
        let history = Arc::new(InMemoryHistory::new());
        let conversation = ConversationLoop::new(provider, surface.clone(), "mock-model")
            .with_render_settings(RenderSettings {
                page_capacity: 50,
                flush_threshold: 1,
                ..RenderSettings::default()
            })
            .with_history(history.clone(), "42");

        let mut context = vec![Message::user("hi")];
        let outcome = conversation.run(&ThreadTarget::new("chat"), &mut context).await.unwrap();

        // The retry continued on the last partial page instead of opening a new one.
        assert_eq!(surface.create_count(), 3);
        let ids: Vec<&str> = outcome.pages.iter().map(|p| p.message_id.as_str()).collect();
        assert_eq!(ids, vec!["100", "101", "102"]);
        assert_eq!(surface.page_texts()["102"], "Complete answer");

        for page in &outcome.pages {
            let stored = history
                .get(&history_key("42", &page.message_id))
                .await
                .unwrap()
                .unwrap();
            assert_eq!(stored.len(), 2);
            assert_eq!(stored[1].content, "Complete answer");
        }
    }

    #[tokio::test]
    async fn authentication_failure_is_not_retried() {
        let provider = Arc::new(ScriptedProvider::failing_open(ProviderError::AuthenticationFailed(
            "bad key".into(),
        )));
        let surface = Arc::new(RecordingSurface::new());
        let conversation = ConversationLoop::new(provider.clone(), surface, "mock-model");

        let mut context = vec![Message::user("hi")];
        let err = conversation.run(&ThreadTarget::new("chat"), &mut context).await.unwrap_err();
        assert!(matches!(err, AgentError::Provider(ProviderError::AuthenticationFailed(_))));
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn context_is_stored_under_every_page() {
        let long_answer = "word ".repeat(30);
        let provider = Arc::new(ScriptedProvider::new(vec![
            tool_round("call_time", "get_current_time", "{}"),
            vec![Ok(text_delta(&long_answer))],
        ]));
        let surface = Arc::new(RecordingSurface::new());
        let history = Arc::new(InMemoryHistory::new());
        let conversation = ConversationLoop::new(provider, surface, "mock-model")
            .with_tools(registry(), true)
            .with_render_settings(RenderSettings {
                page_capacity: 50,
                ..RenderSettings::default()
            })
            .with_history(history.clone(), "42");

        let mut context = vec![Message::user("hi")];
        let outcome = conversation.run(&ThreadTarget::new("chat"), &mut context).await.unwrap();
        assert!(outcome.pages.len() >= 3);

        for page in &outcome.pages {
            let stored = history
                .get(&history_key("42", &page.message_id))
                .await
                .unwrap()
                .unwrap();
            assert_eq!(stored.len(), 4);
            assert_eq!(stored.last().unwrap().content, long_answer);
        }
    }

    #[tokio::test]
    async fn cancellation_stops_the_loop() {
        let provider = Arc::new(ScriptedProvider::new(vec![vec![Ok(text_delta("hi"))]]));
        let surface = Arc::new(RecordingSurface::new());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let conversation = ConversationLoop::new(provider, surface, "mock-model").with_cancellation(cancel);

        let mut context = vec![Message::user("hi")];
        let err = conversation.run(&ThreadTarget::new("chat"), &mut context).await.unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(context.len(), 1);
    }
}
