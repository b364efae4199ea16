//! Shared test doubles for the agent crate.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use streamgram_core::channel::{DisplaySurface, MarkupMode, PageHandle, ThreadTarget};
use streamgram_core::error::{ChannelError, ProviderError, ToolError};
use streamgram_core::provider::{
    ClientSettings, ContentDelta, DeltaReceiver, Provider, ProviderFactory, ProviderRequest,
    ToolCallFragment,
};
use streamgram_core::tool::{Tool, ToolResult};

type Script = Vec<Result<ContentDelta, ProviderError>>;

/// A provider that replays one scripted stream per call.
///
/// Panics if more calls are made than scripts provided.
pub struct ScriptedProvider {
    scripts: Mutex<VecDeque<Script>>,
    open_error: Mutex<Option<ProviderError>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    pub fn new(scripts: Vec<Script>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
            open_error: Mutex::new(None),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// A provider whose every `stream()` call fails before any delta.
    pub fn failing_open(error: ProviderError) -> Self {
        let provider = Self::new(Vec::new());
        *provider.open_error.lock().unwrap() = Some(error);
        provider
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

fn clone_error(error: &ProviderError) -> ProviderError {
    match error {
        ProviderError::AuthenticationFailed(m) => ProviderError::AuthenticationFailed(m.clone()),
        ProviderError::NotConfigured(m) => ProviderError::NotConfigured(m.clone()),
        ProviderError::Network(m) => ProviderError::Network(m.clone()),
        other => ProviderError::Network(other.to_string()),
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn stream(&self, request: ProviderRequest) -> Result<DeltaReceiver, ProviderError> {
        self.requests.lock().unwrap().push(request);

        if let Some(error) = self.open_error.lock().unwrap().as_ref() {
            return Err(clone_error(error));
        }

        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| panic!("ScriptedProvider: no more scripts (call #{})", self.call_count()));

        let (tx, rx) = tokio::sync::mpsc::channel(script.len().max(1));
        for item in script {
            tx.try_send(item).unwrap();
        }
        Ok(rx)
    }
}

/// A factory handing out one shared provider to senders with an API key.
pub struct StaticFactory {
    provider: Arc<dyn Provider>,
}

impl StaticFactory {
    pub fn new(provider: Arc<dyn Provider>) -> Self {
        Self { provider }
    }
}

impl ProviderFactory for StaticFactory {
    fn build(&self, settings: &ClientSettings) -> Result<Arc<dyn Provider>, ProviderError> {
        match settings.api_key.as_deref() {
            Some(key) if !key.is_empty() => Ok(self.provider.clone()),
            _ => Err(ProviderError::NotConfigured("no API key set".into())),
        }
    }

    fn default_model(&self) -> &str {
        "mock-model"
    }
}

#[derive(Debug, Clone)]
pub enum SurfaceCall {
    Create {
        target: ThreadTarget,
        text: String,
        mode: MarkupMode,
        handle: PageHandle,
    },
    Edit {
        handle: PageHandle,
        text: String,
        mode: MarkupMode,
    },
}

/// A display surface that records every successful call.
pub struct RecordingSurface {
    calls: Mutex<Vec<SurfaceCall>>,
    attempts: AtomicUsize,
    next_id: AtomicU64,
    reject_html: bool,
    failing: AtomicBool,
}

impl RecordingSurface {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            attempts: AtomicUsize::new(0),
            next_id: AtomicU64::new(100),
            reject_html: false,
            failing: AtomicBool::new(false),
        }
    }

    /// Reject every call made in `MarkupMode::Html`.
    pub fn rejecting_html(mut self) -> Self {
        self.reject_html = true;
        self
    }

    /// Make every call fail until switched back.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<SurfaceCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn last_text(&self) -> Option<String> {
        self.calls.lock().unwrap().last().map(|call| match call {
            SurfaceCall::Create { text, .. } | SurfaceCall::Edit { text, .. } => text.clone(),
        })
    }

    /// The latest text of every message, by message id.
    pub fn page_texts(&self) -> HashMap<String, String> {
        let mut pages = HashMap::new();
        for call in self.calls.lock().unwrap().iter() {
            let (handle, text) = match call {
                SurfaceCall::Create { handle, text, .. } | SurfaceCall::Edit { handle, text, .. } => {
                    (handle, text)
                }
            };
            pages.insert(handle.message_id.clone(), text.clone());
        }
        pages
    }

    /// Every create or edit call made, failed ones included.
    pub fn attempt_count(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn create_count(&self) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| matches!(c, SurfaceCall::Create { .. }))
            .count()
    }

    pub fn edit_count(&self) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| matches!(c, SurfaceCall::Edit { .. }))
            .count()
    }

    fn check(&self, mode: MarkupMode) -> Result<(), ChannelError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(ChannelError::Rejected {
                channel: "recording".into(),
                description: "surface unavailable".into(),
            });
        }
        if self.reject_html && mode == MarkupMode::Html {
            return Err(ChannelError::Rejected {
                channel: "recording".into(),
                description: "can't parse entities".into(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl DisplaySurface for RecordingSurface {
    fn name(&self) -> &str {
        "recording"
    }

    async fn create(
        &self,
        target: &ThreadTarget,
        text: &str,
        mode: MarkupMode,
    ) -> Result<PageHandle, ChannelError> {
        self.check(mode)?;
        let handle = PageHandle {
            chat_id: target.chat_id.clone(),
            message_id: self.next_id.fetch_add(1, Ordering::SeqCst).to_string(),
        };
        self.calls.lock().unwrap().push(SurfaceCall::Create {
            target: target.clone(),
            text: text.to_string(),
            mode,
            handle: handle.clone(),
        });
        Ok(handle)
    }

    async fn edit(&self, handle: &PageHandle, text: &str, mode: MarkupMode) -> Result<(), ChannelError> {
        self.check(mode)?;
        self.calls.lock().unwrap().push(SurfaceCall::Edit {
            handle: handle.clone(),
            text: text.to_string(),
            mode,
        });
        Ok(())
    }
}

/// Echoes its required `text` argument.
pub struct EchoArgsTool;

#[async_trait]
impl Tool for EchoArgsTool {
    fn name(&self) -> &str {
        "echo_args"
    }

    fn description(&self) -> &str {
        "Echoes back the given text"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": { "text": { "type": "string" } },
            "required": ["text"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let text = arguments["text"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("missing 'text'".into()))?;
        Ok(ToolResult::ok(text))
    }
}

pub fn text_delta(text: &str) -> ContentDelta {
    ContentDelta::text(text)
}

pub fn fragment(index: u32, id: Option<&str>, name: Option<&str>, arguments: &str) -> ToolCallFragment {
    ToolCallFragment {
        index,
        id: id.map(String::from),
        name: name.map(String::from),
        arguments: Some(arguments.to_string()),
    }
}
