//! Completion round driver.
//!
//! One round opens a streamed completion and routes every delta: tool-call
//! fragments go to the accumulator, text goes to the renderer. Once the
//! stream closes the accumulator is finalized and the renderer flushed.

use streamgram_core::channel::{DisplaySurface, PageHandle, ThreadTarget};
use streamgram_core::message::ToolCall;
use streamgram_core::provider::{Provider, ProviderRequest};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::error::AgentError;
use crate::renderer::{RenderSettings, StreamingRenderer, until_cancelled};
use crate::tool_calls::ToolCallAccumulator;

/// Result of one completed round.
#[derive(Debug, Clone)]
pub struct RoundOutput {
    pub reply_text: String,
    pub tool_calls: Vec<ToolCall>,
    pub pages: Vec<PageHandle>,
}

/// Pages handed from one round to the next within a conversation.
#[derive(Debug, Clone, Default)]
pub struct PageCarry {
    /// The page the next round starts on: an idle placeholder, or the last
    /// page of an aborted round whose partial text the retry overwrites.
    pub next: Option<PageHandle>,
    /// Earlier pages of aborted rounds, still showing partial text.
    pub aborted: Vec<PageHandle>,
}

impl PageCarry {
    /// Take the aborted pages, leaving none behind.
    pub fn take_aborted(&mut self) -> Vec<PageHandle> {
        std::mem::take(&mut self.aborted)
    }
}

pub struct RoundDriver<'a> {
    provider: &'a dyn Provider,
    surface: &'a dyn DisplaySurface,
    settings: &'a RenderSettings,
    cancel: &'a CancellationToken,
}

impl<'a> RoundDriver<'a> {
    pub fn new(
        provider: &'a dyn Provider,
        surface: &'a dyn DisplaySurface,
        settings: &'a RenderSettings,
        cancel: &'a CancellationToken,
    ) -> Self {
        Self {
            provider,
            surface,
            settings,
            cancel,
        }
    }

    /// Run one round against `target`.
    ///
    /// The round starts on `carry.next` and puts back whatever page is still
    /// idle when it ends. When the round fails after showing text, its last
    /// page becomes `carry.next` and the pages before it go to
    /// `carry.aborted`.
    pub async fn run(
        &self,
        request: ProviderRequest,
        target: &ThreadTarget,
        carry: &mut PageCarry,
    ) -> Result<RoundOutput, AgentError> {
        let mut renderer =
            StreamingRenderer::start(self.surface, target, self.settings, self.cancel, carry.next.take())
                .await?;

        let result = self.consume(request, &mut renderer).await;
        let rendered = renderer.finish();

        let tool_calls = match result {
            Ok(tool_calls) => {
                carry.next = rendered.idle_page;
                tool_calls
            }
            Err(e) => {
                let mut shown = rendered.pages;
                carry.next = shown.pop().or(rendered.idle_page);
                carry.aborted.extend(shown);
                return Err(e);
            }
        };
        debug!(
            chat_id = %target.chat_id,
            len = rendered.text.len(),
            tool_calls = tool_calls.len(),
            pages = rendered.pages.len(),
            "Round finished"
        );

        Ok(RoundOutput {
            reply_text: rendered.text,
            tool_calls,
            pages: rendered.pages,
        })
    }

    async fn consume(
        &self,
        request: ProviderRequest,
        renderer: &mut StreamingRenderer<'_>,
    ) -> Result<Vec<ToolCall>, AgentError> {
        let mut rx = until_cancelled(self.cancel, self.provider.stream(request)).await??;
        let mut accumulator = ToolCallAccumulator::new();

        while let Some(item) = until_cancelled(self.cancel, rx.recv()).await? {
            let delta = item?;
            trace!(
                text_len = delta.text.as_ref().map_or(0, |t| t.len()),
                fragments = delta.tool_calls.len(),
                "Delta received"
            );

            for fragment in delta.tool_calls {
                accumulator.absorb(fragment);
            }

            if let Some(text) = delta.text.filter(|t| !t.is_empty()) {
                renderer.on_text_delta(&text);
                renderer.maybe_flush().await?;
            }
        }

        let tool_calls = accumulator.finalize();
        renderer.flush().await?;
        Ok(tool_calls)
    }
}
