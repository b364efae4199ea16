//! Streaming renderer: shows a growing reply as a series of edited pages.
//!
//! The renderer owns the reply buffer of one round and the pages showing it.
//! Text is buffered on every delta and only pushed to the surface once
//! `flush_threshold` unsent characters have piled up, or when the round
//! forces a final flush. A page that outgrows `page_capacity` is cut at a
//! safe boundary and the rest continues on a fresh page.

use std::future::Future;
use streamgram_config::RenderConfig;
use streamgram_core::channel::{DisplaySurface, MarkupMode, PageHandle, ThreadTarget};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::AgentError;
use crate::markup::{Sanitized, sanitize_detailed};
use crate::pagination::{char_len, find_cut};

/// Text of a page that has been created but not filled yet.
pub const PLACEHOLDER: &str = "...";

/// Paging and flushing knobs.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderSettings {
    /// Maximum characters of reply text per page.
    pub page_capacity: usize,
    /// Minimum unsent characters before an intermediate flush.
    pub flush_threshold: usize,
    /// Characters a page may be cut after.
    pub cut_chars: Vec<char>,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            page_capacity: 2000,
            flush_threshold: 200,
            cut_chars: vec!['\n', ' ', '\t'],
        }
    }
}

impl From<&RenderConfig> for RenderSettings {
    fn from(config: &RenderConfig) -> Self {
        Self {
            page_capacity: config.page_capacity,
            flush_threshold: config.flush_threshold,
            cut_chars: config.cut_chars.chars().collect(),
        }
    }
}

/// Await `fut` unless `cancel` fires first.
pub(crate) async fn until_cancelled<F: Future>(
    cancel: &CancellationToken,
    fut: F,
) -> Result<F::Output, AgentError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(AgentError::Cancelled),
        out = fut => Ok(out),
    }
}

#[derive(Debug)]
struct Page {
    /// Assigned by the first successful display call.
    handle: Option<PageHandle>,
    /// Where this page's text begins in the buffer.
    start: usize,
    /// End of the text last shown successfully on this page.
    flushed_end: usize,
    /// End of the text last sent to the surface, shown or not.
    attempted_end: usize,
    /// Opening tags re-established from the previous page.
    carry: String,
    /// Whether any reply text has been shown on this page.
    shown: bool,
}

impl Page {
    fn new(start: usize, handle: Option<PageHandle>, carry: String) -> Self {
        Self {
            handle,
            start,
            flushed_end: start,
            attempted_end: start,
            carry,
            shown: false,
        }
    }
}

/// What a finished renderer leaves behind.
#[derive(Debug, Clone, Default)]
pub struct RenderOutcome {
    /// The full reply text of the round.
    pub text: String,
    /// Every page that shows part of the reply, in order.
    pub pages: Vec<PageHandle>,
    /// A placeholder page that never received text, free for reuse.
    pub idle_page: Option<PageHandle>,
}

pub struct StreamingRenderer<'a> {
    surface: &'a dyn DisplaySurface,
    target: &'a ThreadTarget,
    settings: &'a RenderSettings,
    cancel: &'a CancellationToken,
    buffer: String,
    current: Page,
    finished: Vec<Page>,
}

impl<'a> StreamingRenderer<'a> {
    /// Start a renderer whose first page is `placeholder`, or a freshly
    /// created placeholder page when none is given.
    pub async fn start(
        surface: &'a dyn DisplaySurface,
        target: &'a ThreadTarget,
        settings: &'a RenderSettings,
        cancel: &'a CancellationToken,
        placeholder: Option<PageHandle>,
    ) -> Result<Self, AgentError> {
        let handle = match placeholder {
            Some(handle) => Some(handle),
            None => {
                match until_cancelled(cancel, surface.create(target, PLACEHOLDER, MarkupMode::Plain))
                    .await?
                {
                    Ok(handle) => Some(handle),
                    Err(e) => {
                        // The first flush will create the page instead.
                        warn!(chat_id = %target.chat_id, error = %e, "Failed to create placeholder page");
                        None
                    }
                }
            }
        };

        Ok(Self {
            surface,
            target,
            settings,
            cancel,
            buffer: String::new(),
            current: Page::new(0, handle, String::new()),
            finished: Vec::new(),
        })
    }

    /// Append streamed text. Nothing is displayed yet.
    pub fn on_text_delta(&mut self, text: &str) {
        self.buffer.push_str(text);
    }

    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    /// Characters buffered on the current page but not yet shown.
    pub fn unsent_chars(&self) -> usize {
        char_len(&self.buffer, self.current.flushed_end, self.buffer.len())
    }

    /// Flush once enough text has accumulated since the last display
    /// attempt. A failed attempt still counts, so an unavailable surface is
    /// not retried on every delta.
    pub async fn maybe_flush(&mut self) -> Result<(), AgentError> {
        let since = self.current.attempted_end.max(self.current.flushed_end);
        if char_len(&self.buffer, since, self.buffer.len()) < self.settings.flush_threshold {
            return Ok(());
        }
        self.flush().await
    }

    /// Show everything buffered, rolling over to new pages as needed.
    pub async fn flush(&mut self) -> Result<(), AgentError> {
        loop {
            let start = self.current.start;
            if self.buffer.len() == self.current.flushed_end || self.buffer[start..].trim().is_empty() {
                return Ok(());
            }

            let capacity = self.settings.page_capacity.max(1);
            if char_len(&self.buffer, start, self.buffer.len()) <= capacity {
                let end = self.buffer.len();
                self.show(start, end).await?;
                return Ok(());
            }

            let cut = find_cut(&self.buffer, start, capacity, &self.settings.cut_chars);
            let shown = self.show(start, cut).await?;
            debug!(
                chat_id = %self.target.chat_id,
                page = self.finished.len(),
                len = char_len(&self.buffer, start, cut),
                "Page full, rolling over"
            );
            let next = Page::new(cut, None, shown.reopen_prefix());
            let full = std::mem::replace(&mut self.current, next);
            self.finished.push(full);
        }
    }

    /// Display `buffer[start..end]` on the current page.
    ///
    /// Markup is tried first; a rejected call is retried once as plain text.
    /// Failures never abort the round, they only leave `flushed_end` behind.
    async fn show(&mut self, start: usize, end: usize) -> Result<Sanitized, AgentError> {
        let raw = self.buffer[start..end].to_string();
        let sanitized = sanitize_detailed(&format!("{}{}", self.current.carry, raw));
        self.current.attempted_end = end;

        let mut delivered = self.display(&sanitized.text, MarkupMode::Html).await?;
        if !delivered {
            delivered = self.display(&raw, MarkupMode::Plain).await?;
        }

        if delivered {
            self.current.flushed_end = end;
            self.current.shown = true;
        } else {
            warn!(
                chat_id = %self.target.chat_id,
                len = raw.len(),
                "Dropping page update after plain-text retry failed"
            );
        }
        Ok(sanitized)
    }

    /// One create-or-edit call. Returns whether it succeeded.
    async fn display(&mut self, text: &str, mode: MarkupMode) -> Result<bool, AgentError> {
        let result = match &self.current.handle {
            Some(handle) => until_cancelled(self.cancel, self.surface.edit(handle, text, mode))
                .await?
                .map(|()| None),
            None => until_cancelled(self.cancel, self.surface.create(self.target, text, mode))
                .await?
                .map(Some),
        };

        match result {
            Ok(Some(handle)) => {
                debug!(page = %handle, "Page created");
                self.current.handle = Some(handle);
                Ok(true)
            }
            Ok(None) => Ok(true),
            Err(e) => {
                warn!(
                    surface = self.surface.name(),
                    mode = ?mode,
                    error = %e,
                    "Display call failed"
                );
                Ok(false)
            }
        }
    }

    /// Finish the round, returning the reply text and page handles.
    pub fn finish(self) -> RenderOutcome {
        let idle_page = if self.current.shown {
            None
        } else if self.finished.is_empty() {
            self.current.handle.clone()
        } else {
            None
        };

        let pages = self
            .finished
            .into_iter()
            .chain(std::iter::once(self.current).filter(|p| p.shown))
            .filter_map(|p| p.handle)
            .collect();

        RenderOutcome {
            text: self.buffer,
            pages,
            idle_page,
        }
    }
}
