//! Console display surface: renders pages to a terminal.
//!
//! Used by `streamgram chat`. Each edit prints only the text appended since
//! the previous edit of the same page, so a streamed reply reads naturally.
//! Markup is stripped before printing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::io::Write;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use streamgram_core::channel::{DisplaySurface, MarkupMode, PageHandle, ThreadTarget};
use streamgram_core::error::ChannelError;

/// Terminal surface writing to stdout (or any writer).
pub struct ConsoleDisplay<W: Write + Send = std::io::Stdout> {
    out: Mutex<W>,
    shown: Mutex<HashMap<String, String>>,
    next_id: AtomicU64,
}

impl ConsoleDisplay<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::with_writer(std::io::stdout())
    }
}

impl<W: Write + Send> ConsoleDisplay<W> {
    pub fn with_writer(out: W) -> Self {
        Self {
            out: Mutex::new(out),
            shown: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Consume the surface and return the writer.
    pub fn into_writer(self) -> W {
        match self.out.into_inner() {
            Ok(w) => w,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self, text: &str) -> Result<(), ChannelError> {
        let mut out = self
            .out
            .lock()
            .map_err(|_| ChannelError::ConnectionLost("console writer poisoned".into()))?;
        out.write_all(text.as_bytes())
            .and_then(|_| out.flush())
            .map_err(|e| ChannelError::ConnectionLost(e.to_string()))
    }

    /// Print the part of `text` not yet shown for `key`.
    fn show(&self, key: &str, text: String) -> Result<(), ChannelError> {
        let mut shown = self
            .shown
            .lock()
            .map_err(|_| ChannelError::ConnectionLost("console state poisoned".into()))?;
        let previous = shown.entry(key.to_string()).or_default();

        let output = if previous.is_empty() {
            text.clone()
        } else if let Some(suffix) = text.strip_prefix(previous.as_str()) {
            suffix.to_string()
        } else {
            format!("\n{text}")
        };
        *previous = text;
        drop(shown);

        if output.is_empty() {
            return Ok(());
        }
        self.write(&output)
    }
}

/// Strip restricted-HTML tags and decode the entities the sanitizer emits.
pub fn to_plain(text: &str, mode: MarkupMode) -> String {
    if mode == MarkupMode::Plain {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len());
    let mut in_tag = false;
    for c in text.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

#[async_trait]
impl<W: Write + Send> DisplaySurface for ConsoleDisplay<W> {
    fn name(&self) -> &str {
        "console"
    }

    async fn create(
        &self,
        target: &ThreadTarget,
        text: &str,
        mode: MarkupMode,
    ) -> Result<PageHandle, ChannelError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let handle = PageHandle {
            chat_id: target.chat_id.clone(),
            message_id: id.to_string(),
        };
        if id > 1 {
            self.write("\n")?;
        }
        self.show(&handle.message_id, to_plain(text, mode))?;
        Ok(handle)
    }

    async fn edit(&self, handle: &PageHandle, text: &str, mode: MarkupMode) -> Result<(), ChannelError> {
        self.show(&handle.message_id, to_plain(text, mode))
    }
}
