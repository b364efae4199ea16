//! Tool-call accumulator.
//!
//! Merges streamed [`ToolCallFragment`]s into complete [`ToolCall`]s. Entries
//! are keyed by the stream-assigned index, so fragments of different calls
//! may interleave freely.

use std::collections::{BTreeMap, BTreeSet};
use streamgram_core::message::ToolCall;
use streamgram_core::provider::ToolCallFragment;
use tracing::warn;

#[derive(Debug)]
struct Builder {
    id: String,
    name: String,
    arguments: String,
}

/// Collects tool-call fragments for one completion round.
#[derive(Debug, Default)]
pub struct ToolCallAccumulator {
    entries: BTreeMap<u32, Builder>,
    /// Indices whose first fragment lacked an id or name.
    rejected: BTreeSet<u32>,
}

impl ToolCallAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge one fragment.
    pub fn absorb(&mut self, fragment: ToolCallFragment) {
        if self.rejected.contains(&fragment.index) {
            return;
        }

        if let Some(entry) = self.entries.get_mut(&fragment.index) {
            if let Some(chunk) = fragment.arguments {
                entry.arguments.push_str(&chunk);
            }
            return;
        }

        match (fragment.id, fragment.name) {
            (Some(id), Some(name)) if !id.is_empty() && !name.is_empty() => {
                self.entries.insert(
                    fragment.index,
                    Builder {
                        id,
                        name,
                        arguments: fragment.arguments.unwrap_or_default(),
                    },
                );
            }
            (id, name) => {
                warn!(
                    index = fragment.index,
                    id = ?id,
                    name = ?name,
                    "First tool call fragment lacks id or name, skipping this call"
                );
                self.rejected.insert(fragment.index);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Complete calls in ascending index order.
    pub fn finalize(self) -> Vec<ToolCall> {
        self.entries
            .into_values()
            .map(|b| ToolCall {
                id: b.id,
                name: b.name,
                arguments: b.arguments,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn first(index: u32, id: &str, name: &str, args: Option<&str>) -> ToolCallFragment {
        ToolCallFragment {
            index,
            id: Some(id.into()),
            name: Some(name.into()),
            arguments: args.map(String::from),
        }
    }

    fn chunk(index: u32, args: &str) -> ToolCallFragment {
        ToolCallFragment {
            index,
            id: None,
            name: None,
            arguments: Some(args.into()),
        }
    }

    #[test]
    fn concatenates_chunks_in_arrival_order() {
        let mut acc = ToolCallAccumulator::new();
        acc.absorb(first(0, "call_1", "get_web_content", Some("")));
        acc.absorb(chunk(0, "{\"ur"));
        acc.absorb(chunk(0, "l\": \"https://exa"));
        acc.absorb(chunk(0, "mple.com\"}"));

        let calls = acc.finalize();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].id, "call_1");
        assert_eq!(calls[0].arguments, r#"{"url": "https://example.com"}"#);
    }

    #[test]
    fn interleaved_indices_stay_separate() {
        let mut acc = ToolCallAccumulator::new();
        acc.absorb(first(1, "call_b", "get_web_content", None));
        acc.absorb(first(0, "call_a", "get_current_time", None));
        acc.absorb(chunk(1, "{\"url\":"));
        acc.absorb(chunk(0, "{}"));
        acc.absorb(chunk(1, "\"x\"}"));

        let calls = acc.finalize();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].id, "call_a");
        assert_eq!(calls[0].arguments, "{}");
        assert_eq!(calls[1].id, "call_b");
        assert_eq!(calls[1].arguments, r#"{"url":"x"}"#);
    }

    #[test]
    fn missing_arguments_chunk_counts_as_empty() {
        let mut acc = ToolCallAccumulator::new();
        acc.absorb(first(0, "call_1", "get_current_time", None));
        acc.absorb(ToolCallFragment {
            index: 0,
            ..ToolCallFragment::default()
        });
        assert_eq!(acc.finalize()[0].arguments, "");
    }

    #[test]
    fn later_id_and_name_fields_are_ignored() {
        let mut acc = ToolCallAccumulator::new();
        acc.absorb(first(0, "call_1", "get_current_time", Some("{")));
        acc.absorb(first(0, "call_other", "other", Some("}")));
        let calls = acc.finalize();
        assert_eq!(calls[0].id, "call_1");
        assert_eq!(calls[0].name, "get_current_time");
        assert_eq!(calls[0].arguments, "{}");
    }

    #[test]
    fn headless_first_fragment_is_skipped_for_whole_call() {
        let mut acc = ToolCallAccumulator::new();
        acc.absorb(chunk(3, "{\"a\":"));
        acc.absorb(first(3, "call_late", "get_current_time", Some("1}")));
        acc.absorb(first(4, "call_ok", "get_current_time", None));

        let calls = acc.finalize();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].id, "call_ok");
    }

    #[test]
    fn empty_accumulator() {
        let acc = ToolCallAccumulator::new();
        assert!(acc.is_empty());
        assert!(acc.finalize().is_empty());
    }
}
