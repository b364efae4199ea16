//! Completion provider implementations for streamgram.
//!
//! All providers implement the `streamgram_core::Provider` trait and are
//! built per conversation through a `ProviderFactory`.

pub mod openai_compat;

pub use openai_compat::{OpenAiCompatFactory, OpenAiCompatProvider};
