//! Token counting with a fixed BPE encoding.
//!
//! Uses tiktoken's `cl100k_base` encoding so counts line up with what
//! GPT-4-class and Claude-class models bill for. The encoder is built once
//! (construction is expensive) and shared behind the app state.

use crate::message::PromptMessage;
use anyhow::Result;
use tiktoken_rs::CoreBPE;

/// Structural overhead per message in OpenAI-compatible chat format.
///
/// Covers the role tag and framing tokens around each message.
pub const MESSAGE_OVERHEAD_TOKENS: usize = 4;

/// Deterministic token counter over `cl100k_base`.
pub struct TokenCounter {
    bpe: CoreBPE,
}

impl TokenCounter {
    /// Build the counter. Constructing the BPE tables takes noticeable time;
    /// do this once at startup.
    pub fn new() -> Result<Self> {
        Ok(Self {
            bpe: tiktoken_rs::cl100k_base()?,
        })
    }

    /// Count tokens in a text string. Empty text costs 0.
    pub fn count_tokens(&self, text: &str) -> usize {
        if text.is_empty() {
            return 0;
        }
        self.bpe.encode_ordinary(text).len()
    }

    /// Count total tokens in a message list, including the per-message
    /// structural overhead. A message with empty content contributes only
    /// the overhead.
    pub fn count_messages(&self, messages: &[PromptMessage]) -> usize {
        messages
            .iter()
            .map(|m| self.count_tokens(&m.content) + MESSAGE_OVERHEAD_TOKENS)
            .sum()
    }
}
