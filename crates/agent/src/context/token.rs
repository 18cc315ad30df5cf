//! Token estimation utilities.
//!
//! Uses a character-based heuristic: ~4 bytes per token, rounded up. It
//! over-counts for most BPE tokenizers on English text, which keeps the
//! budget check on the safe side.

use netintent_core::message::Message;

/// Estimate the token count for a string.
///
/// Heuristic: 1 token ≈ 4 bytes. Rounds up.
pub fn estimate_tokens(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }
    text.len().div_ceil(4)
}

/// Estimate tokens for a single stored message. Only the content counts.
pub fn estimate_message_tokens(message: &Message) -> usize {
    estimate_tokens(&message.content)
}

/// Estimate tokens for a slice of messages.
pub fn estimate_messages_tokens(messages: &[Message]) -> usize {
    messages.iter().map(estimate_message_tokens).sum()
}
