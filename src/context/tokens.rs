//! Provider-agnostic token estimation.
//!
//! Every budget in the crate is computed with these functions so separately
//! estimated quantities stay comparable. The ratio is a heuristic and is not
//! checked against any real tokenizer; the builder's safety margin absorbs
//! the drift.

use super::message::Message;

/// Characters assumed per token.
pub const CHARS_PER_TOKEN: usize = 4;

/// Estimate the tokens in `text`: characters divided by [`CHARS_PER_TOKEN`], rounded up.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(CHARS_PER_TOKEN)
}

/// Estimated cost of a message including the per-message formatting overhead.
pub fn message_tokens(message: &Message, overhead: usize) -> usize {
    estimate_tokens(&message.content) + overhead
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_text_is_free() {
        assert_eq!(estimate_tokens(""), 0);
    }

    #[test]
    fn test_rounds_up() {
        assert_eq!(estimate_tokens("a"), 1);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
        assert_eq!(estimate_tokens(&"x".repeat(4000)), 1000);
    }

    #[test]
    fn test_counts_characters_not_bytes() {
        // 4 characters, 8 bytes
        assert_eq!(estimate_tokens("éééé"), 1);
    }

    #[test]
    fn test_message_overhead() {
        let message = Message::user("x".repeat(64));
        assert_eq!(message_tokens(&message, 4), 20);
    }
}
