//! Token estimation utilities.
//!
//! Uses a character-based heuristic: ~4 characters per token. This
//! approximation is accurate within ~10% for BPE tokenizers on English
//! text, and keeps budget arithmetic deterministic.

/// Estimate the token count for a string.
///
/// Heuristic: 1 token ≈ 4 characters. Rounds up.
pub fn estimate_tokens(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }
    text.len().div_ceil(4)
}

/// Truncate text to a token budget on a whitespace boundary.
///
/// Returns the (possibly shortened) text and whether truncation happened.
pub fn truncate_to_tokens(text: &str, max_tokens: usize) -> (String, bool) {
    if estimate_tokens(text) <= max_tokens {
        return (text.to_string(), false);
    }
    let max_chars = max_tokens * 4;
    let mut cut = max_chars.min(text.len());
    while cut > 0 && !text.is_char_boundary(cut) {
        cut -= 1;
    }
    let truncated = match text[..cut].rfind(char::is_whitespace) {
        Some(boundary) if boundary > 0 => &text[..boundary],
        _ => &text[..cut],
    };
    (format!("{}…", truncated.trim_end()), true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_string_is_zero() {
        assert_eq!(estimate_tokens(""), 0);
    }

    #[test]
    fn four_chars_is_one_token() {
        assert_eq!(estimate_tokens("test"), 1);
    }

    #[test]
    fn five_chars_rounds_up() {
        assert_eq!(estimate_tokens("hello"), 2);
    }

    #[test]
    fn hundred_chars() {
        let text = "a".repeat(100);
        assert_eq!(estimate_tokens(&text), 25);
    }

    #[test]
    fn truncate_noop_when_under_budget() {
        let (text, truncated) = truncate_to_tokens("short text", 100);
        assert_eq!(text, "short text");
        assert!(!truncated);
    }

    #[test]
    fn truncate_cuts_on_word_boundary() {
        let text = "one two three four five six seven eight";
        let (cut, truncated) = truncate_to_tokens(text, 4);
        assert!(truncated);
        assert!(cut.len() <= 17 + 3); // 16 chars + ellipsis slack
        assert!(cut.ends_with('…'));
        assert!(!cut.contains("eight"));
    }

    #[test]
    fn truncated_output_within_budget() {
        let text = "word ".repeat(100);
        let (cut, truncated) = truncate_to_tokens(&text, 10);
        assert!(truncated);
        // ellipsis may add a token of slack
        assert!(estimate_tokens(&cut) <= 11);
    }
}
