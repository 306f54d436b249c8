//! Offline fallback text used when no model is available.

/// Echo `text`, cut to `max_chars` characters with a `...` suffix when longer.
///
/// Counts characters rather than bytes so multi-byte text is never split.
pub fn truncate_with_ellipsis(text: &str, max_chars: usize) -> String {
    let mut chars = text.char_indices();
    match chars.nth(max_chars) {
        None => text.to_string(),
        Some((cut, _)) => format!("{}...", &text[..cut]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_echoed() {
        assert_eq!(truncate_with_ellipsis("hello", 100), "hello");
        assert_eq!(truncate_with_ellipsis("", 100), "");
    }

    #[test]
    fn exact_length_is_not_truncated() {
        let text = "a".repeat(100);
        assert_eq!(truncate_with_ellipsis(&text, 100), text);
    }

    #[test]
    fn long_text_is_cut_with_ellipsis() {
        let text = "abcdefghij".repeat(15);
        let out = truncate_with_ellipsis(&text, 100);
        assert_eq!(out, format!("{}...", "abcdefghij".repeat(10)));
    }

    #[test]
    fn multibyte_text_cut_on_char_boundary() {
        let text = "日本語のテキスト";
        assert_eq!(truncate_with_ellipsis(text, 3), "日本語...");
    }
}
