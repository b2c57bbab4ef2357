//! Text helpers shared by the signal collector and the element classifier
//!
//! Keyword matching is case-insensitive on pre-lowercased input. Keywords
//! shorter than [`SHORT_KEYWORD_LEN`] characters only match at word boundaries
//! so that e.g. `pro` does not fire inside `productivity`.

use percent_encoding::percent_decode_str;

/// Keywords shorter than this need word-boundary context to match
pub const SHORT_KEYWORD_LEN: usize = 4;

/// Find the byte position of the first valid occurrence of `keyword` in `text`.
///
/// Both arguments are expected to be lowercase already.
pub fn keyword_position(text: &str, keyword: &str) -> Option<usize> {
    if keyword.is_empty() {
        return None;
    }

    let needs_boundary = keyword.chars().count() < SHORT_KEYWORD_LEN;

    text.match_indices(keyword)
        .map(|(pos, _)| pos)
        .find(|&pos| !needs_boundary || is_word_bounded(text, pos, keyword.len()))
}

/// Whether `keyword` occurs in `text` (same rules as [`keyword_position`])
pub fn contains_keyword(text: &str, keyword: &str) -> bool {
    keyword_position(text, keyword).is_some()
}

fn is_word_bounded(text: &str, start: usize, len: usize) -> bool {
    let before = text[..start].chars().next_back();
    let after = text[start + len..].chars().next();
    !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
}

/// Percent-decode a query component, treating `+` as a space.
///
/// Returns `None` on a truncated or non-hex escape, or when the decoded bytes
/// are not valid UTF-8.
pub fn percent_decode(input: &str) -> Option<String> {
    if !has_valid_escapes(input) {
        return None;
    }

    let spaced = input.replace('+', " ");
    percent_decode_str(&spaced)
        .decode_utf8()
        .ok()
        .map(|decoded| decoded.into_owned())
}

/// Every `%` is followed by two hex digits
fn has_valid_escapes(input: &str) -> bool {
    let bytes = input.as_bytes();
    bytes.iter().enumerate().all(|(i, &b)| {
        b != b'%'
            || (bytes.get(i + 1).is_some_and(u8::is_ascii_hexdigit)
                && bytes.get(i + 2).is_some_and(u8::is_ascii_hexdigit))
    })
}

/// Collapse runs of whitespace and truncate to `max_chars` characters
pub fn collapse_and_truncate(text: &str, max_chars: usize) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_long_keyword_matches_inside_words() {
        assert_eq!(keyword_position("bestgamingpc", "gaming"), Some(4));
        assert_eq!(keyword_position("office chairs", "office"), Some(0));
    }

    #[test]
    fn test_short_keyword_requires_boundary() {
        assert_eq!(keyword_position("productivity", "pro"), None);
        assert_eq!(keyword_position("macbook pro 14", "pro"), Some(8));
        assert_eq!(keyword_position("pro-gear", "pro"), Some(0));
        // the first occurrence is embedded, the second is bounded
        assert_eq!(keyword_position("upstart art", "art"), Some(8));
    }

    #[test]
    fn test_empty_keyword_never_matches() {
        assert!(!contains_keyword("anything", ""));
    }

    #[test]
    fn test_percent_decode() {
        assert_eq!(percent_decode("gaming%20laptop").as_deref(), Some("gaming laptop"));
        assert_eq!(percent_decode("back+to+school").as_deref(), Some("back to school"));
        assert_eq!(percent_decode("caf%C3%A9").as_deref(), Some("café"));
        // an encoded plus stays a plus
        assert_eq!(percent_decode("c%2B%2B+book").as_deref(), Some("c++ book"));
    }

    #[test]
    fn test_percent_decode_malformed() {
        assert_eq!(percent_decode("100%"), None);
        assert_eq!(percent_decode("%zzdeal"), None);
        assert_eq!(percent_decode("%FF%FE"), None);
    }

    #[test]
    fn test_collapse_and_truncate() {
        assert_eq!(collapse_and_truncate("  Add \n to   cart ", 100), "Add to cart");
        assert_eq!(collapse_and_truncate("abcdef", 3), "abc");
    }
}
