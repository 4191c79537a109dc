//! Byte ↔ character offset conversion.
//!
//! Rust slices by byte; the backend addresses text by character. Citation
//! matches, ToC reference spans and annotation selectors are converted
//! with these helpers.

use annodemo_shared::TextSpan;

/// Number of characters before byte offset `byte` (clamped to the text).
pub fn char_offset(text: &str, byte: usize) -> usize {
    text.char_indices().take_while(|(i, _)| *i < byte).count()
}

/// Byte offset of the `index`-th character, or `text.len()` past the end.
pub fn byte_offset(text: &str, index: usize) -> usize {
    text.char_indices()
        .nth(index)
        .map(|(i, _)| i)
        .unwrap_or(text.len())
}

/// Convert a byte span into a `(start, end)` character span.
pub fn char_span(text: &str, span: TextSpan) -> (usize, usize) {
    let start = char_offset(text, span.start);
    let end = start + char_offset(&text[span.start..], span.end - span.start);
    (start, end)
}

/// Length of `text` in characters.
pub fn char_len(text: &str) -> usize {
    text.chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_offsets_are_identity() {
        assert_eq!(char_offset("hello", 3), 3);
        assert_eq!(byte_offset("hello", 3), 3);
        assert_eq!(char_span("hello", TextSpan::new(1, 4)), (1, 4));
    }

    #[test]
    fn multibyte_offsets() {
        let text = "§ 441b — café";
        // "§" is two bytes, " " one, "—" three.
        let dash = text.find('—').unwrap();
        assert_eq!(char_offset(text, dash), 7);
        assert_eq!(byte_offset(text, 7), dash);
        let cafe = text.find("café").unwrap();
        assert_eq!(
            char_span(text, TextSpan::new(cafe, text.len())),
            (9, 13)
        );
        assert_eq!(char_len(text), 13);
    }

    #[test]
    fn offsets_clamp_past_end() {
        assert_eq!(char_offset("abc", 99), 3);
        assert_eq!(byte_offset("abc", 99), 3);
    }
}
