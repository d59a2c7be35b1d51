//! HTML entity decoding and whitespace cleanup.
//!
//! Entity decoding covers the named set plus `&#NNN;` and `&#xHH;` numeric
//! references. Invalid references pass through literally instead of failing
//! the conversion. Whitespace cleanup collapses runs of spaces and tabs to a
//! single space while keeping explicit newlines; preformatted content never
//! goes through it.

use html_escape::decode_html_entities;

/// Decode named and numeric HTML entities in `input`.
pub fn decode_entities(input: &str) -> String {
    decode_html_entities(input).into_owned()
}

/// Collapse horizontal whitespace runs to a single space, preserving
/// newlines. Leading and trailing whitespace on each line is trimmed.
pub fn normalize_whitespace(input: &str) -> String {
    let mut lines = Vec::new();
    for line in input.split('\n') {
        let mut out = String::with_capacity(line.len());
        let mut pending_space = false;
        for ch in line.chars() {
            if ch == ' ' || ch == '\t' || ch == '\r' || ch == '\u{a0}' {
                pending_space = !out.is_empty();
            } else {
                if pending_space {
                    out.push(' ');
                    pending_space = false;
                }
                out.push(ch);
            }
        }
        lines.push(out);
    }
    lines.join("\n")
}

/// Decode entities then normalize whitespace.
pub fn clean_text(input: &str) -> String {
    normalize_whitespace(&decode_entities(input))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn decodes_named_entities() {
        assert_eq!(decode_entities("a &amp; b &lt;c&gt;"), "a & b <c>");
        assert_eq!(decode_entities("&nbsp;x"), "\u{a0}x");
    }

    #[test]
    fn decodes_numeric_entities() {
        assert_eq!(decode_entities("&#65;&#x42;"), "AB");
    }

    #[test]
    fn invalid_entities_pass_through() {
        assert_eq!(decode_entities("5 &notanentity; 6"), "5 &notanentity; 6");
    }

    #[test]
    fn collapses_whitespace_but_keeps_newlines() {
        assert_eq!(normalize_whitespace("a  \t b\n  c   d"), "a b\nc d");
    }

    #[test]
    fn clean_text_combines_both() {
        assert_eq!(clean_text("set&nbsp;&nbsp; value"), "set value");
    }
}
