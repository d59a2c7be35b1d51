//! Preformatted code conversion.

use notion_client::objects::block::{Block, BlockType, CodeValue, Language};
use scraper::ElementRef;
use serde_json::Value;

use crate::limits::split_long_runs;
use crate::richtext::text_run;

use super::block_of;

/// Build a code block. Content is preserved verbatim; long content is split
/// across multiple runs inside the same block.
pub fn code_block(content: &str, language: Language) -> Block {
    block_of(BlockType::Code {
        code: CodeValue {
            caption: Vec::new(),
            rich_text: split_long_runs(vec![text_run(content)]),
            language,
        },
    })
}

/// Map a source language hint onto Notion's language vocabulary.
pub fn normalize_language(raw: &str) -> Language {
    let lower = raw.trim().to_ascii_lowercase();
    let canonical = match lower.as_str() {
        "js" | "jsx" | "node" => "javascript",
        "ts" | "tsx" => "typescript",
        "py" => "python",
        "sh" | "zsh" | "console" | "terminal" => "shell",
        "ps" | "ps1" => "powershell",
        "yml" => "yaml",
        "cpp" | "cxx" => "c++",
        "cs" | "csharp" => "c#",
        "text" | "txt" | "plaintext" | "none" | "" => "plain text",
        other => other,
    };
    serde_json::from_value(Value::String(canonical.to_string())).unwrap_or(Language::PlainText)
}

/// Language hint for a `<pre>` element: a `language-*` class on the element
/// or its nested `<code>`, or a `data-language` attribute.
fn language_hint(el: ElementRef) -> Option<String> {
    if let Some(lang) = el.value().attr("data-language") {
        return Some(lang.to_string());
    }
    if let Some(lang) = el.value().classes().find_map(|c| c.strip_prefix("language-")) {
        return Some(lang.to_string());
    }
    for child in el.descendants() {
        if let Some(child_el) = ElementRef::wrap(child) {
            if child_el.value().name() == "code" {
                if let Some(lang) = child_el
                    .value()
                    .classes()
                    .find_map(|c| c.strip_prefix("language-"))
                {
                    return Some(lang.to_string());
                }
            }
        }
    }
    None
}

/// Convert a `<pre>` element. Whitespace inside is never normalized.
pub fn convert_pre(el: ElementRef) -> Option<Block> {
    let mut content: String = el.text().collect();
    if let Some(stripped) = content.strip_prefix('\n') {
        content = stripped.to_string();
    }
    if content.trim().is_empty() {
        return None;
    }
    let language = language_hint(el)
        .map(|hint| normalize_language(&hint))
        .unwrap_or(Language::PlainText);
    Some(code_block(&content, language))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use scraper::{Html, Selector};

    fn first_pre(html: &str) -> Block {
        let doc = Html::parse_fragment(html);
        let sel = Selector::parse("pre").expect("selector");
        let el = doc.select(&sel).next().expect("pre element");
        convert_pre(el).expect("code block")
    }

    #[test]
    fn preserves_indentation_and_newlines() {
        let block = first_pre("<pre>line one\n  indented\n\nlast</pre>");
        match block.block_type {
            BlockType::Code { code } => {
                assert_eq!(
                    crate::richtext::plain_text(&code.rich_text),
                    "line one\n  indented\n\nlast"
                );
            }
            _ => panic!("expected code block"),
        }
    }

    #[test]
    fn detects_language_class() {
        let block = first_pre(r#"<pre class="language-javascript">var x;</pre>"#);
        match block.block_type {
            BlockType::Code { code } => assert_eq!(code.language, Language::Javascript),
            _ => panic!("expected code block"),
        }
    }

    #[test]
    fn unknown_language_falls_back_to_plain_text() {
        assert_eq!(normalize_language("klingon"), Language::PlainText);
        assert_eq!(normalize_language(""), Language::PlainText);
    }

    #[test]
    fn aliases_normalize() {
        assert_eq!(normalize_language("js"), Language::Javascript);
        assert_eq!(normalize_language("sh"), Language::Shell);
        assert_eq!(normalize_language("yml"), Language::Yaml);
    }

    #[test]
    fn entities_inside_pre_are_decoded() {
        let block = first_pre("<pre>if (a &lt; b &amp;&amp; c)</pre>");
        match block.block_type {
            BlockType::Code { code } => {
                assert_eq!(
                    crate::richtext::plain_text(&code.rich_text),
                    "if (a < b && c)"
                );
            }
            _ => panic!("expected code block"),
        }
    }
}
