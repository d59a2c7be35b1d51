//! Shared rich-text constructors and accessors.
//!
//! Every converter in `h2n` builds Notion rich text through these helpers so
//! that plain-text extraction, marker scanning, and limit enforcement all
//! agree on the same representation.

use notion_client::objects::rich_text::{Annotations, Link, RichText, Text, TextColor};

/// Create a plain text run with no annotations.
pub fn text_run(content: &str) -> RichText {
    RichText::Text {
        text: Text {
            content: content.to_string(),
            link: None,
        },
        annotations: None,
        plain_text: Some(content.to_string()),
        href: None,
    }
}

/// Create a text run with explicit annotations and an optional link target.
pub fn annotated_run(content: &str, annotations: Annotations, link: Option<String>) -> RichText {
    RichText::Text {
        text: Text {
            content: content.to_string(),
            link: link.clone().map(|url| Link { url }),
        },
        annotations: Some(annotations),
        plain_text: Some(content.to_string()),
        href: link,
    }
}

/// Create a bold run.
pub fn bold_run(content: &str) -> RichText {
    let annotations = Annotations {
        bold: true,
        ..Default::default()
    };
    annotated_run(content, annotations, None)
}

/// Create an inline-code run. Code runs render red per the house style for
/// technical identifiers.
pub fn code_run(content: &str) -> RichText {
    let annotations = Annotations {
        code: true,
        color: TextColor::Red,
        ..Default::default()
    };
    annotated_run(content, annotations, None)
}

/// Concatenated plain content of a rich-text array.
pub fn plain_text(rich_text: &[RichText]) -> String {
    let mut out = String::new();
    for run in rich_text {
        match run {
            RichText::Text { text, .. } => out.push_str(&text.content),
            other => {
                if let Some(plain) = plain_of(other) {
                    out.push_str(plain);
                }
            }
        }
    }
    out
}

fn plain_of(run: &RichText) -> Option<&str> {
    match run {
        RichText::Text { plain_text, .. } => plain_text.as_deref(),
        RichText::Mention { plain_text, .. } | RichText::Equation { plain_text, .. } => {
            Some(plain_text.as_str())
        }
        _ => None,
    }
}

/// Content string of a text run, if it is one.
pub fn run_content(run: &RichText) -> Option<&str> {
    match run {
        RichText::Text { text, .. } => Some(&text.content),
        _ => None,
    }
}

/// Rebuild a text run with new content but the same annotations and link.
pub fn with_content(run: &RichText, content: String) -> RichText {
    match run {
        RichText::Text {
            text, annotations, ..
        } => RichText::Text {
            text: Text {
                content: content.clone(),
                link: text.link.clone(),
            },
            annotations: annotations.clone(),
            plain_text: Some(content),
            href: None,
        },
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn plain_text_concatenates_runs() {
        let runs = vec![text_run("a "), bold_run("b"), code_run("c")];
        assert_eq!(plain_text(&runs), "a bc");
    }

    #[test]
    fn code_run_is_red() {
        match code_run("sys_id") {
            RichText::Text { annotations, .. } => {
                let ann = annotations.expect("annotations");
                assert!(ann.code);
                assert_eq!(ann.color, TextColor::Red);
            }
            _ => panic!("expected text run"),
        }
    }

    #[test]
    fn with_content_preserves_annotations() {
        let original = bold_run("abcdef");
        let replaced = with_content(&original, "abc".to_string());
        match replaced {
            RichText::Text {
                text, annotations, ..
            } => {
                assert_eq!(text.content, "abc");
                assert!(annotations.expect("annotations").bold);
            }
            _ => panic!("expected text run"),
        }
    }
}
