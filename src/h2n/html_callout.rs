//! Callout conversion.
//!
//! ServiceNow marks notes with a wide class vocabulary (`note`, `note_note`,
//! `warning`, ...) and sometimes only with a leading label in the text
//! (`Note: ...`). Both paths resolve to the same fixed color/icon table.

use notion_client::objects::block::{Block, BlockType, CalloutValue, Icon, TextColor};
use notion_client::objects::emoji::Emoji;
use notion_client::objects::rich_text::RichText;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::limits::split_long_runs;

use super::block_of;

pub const WARNING_EMOJI: &str = "\u{26a0}\u{fe0f}";
pub const TIP_EMOJI: &str = "\u{1f4a1}";
pub const INFO_EMOJI: &str = "\u{2139}\u{fe0f}";
pub const PREREQ_EMOJI: &str = "\u{1f4cd}";

static RE_LABEL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(Note|Info|Warning|Important|Caution|Tip):").expect("label pattern")
});

/// Visual identity of a callout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalloutKind {
    pub color: TextColor,
    pub emoji: &'static str,
}

impl CalloutKind {
    pub const IMPORTANT: Self = Self {
        color: TextColor::RedBackground,
        emoji: WARNING_EMOJI,
    };
    pub const WARNING: Self = Self {
        color: TextColor::OrangeBackground,
        emoji: WARNING_EMOJI,
    };
    pub const CAUTION: Self = Self {
        color: TextColor::YellowBackground,
        emoji: WARNING_EMOJI,
    };
    pub const TIP: Self = Self {
        color: TextColor::GreenBackground,
        emoji: TIP_EMOJI,
    };
    pub const INFO: Self = Self {
        color: TextColor::BlueBackground,
        emoji: INFO_EMOJI,
    };
    pub const CHROME: Self = Self {
        color: TextColor::GrayBackground,
        emoji: INFO_EMOJI,
    };
    pub const PREREQ: Self = Self {
        color: TextColor::Default,
        emoji: PREREQ_EMOJI,
    };
}

/// Split a class attribute into alphabetic words so that compound tokens
/// like `note_note` or `note-warning` still match the vocabulary.
fn class_words(class_attr: &str) -> Vec<String> {
    class_attr
        .split(|c: char| !c.is_ascii_alphabetic())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_ascii_lowercase())
        .collect()
}

/// True when a `<div>` class set marks a callout container.
pub fn is_callout_class(class_attr: &str) -> bool {
    let words = class_words(class_attr);
    words.iter().any(|w| {
        matches!(
            w.as_str(),
            "note" | "info" | "warning" | "important" | "tip" | "caution"
        )
    })
}

/// Derive color and icon from the class vocabulary.
pub fn kind_for_classes(class_attr: &str) -> CalloutKind {
    let words = class_words(class_attr);
    let has = |name: &str| words.iter().any(|w| w == name);
    if has("important") || has("critical") {
        CalloutKind::IMPORTANT
    } else if has("warning") {
        CalloutKind::WARNING
    } else if has("caution") {
        CalloutKind::CAUTION
    } else if has("tip") {
        CalloutKind::TIP
    } else {
        CalloutKind::INFO
    }
}

/// Derive color and icon from a leading text label such as `Warning:`.
pub fn kind_for_label(text: &str) -> Option<CalloutKind> {
    let label = RE_LABEL.captures(text.trim_start())?;
    Some(match &label[1] {
        "Important" => CalloutKind::IMPORTANT,
        "Warning" => CalloutKind::WARNING,
        "Caution" => CalloutKind::CAUTION,
        "Tip" => CalloutKind::TIP,
        _ => CalloutKind::INFO,
    })
}

/// True when the element styles itself as decorative gray chrome.
pub fn is_gray_chrome(style_attr: Option<&str>) -> bool {
    style_attr
        .map(|s| {
            let lower = s.to_ascii_lowercase();
            lower.contains("gray") || lower.contains("grey")
        })
        .unwrap_or(false)
}

/// Build a callout block.
pub fn callout_block(rich_text: Vec<RichText>, kind: CalloutKind) -> Block {
    block_of(BlockType::Callout {
        callout: CalloutValue {
            rich_text: split_long_runs(rich_text),
            icon: Some(Icon::Emoji(Emoji::Emoji {
                emoji: kind.emoji.to_string(),
            })),
            color: kind.color,
        },
    })
}

/// Reshape prerequisite text: a newline after the "Before you begin" title
/// and a break before "Role required:" when the text carries more than the
/// simple two-line form.
pub fn shape_prereq_text(text: &str) -> String {
    let mut shaped = text.to_string();
    if let Some(pos) = shaped.find("Before you begin") {
        let after = pos + "Before you begin".len();
        if !shaped[after..].starts_with('\n') && !shaped[after..].is_empty() {
            shaped.insert(after, '\n');
        }
    }
    if let Some(pos) = shaped.find("Role required:") {
        if pos > 0 && shaped.as_bytes()[pos - 1] != b'\n' {
            shaped.insert(pos, '\n');
        }
    }
    shaped
        .split('\n')
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn compound_class_tokens_match() {
        assert!(is_callout_class("note note note_note"));
        assert!(is_callout_class("zDocs-warning"));
        assert!(!is_callout_class("footnote"));
        assert!(!is_callout_class("body"));
    }

    #[test]
    fn class_vocabulary_maps_to_fixed_table() {
        assert_eq!(kind_for_classes("note important"), CalloutKind::IMPORTANT);
        assert_eq!(kind_for_classes("note warning"), CalloutKind::WARNING);
        assert_eq!(kind_for_classes("note_caution"), CalloutKind::CAUTION);
        assert_eq!(kind_for_classes("note tip"), CalloutKind::TIP);
        assert_eq!(kind_for_classes("note note_note"), CalloutKind::INFO);
    }

    #[test]
    fn labels_map_to_kinds() {
        assert_eq!(kind_for_label("Warning: stop"), Some(CalloutKind::WARNING));
        assert_eq!(kind_for_label("Note: fine"), Some(CalloutKind::INFO));
        assert_eq!(kind_for_label("Plain text"), None);
    }

    #[test]
    fn gray_style_is_chrome() {
        assert!(is_gray_chrome(Some("background:gray")));
        assert!(is_gray_chrome(Some("background-color: #ccc; color: grey")));
        assert!(!is_gray_chrome(Some("background:blue")));
        assert!(!is_gray_chrome(None));
    }

    #[test]
    fn prereq_shaping_inserts_breaks() {
        assert_eq!(
            shape_prereq_text("Before you begin Role required: admin"),
            "Before you begin\nRole required: admin"
        );
        assert_eq!(
            shape_prereq_text("Before you begin Review the notes. Role required: admin"),
            "Before you begin\nReview the notes.\nRole required: admin"
        );
    }
}
