//! Deferred-nesting markers.
//!
//! Some source structures (a table inside a list item, for example) cannot
//! be uploaded in their natural position because Notion forbids the block
//! type as a direct child there. The walker parks such blocks in a sidecar
//! map and leaves an opaque token `(sn2n:<id>)` in the host block's rich
//! text. After the page exists, the orchestrator finds each token, appends
//! the parked blocks as children of the host, and erases the token.

use std::collections::BTreeMap;
use std::ops::Range;

use notion_client::objects::block::Block;
use notion_client::objects::rich_text::RichText;
use once_cell::sync::Lazy;
use regex::Regex;
use uuid::Uuid;

use crate::h2n::DraftBlock;
use crate::richtext::{run_content, with_content};

/// Matches any marker token, including ones minted by a previous run.
pub static MARKER_TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\(sn2n:[0-9a-f]+\)").expect("marker token pattern"));

/// Render the in-text token for a marker id.
pub fn marker_token(id: &str) -> String {
    format!("(sn2n:{id})")
}

/// Mints marker ids unique within one conversion: a millisecond timestamp
/// component plus a per-conversion sequence and a random suffix.
#[derive(Debug)]
pub struct MarkerMint {
    stamp: u64,
    seq: u32,
}

impl MarkerMint {
    pub fn new() -> Self {
        Self {
            stamp: chrono::Utc::now().timestamp_millis() as u64,
            seq: 0,
        }
    }

    pub fn mint(&mut self) -> String {
        self.seq += 1;
        let suffix = Uuid::new_v4().simple().to_string();
        format!("{:x}{:02x}{}", self.stamp, self.seq, &suffix[..6])
    }
}

impl Default for MarkerMint {
    fn default() -> Self {
        Self::new()
    }
}

/// Move every marker-carrying block out of the draft stream into the
/// sidecar map, preserving per-marker order. The returned stream is what
/// gets uploaded; it contains marker tokens only as rich-text references.
pub fn collect_deferred(
    stream: Vec<DraftBlock>,
    sidecar: &mut BTreeMap<String, Vec<Block>>,
) -> Vec<DraftBlock> {
    let mut kept = Vec::with_capacity(stream.len());
    for draft in stream {
        match draft.marker {
            Some(id) => sidecar.entry(id).or_default().push(draft.block),
            None => kept.push(draft),
        }
    }
    kept
}

/// Remove every occurrence of `token` from a rich-text array, including
/// occurrences spanning run boundaries. Returns `None` when the token does
/// not occur. Surviving bytes keep the annotations of the run they came
/// from; runs left empty are dropped.
pub fn strip_token(rich_text: &[RichText], token: &str) -> Option<Vec<RichText>> {
    strip_ranges(rich_text, |concat| {
        let mut ranges = Vec::new();
        let mut from = 0;
        while let Some(pos) = concat[from..].find(token) {
            let start = from + pos;
            ranges.push(start..start + token.len());
            from = start + token.len();
        }
        ranges
    })
}

/// Remove every marker token matched by [`MARKER_TOKEN_RE`]. Used by the
/// post-orchestration sweep, which cannot know individual ids.
pub fn strip_all_tokens(rich_text: &[RichText]) -> Option<Vec<RichText>> {
    strip_ranges(rich_text, |concat| {
        MARKER_TOKEN_RE
            .find_iter(concat)
            .map(|m| m.range())
            .collect()
    })
}

fn strip_ranges<F>(rich_text: &[RichText], locate: F) -> Option<Vec<RichText>>
where
    F: FnOnce(&str) -> Vec<Range<usize>>,
{
    let mut concat = String::new();
    let mut spans: Vec<Option<Range<usize>>> = Vec::with_capacity(rich_text.len());
    for run in rich_text {
        match run_content(run) {
            Some(content) => {
                let start = concat.len();
                concat.push_str(content);
                spans.push(Some(start..concat.len()));
            }
            None => spans.push(None),
        }
    }

    let remove = locate(&concat);
    if remove.is_empty() {
        return None;
    }

    let mut out = Vec::with_capacity(rich_text.len());
    for (run, span) in rich_text.iter().zip(spans) {
        let Some(span) = span else {
            out.push(run.clone());
            continue;
        };
        let mut kept = String::new();
        let mut cursor = span.start;
        for gone in &remove {
            let cut_start = gone.start.clamp(span.start, span.end);
            let cut_end = gone.end.clamp(span.start, span.end);
            if cut_start > cursor {
                kept.push_str(&concat[cursor..cut_start]);
            }
            cursor = cursor.max(cut_end);
        }
        if cursor < span.end {
            kept.push_str(&concat[cursor..span.end]);
        }
        if !kept.is_empty() {
            out.push(with_content(run, kept));
        }
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::richtext::{bold_run, plain_text, text_run};
    use pretty_assertions::assert_eq;

    #[test]
    fn minted_ids_are_unique_and_tokenizable() {
        let mut mint = MarkerMint::new();
        let a = mint.mint();
        let b = mint.mint();
        assert_ne!(a, b);
        assert!(MARKER_TOKEN_RE.is_match(&marker_token(&a)));
    }

    #[test]
    fn strips_token_within_one_run() {
        let id = "abc123";
        let runs = vec![text_run(&format!("First, configure: {}", marker_token(id)))];
        let stripped = strip_token(&runs, &marker_token(id)).expect("token present");
        assert_eq!(plain_text(&stripped), "First, configure: ");
    }

    #[test]
    fn strips_token_spanning_run_boundaries() {
        let runs = vec![
            text_run("configure (sn2n:ab"),
            bold_run("c123) now"),
        ];
        let stripped = strip_token(&runs, "(sn2n:abc123)").expect("token present");
        assert_eq!(plain_text(&stripped), "configure  now");
        // The surviving tail keeps its bold annotation.
        match &stripped[1] {
            RichText::Text { annotations, .. } => {
                assert!(annotations.clone().expect("annotations").bold)
            }
            _ => panic!("expected text run"),
        }
    }

    #[test]
    fn absent_token_returns_none() {
        let runs = vec![text_run("no tokens here")];
        assert!(strip_token(&runs, "(sn2n:ffff)").is_none());
    }

    #[test]
    fn runs_left_empty_are_dropped() {
        let runs = vec![text_run("(sn2n:aa11)"), text_run("tail")];
        let stripped = strip_all_tokens(&runs).expect("token present");
        assert_eq!(stripped.len(), 1);
        assert_eq!(plain_text(&stripped), "tail");
    }

    #[test]
    fn strip_all_removes_multiple_tokens() {
        let runs = vec![text_run("a (sn2n:0a) b (sn2n:0b) c")];
        let stripped = strip_all_tokens(&runs).expect("tokens present");
        assert_eq!(plain_text(&stripped), "a  b  c");
    }
}
