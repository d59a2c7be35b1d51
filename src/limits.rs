//! Notion API size ceilings and the splitting that enforces them.
//!
//! The API rejects requests that exceed any of these limits, so the
//! conversion pipeline normalizes its output here before anything is sent:
//! long runs are split at 2,000 characters, oversized rich-text arrays are
//! chunked at 100 runs (the caller turns extra chunks into continuation
//! blocks of the same type), and block streams are chunked at 100 children
//! per request.

use notion_client::objects::rich_text::RichText;

use crate::richtext::{run_content, with_content};

/// Maximum children per create or append request.
pub const MAX_CHILDREN_PER_REQUEST: usize = 100;

/// Maximum runs in a single rich-text array.
pub const MAX_RICH_TEXT_ITEMS: usize = 100;

/// Maximum characters in a single text run.
pub const MAX_RUN_CHARS: usize = 2000;

/// Maximum nesting depth below a list item in a single create request.
pub const MAX_LIST_NESTING: usize = 2;

/// Split any run longer than [`MAX_RUN_CHARS`] into several runs carrying
/// the same annotations and link.
pub fn split_long_runs(rich_text: Vec<RichText>) -> Vec<RichText> {
    let mut out = Vec::with_capacity(rich_text.len());
    for run in rich_text {
        let Some(content) = run_content(&run) else {
            out.push(run);
            continue;
        };
        if content.chars().count() <= MAX_RUN_CHARS {
            out.push(run);
            continue;
        }
        let chars: Vec<char> = content.chars().collect();
        for piece in chars.chunks(MAX_RUN_CHARS) {
            out.push(with_content(&run, piece.iter().collect()));
        }
    }
    out
}

/// Enforce both run-level limits: split long runs, then chunk the array at
/// [`MAX_RICH_TEXT_ITEMS`]. The first chunk stays in the original block;
/// each further chunk becomes a continuation block of the same type.
pub fn chunk_rich_text(rich_text: Vec<RichText>) -> Vec<Vec<RichText>> {
    let split = split_long_runs(rich_text);
    if split.len() <= MAX_RICH_TEXT_ITEMS {
        return vec![split];
    }
    split
        .chunks(MAX_RICH_TEXT_ITEMS)
        .map(|chunk| chunk.to_vec())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::richtext::{plain_text, text_run};
    use pretty_assertions::assert_eq;

    #[test]
    fn short_runs_are_untouched() {
        let runs = vec![text_run("hello")];
        let chunks = chunk_rich_text(runs);
        assert_eq!(chunks.len(), 1);
        assert_eq!(plain_text(&chunks[0]), "hello");
    }

    #[test]
    fn long_run_splits_at_two_thousand() {
        let long = "x".repeat(2100);
        let chunks = chunk_rich_text(vec![text_run(&long)]);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].len(), 2);
        assert_eq!(run_content(&chunks[0][0]).map(str::len), Some(2000));
        assert_eq!(run_content(&chunks[0][1]).map(str::len), Some(100));
    }

    #[test]
    fn oversized_arrays_chunk_at_one_hundred() {
        let runs: Vec<_> = (0..150).map(|i| text_run(&format!("r{i} "))).collect();
        let chunks = chunk_rich_text(runs);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].len(), 100);
        assert_eq!(chunks[1].len(), 50);
    }
}
