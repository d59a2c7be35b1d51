//! Adjacent-duplicate removal and chrome filtering.
//!
//! Nested extraction can emit the same callout or table twice in a row;
//! duplicates beyond the first are dropped by a type-specific key. Gray
//! info callouts are decorative UI chrome and are removed outright.

use log::{debug, info};
use notion_client::objects::block::{Block, BlockType, Icon, TextColor};

use crate::richtext::plain_text;

use super::html_callout::INFO_EMOJI;
use super::{ConvertStats, DraftBlock};

/// Run the filter then the adjacency dedupe over the draft stream.
pub fn dedupe_and_filter(stream: Vec<DraftBlock>, stats: &mut ConvertStats) -> Vec<DraftBlock> {
    let mut out: Vec<DraftBlock> = Vec::with_capacity(stream.len());
    for draft in stream {
        if draft.marker.is_none() && is_chrome_callout(&draft.block) {
            stats.filtered_callouts += 1;
            debug!("filtered gray info callout");
            continue;
        }
        if draft.marker.is_none() {
            let duplicate = out
                .last()
                .filter(|prev| prev.marker.is_none())
                .and_then(|prev| dedupe_key(&prev.block))
                .is_some_and(|prev_key| dedupe_key(&draft.block) == Some(prev_key));
            if duplicate {
                stats.deduped_blocks += 1;
                debug!("dropped adjacent duplicate block");
                continue;
            }
        }
        out.push(draft);
    }
    if stats.filtered_callouts > 0 || stats.deduped_blocks > 0 {
        info!(
            "dedupe pass removed {} duplicate(s), filtered {} chrome callout(s)",
            stats.deduped_blocks, stats.filtered_callouts
        );
    }
    out
}

/// Gray background plus the info icon marks decorative chrome.
fn is_chrome_callout(block: &Block) -> bool {
    match &block.block_type {
        BlockType::Callout { callout } => {
            let gray = callout.color == TextColor::GrayBackground;
            let info_icon = matches!(
                &callout.icon,
                Some(Icon::Emoji(notion_client::objects::emoji::Emoji::Emoji { emoji })) if emoji == INFO_EMOJI
            );
            gray && info_icon
        }
        _ => false,
    }
}

fn head(text: &str) -> String {
    text.chars().take(200).collect()
}

/// Type-specific equality key. Block types with no key never dedupe.
fn dedupe_key(block: &Block) -> Option<String> {
    match &block.block_type {
        BlockType::Callout { callout } => {
            let emoji = match &callout.icon {
                Some(Icon::Emoji(notion_client::objects::emoji::Emoji::Emoji { emoji })) => {
                    emoji.clone()
                }
                _ => String::new(),
            };
            Some(format!(
                "callout|{}|{}|{:?}",
                plain_text(&callout.rich_text),
                emoji,
                callout.color
            ))
        }
        BlockType::Table { table } => {
            let rows = table.children.as_deref().unwrap_or_default();
            let sample: Vec<String> = rows
                .iter()
                .take(3)
                .map(|row| match &row.block_type {
                    BlockType::TableRow { table_row } => table_row
                        .cells
                        .iter()
                        .map(|cell| plain_text(cell).trim().to_lowercase())
                        .collect::<Vec<_>>()
                        .join("\u{1f}"),
                    _ => String::new(),
                })
                .collect();
            Some(format!(
                "table|{}|{}|{}",
                table.table_width,
                rows.len(),
                sample.join("\u{1e}")
            ))
        }
        BlockType::Paragraph { paragraph } => Some(format!(
            "paragraph|{}",
            head(&plain_text(&paragraph.rich_text))
        )),
        BlockType::BulletedListItem { bulleted_list_item } => Some(format!(
            "bulleted|{}",
            head(&plain_text(&bulleted_list_item.rich_text))
        )),
        BlockType::NumberedListItem { numbered_list_item } => Some(format!(
            "numbered|{}",
            head(&plain_text(&numbered_list_item.rich_text))
        )),
        BlockType::Code { code } => Some(format!(
            "code|{:?}|{}",
            code.language,
            head(&plain_text(&code.rich_text))
        )),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::super::html_callout::{CalloutKind, callout_block};
    use super::super::html_paragraph::paragraph_block;
    use super::*;
    use crate::richtext::text_run;
    use pretty_assertions::assert_eq;

    fn drafts_of(blocks: Vec<Block>) -> Vec<DraftBlock> {
        blocks.into_iter().map(DraftBlock::new).collect()
    }

    #[test]
    fn adjacent_duplicate_callouts_collapse() {
        let callout = callout_block(vec![text_run("Note: same")], CalloutKind::INFO);
        let mut stats = ConvertStats::default();
        let out = dedupe_and_filter(
            drafts_of(vec![callout.clone(), callout.clone()]),
            &mut stats,
        );
        assert_eq!(out.len(), 1);
        assert_eq!(stats.deduped_blocks, 1);
    }

    #[test]
    fn distinct_neighbors_survive() {
        let a = paragraph_block(vec![text_run("one")]);
        let b = paragraph_block(vec![text_run("two")]);
        let mut stats = ConvertStats::default();
        let out = dedupe_and_filter(drafts_of(vec![a, b]), &mut stats);
        assert_eq!(out.len(), 2);
        assert_eq!(stats.deduped_blocks, 0);
    }

    #[test]
    fn non_adjacent_duplicates_survive() {
        let a = paragraph_block(vec![text_run("same")]);
        let b = paragraph_block(vec![text_run("other")]);
        let c = paragraph_block(vec![text_run("same")]);
        let mut stats = ConvertStats::default();
        let out = dedupe_and_filter(drafts_of(vec![a, b, c]), &mut stats);
        assert_eq!(out.len(), 3);
    }

    #[test]
    fn gray_info_callouts_are_filtered() {
        let chrome = callout_block(vec![text_run("Decorative info.")], CalloutKind::CHROME);
        let mut stats = ConvertStats::default();
        let out = dedupe_and_filter(drafts_of(vec![chrome]), &mut stats);
        assert!(out.is_empty());
        assert_eq!(stats.filtered_callouts, 1);
    }

    #[test]
    fn deferred_blocks_are_never_deduped() {
        let block = paragraph_block(vec![text_run("same")]);
        let stream = vec![
            DraftBlock::new(block.clone()),
            DraftBlock::deferred(block, "aa11".to_string()),
        ];
        let mut stats = ConvertStats::default();
        let out = dedupe_and_filter(stream, &mut stats);
        assert_eq!(out.len(), 2);
    }
}
