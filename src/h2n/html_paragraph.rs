//! Paragraph conversion.

use notion_client::objects::block::{Block, BlockType, ParagraphValue, TextColor};
use notion_client::objects::rich_text::RichText;

use crate::limits::chunk_rich_text;
use crate::richtext::plain_text;

use super::block_of;

/// Build one paragraph block.
pub fn paragraph_block(rich_text: Vec<RichText>) -> Block {
    block_of(BlockType::Paragraph {
        paragraph: ParagraphValue {
            rich_text,
            color: Some(TextColor::Default),
            children: None,
        },
    })
}

/// Build one or more paragraph blocks, splitting when the rich text exceeds
/// the per-block run ceiling. Empty text produces nothing.
pub fn paragraph_blocks(rich_text: Vec<RichText>) -> Vec<Block> {
    if plain_text(&rich_text).trim().is_empty() {
        return Vec::new();
    }
    chunk_rich_text(rich_text)
        .into_iter()
        .map(paragraph_block)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::richtext::text_run;
    use pretty_assertions::assert_eq;

    #[test]
    fn whitespace_only_text_emits_nothing() {
        assert!(paragraph_blocks(vec![text_run("   ")]).is_empty());
    }

    #[test]
    fn long_text_splits_into_continuation_paragraphs() {
        let runs: Vec<_> = (0..120).map(|i| text_run(&format!("run {i} "))).collect();
        let blocks = paragraph_blocks(runs);
        assert_eq!(blocks.len(), 2);
        for block in &blocks {
            match &block.block_type {
                BlockType::Paragraph { paragraph } => {
                    assert!(paragraph.rich_text.len() <= 100)
                }
                _ => panic!("expected paragraph"),
            }
        }
    }
}
