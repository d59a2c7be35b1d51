//! Heading conversion. Notion stops at three levels, so h4 through h6
//! degrade to `heading_3`.

use notion_client::objects::block::{Block, BlockType, HeadingsValue};
use notion_client::objects::rich_text::RichText;

use crate::limits::split_long_runs;

use super::block_of;

/// Build a heading block for an HTML heading level (1-6).
pub fn heading_block(level: u8, rich_text: Vec<RichText>) -> Block {
    let value = HeadingsValue {
        rich_text: split_long_runs(rich_text),
        color: None,
        is_toggleable: None,
    };
    let block_type = match level {
        1 => BlockType::Heading1 { heading_1: value },
        2 => BlockType::Heading2 { heading_2: value },
        _ => BlockType::Heading3 { heading_3: value },
    };
    block_of(block_type)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::richtext::text_run;

    #[test]
    fn deep_levels_degrade_to_heading_3() {
        for level in 4..=6 {
            let block = heading_block(level, vec![text_run("deep")]);
            assert!(matches!(
                block.block_type,
                BlockType::Heading3 { .. }
            ));
        }
    }

    #[test]
    fn h2_maps_to_heading_2() {
        let block = heading_block(2, vec![text_run("mid")]);
        assert!(matches!(block.block_type, BlockType::Heading2 { .. }));
    }
}
