//! HTML to Notion conversion.
//!
//! This module turns a ServiceNow documentation page into the linear block
//! stream that the upload pipeline sends to Notion. The walker dispatches
//! each element to a specialized converter; converters that meet content
//! Notion cannot nest (a table inside a list item, say) park it in the
//! conversion's sidecar under a freshly minted marker.

pub mod dedupe;
pub mod html_callout;
pub mod html_code;
pub mod html_heading;
pub mod html_list;
pub mod html_media;
pub mod html_paragraph;
pub mod html_table;
pub mod html_text;
pub mod walker;

use std::collections::BTreeMap;

use notion_client::objects::block::{Block, BlockType};

use crate::marker::{MarkerMint, collect_deferred};

/// A block in the draft stream, possibly tagged for deferred nesting.
#[derive(Debug, Clone)]
pub struct DraftBlock {
    pub block: Block,
    /// Marker id when this block must be re-parented by the orchestrator.
    pub marker: Option<String>,
}

impl DraftBlock {
    pub fn new(block: Block) -> Self {
        Self {
            block,
            marker: None,
        }
    }

    pub fn deferred(block: Block, marker: String) -> Self {
        Self {
            block,
            marker: Some(marker),
        }
    }
}

/// Counters reported alongside a conversion for observability.
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct ConvertStats {
    pub filtered_callouts: u32,
    pub deduped_blocks: u32,
    pub skipped_fragments: u32,
}

/// Per-conversion state: the marker mint, the deferred-block sidecar, and
/// counters. Owned by one request and dropped with it.
#[derive(Debug)]
pub struct Conversion {
    mint: MarkerMint,
    pub deferred: BTreeMap<String, Vec<Block>>,
    pub stats: ConvertStats,
    pub has_videos: bool,
}

impl Conversion {
    pub fn new() -> Self {
        Self {
            mint: MarkerMint::new(),
            deferred: BTreeMap::new(),
            stats: ConvertStats::default(),
            has_videos: false,
        }
    }

    pub fn mint_marker(&mut self) -> String {
        self.mint.mint()
    }
}

impl Default for Conversion {
    fn default() -> Self {
        Self::new()
    }
}

/// Wrap a block type into a bare block object the API accepts on create.
pub(crate) fn block_of(block_type: BlockType) -> Block {
    Block {
        object: Some("block".to_string()),
        block_type,
        ..Default::default()
    }
}

/// Convert a whole document: walk, dedupe and filter, then collect deferred
/// blocks into the conversion's sidecar. The returned stream is upload-ready.
pub fn convert_document(html: &str, ctx: &mut Conversion) -> Vec<Block> {
    let stream = walker::walk_document(html, ctx);
    let stream = dedupe::dedupe_and_filter(stream, &mut ctx.stats);
    let mut sidecar = std::mem::take(&mut ctx.deferred);
    let kept = collect_deferred(stream, &mut sidecar);
    ctx.deferred = sidecar;
    kept.into_iter().map(|d| d.block).collect()
}
