//! Deferred-nesting orchestrator and marker sweep.
//!
//! After the page exists, every sidecar entry is resolved: find the block
//! whose rich text carries the marker token, append the deferred blocks as
//! its children, then rewrite the host's rich text without the token. A
//! final sweep removes any token the orchestrator could not resolve.

use std::collections::BTreeMap;
use std::collections::VecDeque;
use std::time::Duration;

use log::{info, warn};
use notion_client::NotionClientError;
use notion_client::endpoints::Client as NotionClient;
use notion_client::objects::block::{Block, BlockType};
use notion_client::objects::rich_text::RichText;
use tokio::time::sleep;

use crate::limits::MAX_CHILDREN_PER_REQUEST;
use crate::marker::{MARKER_TOKEN_RE, marker_token, strip_all_tokens, strip_token};
use crate::notion_ext::{NotionHttp, NotionHttpError};
use crate::page_uploader::PageUploader;
use crate::richtext::plain_text;

/// Depth cap for the descendant scan. Content nests shallowly; the cap
/// guards against pathological pages.
const MAX_SCAN_DEPTH: usize = 5;

/// Settling delay before the sweep reads blocks the orchestrator just wrote.
pub const SWEEP_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, thiserror::Error)]
pub enum OrchestrateError {
    #[error("notion api error: {0}")]
    NotionApi(#[from] NotionClientError),

    #[error("notion http error: {0}")]
    Http(#[from] NotionHttpError),
}

pub type Result<T> = std::result::Result<T, OrchestrateError>;

/// How orchestration went. Orphaned markers and append failures degrade to
/// warnings; the page itself stays valid.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct OrchestrationReport {
    pub resolved: usize,
    pub orphaned: Vec<String>,
    pub warnings: Vec<String>,
    pub swept_blocks: usize,
}

pub struct Orchestrator<'a> {
    client: &'a NotionClient,
    ext: &'a NotionHttp,
}

impl<'a> Orchestrator<'a> {
    pub fn new(client: &'a NotionClient, ext: &'a NotionHttp) -> Self {
        Self { client, ext }
    }

    /// Resolve every marker in the sidecar. Two passes: content appended by
    /// an earlier marker can itself host a later one.
    pub async fn run(
        &self,
        page_id: &str,
        sidecar: BTreeMap<String, Vec<Block>>,
    ) -> Result<OrchestrationReport> {
        let mut report = OrchestrationReport::default();
        if sidecar.is_empty() {
            return Ok(report);
        }
        info!("orchestrating {} marker(s) on page {page_id}", sidecar.len());
        let uploader = PageUploader::new(self.client);

        let mut pending = sidecar;
        for pass in 0..2 {
            if pending.is_empty() {
                break;
            }
            let descendants = list_descendants(self.client, page_id).await?;
            let mut unresolved = BTreeMap::new();
            for (id, blocks) in pending {
                let token = marker_token(&id);
                let host = descendants.iter().find(|block| {
                    rich_text_of(block)
                        .map(|(_, rich)| plain_text(rich).contains(&token))
                        .unwrap_or(false)
                });
                let Some(host) = host else {
                    unresolved.insert(id, blocks);
                    continue;
                };
                let Some(host_id) = host.id.clone() else {
                    unresolved.insert(id, blocks);
                    continue;
                };
                match self
                    .append_deferred(&uploader, &host_id, blocks)
                    .await
                {
                    Ok(()) => {
                        self.erase_token(host, &host_id, &token, &mut report).await;
                        report.resolved += 1;
                    }
                    Err(err) => {
                        warn!("deferred append for marker {id} failed: {err}");
                        report
                            .warnings
                            .push(format!("marker {id}: deferred content lost ({err})"));
                    }
                }
            }
            pending = unresolved;
            if pass == 1 {
                for id in pending.keys() {
                    warn!("marker {id} has no host block; content orphaned");
                    report.orphaned.push(id.clone());
                }
                pending = BTreeMap::new();
            }
        }
        Ok(report)
    }

    async fn append_deferred(
        &self,
        uploader: &PageUploader<'_>,
        host_id: &str,
        blocks: Vec<Block>,
    ) -> std::result::Result<(), crate::page_uploader::UploadError> {
        for chunk in blocks.chunks(MAX_CHILDREN_PER_REQUEST) {
            uploader.append_with_retry(host_id, chunk.to_vec()).await?;
        }
        Ok(())
    }

    /// Strip the token from the host's rich text and push the update.
    async fn erase_token(
        &self,
        host: &Block,
        host_id: &str,
        token: &str,
        report: &mut OrchestrationReport,
    ) {
        let Some((type_name, rich)) = rich_text_of(host) else {
            return;
        };
        let Some(stripped) = strip_token(rich, token) else {
            return;
        };
        if let Err(err) = self
            .ext
            .update_block_rich_text(host_id, type_name, &stripped)
            .await
        {
            warn!("token erase on block {host_id} failed: {err}");
            report
                .warnings
                .push(format!("block {host_id}: token erase failed ({err})"));
        }
    }

    /// Sweep any residual marker tokens from the whole page. Returns how
    /// many blocks were rewritten.
    pub async fn sweep(&self, page_id: &str) -> Result<usize> {
        sleep(SWEEP_DELAY).await;
        let descendants = list_descendants(self.client, page_id).await?;
        let mut swept = 0;
        for block in &descendants {
            let Some((type_name, rich)) = rich_text_of(block) else {
                continue;
            };
            if !MARKER_TOKEN_RE.is_match(&plain_text(rich)) {
                continue;
            }
            let Some(block_id) = block.id.as_deref() else {
                continue;
            };
            let Some(stripped) = strip_all_tokens(rich) else {
                continue;
            };
            match self
                .ext
                .update_block_rich_text(block_id, type_name, &stripped)
                .await
            {
                Ok(()) => swept += 1,
                Err(err) => warn!("sweep update on block {block_id} failed: {err}"),
            }
        }
        if swept > 0 {
            info!("sweep rewrote {swept} block(s) on page {page_id}");
        }
        Ok(swept)
    }
}

/// Breadth-first fetch of every descendant block of a page, in document
/// order per level, with pagination.
pub async fn list_descendants(client: &NotionClient, root_id: &str) -> Result<Vec<Block>> {
    let mut out = Vec::new();
    let mut queue = VecDeque::new();
    queue.push_back((root_id.to_string(), 0usize));
    while let Some((parent_id, depth)) = queue.pop_front() {
        if depth > MAX_SCAN_DEPTH {
            continue;
        }
        let mut cursor: Option<String> = None;
        loop {
            let response = client
                .blocks
                .retrieve_block_children(&parent_id, cursor.as_deref(), Some(100))
                .await?;
            for block in &response.results {
                if block.has_children == Some(true) {
                    if let Some(id) = block.id.clone() {
                        queue.push_back((id, depth + 1));
                    }
                }
            }
            out.extend(response.results);
            if response.has_more {
                cursor = response.next_cursor.clone();
                if cursor.is_none() {
                    break;
                }
            } else {
                break;
            }
        }
    }
    Ok(out)
}

/// Concatenated plain text of every descendant block, in scan order. Used
/// by the validation comparator.
pub async fn page_plain_text(client: &NotionClient, page_id: &str) -> Result<String> {
    let descendants = list_descendants(client, page_id).await?;
    let mut out = String::new();
    for block in &descendants {
        if let Some((_, rich)) = rich_text_of(block) {
            let text = plain_text(rich);
            if !text.trim().is_empty() {
                out.push_str(&text);
                out.push('\n');
            }
        }
        if let BlockType::TableRow { table_row } = &block.block_type {
            for cell in &table_row.cells {
                let text = plain_text(cell);
                if !text.trim().is_empty() {
                    out.push_str(&text);
                    out.push('\n');
                }
            }
        }
    }
    Ok(out)
}

/// The block's rich text plus its wire type name, for the update call.
pub(crate) fn rich_text_of(block: &Block) -> Option<(&'static str, &Vec<RichText>)> {
    match &block.block_type {
        BlockType::Paragraph { paragraph } => Some(("paragraph", &paragraph.rich_text)),
        BlockType::Heading1 { heading_1 } => Some(("heading_1", &heading_1.rich_text)),
        BlockType::Heading2 { heading_2 } => Some(("heading_2", &heading_2.rich_text)),
        BlockType::Heading3 { heading_3 } => Some(("heading_3", &heading_3.rich_text)),
        BlockType::BulletedListItem { bulleted_list_item } => {
            Some(("bulleted_list_item", &bulleted_list_item.rich_text))
        }
        BlockType::NumberedListItem { numbered_list_item } => {
            Some(("numbered_list_item", &numbered_list_item.rich_text))
        }
        BlockType::Callout { callout } => Some(("callout", &callout.rich_text)),
        BlockType::Quote { quote } => Some(("quote", &quote.rich_text)),
        BlockType::Toggle { toggle } => Some(("toggle", &toggle.rich_text)),
        BlockType::ToDo { to_do } => Some(("to_do", &to_do.rich_text)),
        _ => None,
    }
}
