//! Page upload pipeline.
//!
//! Creates the page with the first hundred blocks and appends the rest in
//! hundred-block chunks, pacing calls and retrying the conflict statuses
//! Notion emits when writes land too quickly. Append failures after a
//! successful create degrade to warnings so the caller still gets the page.

use std::collections::BTreeMap;
use std::time::Duration;

use log::{info, warn};
use notion_client::NotionClientError;
use notion_client::endpoints::Client as NotionClient;
use notion_client::endpoints::blocks::append::request::AppendBlockChildrenRequest;
use notion_client::endpoints::pages::create::request::CreateAPageRequest;
use notion_client::objects::block::Block;
use notion_client::objects::page::{Page, PageProperty};
use notion_client::objects::parent::Parent;
use tokio::time::sleep;

use crate::limits::MAX_CHILDREN_PER_REQUEST;

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("notion api error: {0}")]
    NotionApi(#[from] NotionClientError),
}

pub type Result<T> = std::result::Result<T, UploadError>;

/// Configuration for upload pacing.
#[derive(Debug, Clone)]
pub struct UploaderConfig {
    /// Delay between write calls, keeping under Notion's ~3 writes/s.
    pub api_call_delay_ms: u64,
    /// Bounded retries for 409/429 conflicts.
    pub max_retries: u32,
}

impl Default for UploaderConfig {
    fn default() -> Self {
        Self {
            api_call_delay_ms: 350,
            max_retries: 4,
        }
    }
}

/// What the upload produced. Chunk failures are warnings, not errors.
#[derive(Debug, Clone)]
pub struct UploadOutcome {
    pub page_id: String,
    pub page_url: String,
    pub chunks_appended: usize,
    pub warnings: Vec<String>,
}

pub struct PageUploader<'a> {
    client: &'a NotionClient,
    config: UploaderConfig,
}

impl<'a> PageUploader<'a> {
    pub fn new(client: &'a NotionClient) -> Self {
        Self {
            client,
            config: UploaderConfig::default(),
        }
    }

    pub fn with_config(client: &'a NotionClient, config: UploaderConfig) -> Self {
        Self { client, config }
    }

    /// Create a page in a database with the first block chunk, then append
    /// the remaining chunks in order. Icon and cover travel separately via
    /// the raw page-update endpoint.
    pub async fn create_page(
        &self,
        database_id: &str,
        properties: BTreeMap<String, PageProperty>,
        blocks: Vec<Block>,
    ) -> Result<UploadOutcome> {
        let mut chunks = blocks.chunks(MAX_CHILDREN_PER_REQUEST);
        let first: Vec<Block> = chunks.next().map(|c| c.to_vec()).unwrap_or_default();

        let request = CreateAPageRequest {
            parent: Parent::DatabaseId {
                database_id: database_id.to_string(),
            },
            properties,
            icon: None,
            cover: None,
            children: if first.is_empty() { None } else { Some(first) },
        };
        let page = self.create_with_retry(request).await?;
        info!("created page {} ({} blocks total)", page.id, blocks.len());

        let remaining: Vec<Vec<Block>> = chunks.map(|c| c.to_vec()).collect();
        let (chunks_appended, warnings) = self.append_chunks(&page.id, remaining, 1).await;

        Ok(UploadOutcome {
            page_id: page.id.clone(),
            page_url: page.url.clone(),
            chunks_appended,
            warnings,
        })
    }

    /// Append every block to an existing page in hundred-block chunks.
    /// Used by the update path, which has no create phase.
    pub async fn append_all(&self, page_id: &str, blocks: Vec<Block>) -> (usize, Vec<String>) {
        let chunks: Vec<Vec<Block>> = blocks
            .chunks(MAX_CHILDREN_PER_REQUEST)
            .map(|c| c.to_vec())
            .collect();
        self.append_chunks(page_id, chunks, 0).await
    }

    async fn append_chunks(
        &self,
        page_id: &str,
        chunks: Vec<Vec<Block>>,
        index_offset: usize,
    ) -> (usize, Vec<String>) {
        let mut appended = 0;
        let mut warnings = Vec::new();
        for (i, chunk) in chunks.into_iter().enumerate() {
            let chunk_index = i + index_offset;
            self.pace().await;
            match self.append_with_retry(page_id, chunk).await {
                Ok(()) => appended += 1,
                Err(err) => {
                    warn!("append chunk {chunk_index} failed: {err}");
                    warnings.push(format!("append chunk {chunk_index} failed: {err}"));
                }
            }
        }
        (appended, warnings)
    }

    async fn pace(&self) {
        if self.config.api_call_delay_ms > 0 {
            sleep(Duration::from_millis(self.config.api_call_delay_ms)).await;
        }
    }

    async fn create_with_retry(&self, request: CreateAPageRequest) -> Result<Page> {
        let mut attempt = 0;
        loop {
            match self.client.pages.create_a_page(request.clone()).await {
                Ok(page) => return Ok(page),
                Err(err) if attempt < self.config.max_retries && is_transient(&err) => {
                    attempt += 1;
                    warn!("page create hit a transient error, retry {attempt}: {err}");
                    sleep(Duration::from_millis(300 * u64::from(attempt))).await;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Append one chunk of at most a hundred blocks, retrying transient
    /// conflict statuses.
    pub async fn append_with_retry(&self, parent_id: &str, chunk: Vec<Block>) -> Result<()> {
        if chunk.is_empty() {
            return Ok(());
        }
        let mut attempt = 0;
        loop {
            let request = AppendBlockChildrenRequest {
                children: chunk.clone(),
                position: None,
            };
            match self
                .client
                .blocks
                .append_block_children(parent_id, request)
                .await
            {
                Ok(_) => return Ok(()),
                Err(err) if attempt < self.config.max_retries && is_transient(&err) => {
                    attempt += 1;
                    warn!("append to {parent_id} hit a transient error, retry {attempt}: {err}");
                    sleep(Duration::from_millis(300 * u64::from(attempt))).await;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }
}

fn is_transient(err: &NotionClientError) -> bool {
    match err {
        NotionClientError::InvalidStatusCode { error } => {
            error.status == 409 || error.status == 429 || error.status >= 500
        }
        _ => false,
    }
}
