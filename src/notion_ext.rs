//! Raw Notion HTTP extension.
//!
//! The typed client covers page creation and child appends; this thin layer
//! covers what it does not: block retrieval/update/delete, database schema
//! fetches as raw JSON, and the three-step file upload flow. Transient
//! statuses (409, 429, 5xx) retry with exponential backoff.

use log::{debug, warn};
use notion_client::objects::rich_text::RichText;
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Duration;
use tokio::time::sleep;

const NOTION_API_BASE: &str = "https://api.notion.com/";
const MAX_RETRIES: u32 = 4;
const RETRY_BASE_DELAY_MS: u64 = 350;

#[derive(Debug, thiserror::Error)]
pub enum NotionHttpError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("invalid Notion URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("notion returned {status}: {body}")]
    Api { status: u16, body: String },
}

pub type Result<T> = std::result::Result<T, NotionHttpError>;

/// Handle returned by the file-upload flow; referenced from block payloads
/// and page properties as `file_upload` objects.
#[derive(Debug, Clone, serde::Serialize)]
pub struct FileUploadHandle {
    #[serde(rename = "fileUploadId")]
    pub file_upload_id: String,
    #[serde(rename = "fileName")]
    pub file_name: String,
}

#[derive(Debug, Deserialize)]
struct CreateFileUploadResponse {
    id: String,
    upload_url: String,
}

#[derive(Clone)]
pub struct NotionHttp {
    http: Client,
    base_url: Url,
    token: String,
    version: String,
}

impl std::fmt::Debug for NotionHttp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotionHttp")
            .field("base_url", &self.base_url)
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

impl NotionHttp {
    pub fn new(token: String, version: String) -> Result<Self> {
        let base_url = Url::parse(NOTION_API_BASE)?;
        let http = Client::builder().build()?;
        Ok(Self {
            http,
            base_url,
            token,
            version,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        Ok(self.base_url.join(path)?)
    }

    async fn send_json(
        &self,
        method: reqwest::Method,
        url: Url,
        body: Option<&Value>,
    ) -> Result<Value> {
        let mut attempt = 0;
        loop {
            let mut request = self
                .http
                .request(method.clone(), url.clone())
                .header("Authorization", format!("Bearer {}", self.token))
                .header("Notion-Version", &self.version);
            if let Some(body) = body {
                request = request.json(body);
            }
            let response = request.send().await?;
            let status = response.status();
            if status.is_success() {
                return Ok(response.json().await?);
            }
            let retryable = status == StatusCode::TOO_MANY_REQUESTS
                || status == StatusCode::CONFLICT
                || status.is_server_error();
            if retryable && attempt < MAX_RETRIES {
                let delay = RETRY_BASE_DELAY_MS * (1 << attempt);
                warn!("notion {} {} returned {status}, retrying in {delay}ms", method, url.path());
                sleep(Duration::from_millis(delay)).await;
                attempt += 1;
                continue;
            }
            let body = response.text().await.unwrap_or_default();
            return Err(NotionHttpError::Api {
                status: status.as_u16(),
                body,
            });
        }
    }

    /// Fetch one block as raw JSON.
    pub async fn retrieve_block(&self, block_id: &str) -> Result<Value> {
        let url = self.endpoint(&format!("v1/blocks/{block_id}"))?;
        self.send_json(reqwest::Method::GET, url, None).await
    }

    /// Replace the rich text of a block. `type_name` is the wire name of the
    /// block type ("paragraph", "bulleted_list_item", ...).
    pub async fn update_block_rich_text(
        &self,
        block_id: &str,
        type_name: &str,
        rich_text: &[RichText],
    ) -> Result<()> {
        let url = self.endpoint(&format!("v1/blocks/{block_id}"))?;
        let body = json!({ type_name: { "rich_text": rich_text } });
        debug!("updating rich text of block {block_id} ({type_name})");
        self.send_json(reqwest::Method::PATCH, url, Some(&body))
            .await?;
        Ok(())
    }

    /// Archive (delete) a block.
    pub async fn delete_block(&self, block_id: &str) -> Result<()> {
        let url = self.endpoint(&format!("v1/blocks/{block_id}"))?;
        self.send_json(reqwest::Method::DELETE, url, None).await?;
        Ok(())
    }

    /// Set a page's icon and/or cover from caller-supplied JSON values.
    pub async fn update_page_meta(
        &self,
        page_id: &str,
        icon: Option<&Value>,
        cover: Option<&Value>,
    ) -> Result<()> {
        let mut body = serde_json::Map::new();
        if let Some(icon) = icon {
            body.insert("icon".to_string(), icon.clone());
        }
        if let Some(cover) = cover {
            body.insert("cover".to_string(), cover.clone());
        }
        if body.is_empty() {
            return Ok(());
        }
        let url = self.endpoint(&format!("v1/pages/{page_id}"))?;
        self.send_json(reqwest::Method::PATCH, url, Some(&Value::Object(body)))
            .await?;
        Ok(())
    }

    /// Fetch a database definition as raw JSON.
    pub async fn retrieve_database(&self, database_id: &str) -> Result<Value> {
        let url = self.endpoint(&format!("v1/databases/{database_id}"))?;
        self.send_json(reqwest::Method::GET, url, None).await
    }

    /// Upload bytes to Notion's file storage: create the upload object,
    /// send the content, return the handle.
    pub async fn upload_bytes(
        &self,
        file_name: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<FileUploadHandle> {
        let create_url = self.endpoint("v1/file_uploads")?;
        let create_body = json!({
            "name": file_name,
            "content_type": content_type,
            "mode": "single_part",
        });
        let created: CreateFileUploadResponse = serde_json::from_value(
            self.send_json(reqwest::Method::POST, create_url, Some(&create_body))
                .await?,
        )
        .map_err(|e| NotionHttpError::Api {
            status: 500,
            body: format!("unexpected file upload response: {e}"),
        })?;

        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(file_name.to_string())
            .mime_str(content_type)?;
        let form = reqwest::multipart::Form::new().part("file", part);
        let send = self
            .http
            .post(&created.upload_url)
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Notion-Version", &self.version)
            .multipart(form)
            .send()
            .await?;
        if !send.status().is_success() {
            let status = send.status().as_u16();
            let body = send.text().await.unwrap_or_default();
            return Err(NotionHttpError::Api { status, body });
        }
        debug!("uploaded file {file_name} as {}", created.id);
        Ok(FileUploadHandle {
            file_upload_id: created.id,
            file_name: file_name.to_string(),
        })
    }

    /// Guess a content type from a file name.
    pub fn content_type_for(file_name: &str) -> &'static str {
        let lower = file_name.to_ascii_lowercase();
        match lower.rsplit('.').next() {
            Some("jpg") | Some("jpeg") => "image/jpeg",
            Some("png") => "image/png",
            Some("gif") => "image/gif",
            Some("svg") => "image/svg+xml",
            Some("webp") => "image/webp",
            Some("mp4") => "video/mp4",
            _ => "application/octet-stream",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn content_types_follow_extension() {
        assert_eq!(NotionHttp::content_type_for("a.PNG"), "image/png");
        assert_eq!(NotionHttp::content_type_for("b.jpeg"), "image/jpeg");
        assert_eq!(
            NotionHttp::content_type_for("weird.bin"),
            "application/octet-stream"
        );
    }

    #[test]
    fn endpoints_join_against_base() {
        let ext = NotionHttp::new("secret".into(), "2022-06-28".into()).expect("client");
        let url = ext.endpoint("v1/blocks/abc").expect("url");
        assert_eq!(url.as_str(), "https://api.notion.com/v1/blocks/abc");
    }
}
