//! Wire types for the HTTP surface.

use notion_client::objects::block::Block;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::ValidationConfig;
use crate::h2n::ConvertStats;
use crate::nesting_orchestrator::OrchestrationReport;
use crate::page_validator::{ValidationMethod, ValidationOutcome};

/// Body of `POST /api/W2N` and `PATCH /api/W2N/:pageId`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConvertRequest {
    pub title: Option<String>,
    pub content: Option<String>,
    pub content_html: Option<String>,
    pub database_id: Option<String>,
    pub url: Option<String>,
    #[serde(default)]
    pub properties: Map<String, Value>,
    pub icon: Option<Value>,
    pub cover: Option<Value>,
    #[serde(default)]
    pub dry_run: bool,
    pub validation: Option<ValidationOverrides>,
}

impl ConvertRequest {
    /// The HTML payload; `contentHtml` wins over `content`.
    pub fn html(&self) -> Option<&str> {
        self.content_html
            .as_deref()
            .or(self.content.as_deref())
            .filter(|s| !s.trim().is_empty())
    }

    /// Apply per-request validation overrides to the configured defaults.
    pub fn validation_config(&self, defaults: &ValidationConfig) -> ValidationConfig {
        let mut config = defaults.clone();
        if let Some(overrides) = &self.validation {
            if let Some(method) = overrides.method {
                config.method = method;
            }
            if let Some(threshold) = overrides.coverage_threshold {
                config.coverage_threshold = threshold;
            }
            if let Some(max_missing) = overrides.max_missing {
                config.max_missing = max_missing;
            }
        }
        config
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationOverrides {
    pub method: Option<ValidationMethod>,
    pub coverage_threshold: Option<f64>,
    pub max_missing: Option<usize>,
}

/// Body of `POST /api/validate`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateRequest {
    pub page_id: Option<String>,
    pub content: Option<String>,
    pub content_html: Option<String>,
    pub validation: Option<ValidationOverrides>,
}

/// Body of `POST /api/fetch-and-upload`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchUploadRequest {
    pub url: String,
    pub file_name: Option<String>,
}

/// Body of `POST /api/upload-to-notion`: base64 content or a data URI.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectUploadRequest {
    pub data: String,
    pub file_name: Option<String>,
    pub content_type: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct Envelope<T: Serialize> {
    pub success: bool,
    pub data: T,
}

impl<T: Serialize> Envelope<T> {
    pub fn ok(data: T) -> axum::Json<Self> {
        axum::Json(Self {
            success: true,
            data,
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageSummary {
    pub id: String,
    pub url: String,
    pub title: String,
}

/// Success payload for a conversion.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConvertData {
    pub page_url: String,
    pub page: PageSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation_result: Option<ValidationOutcome>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    pub stats: ConvertStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub orchestration: Option<OrchestrationReport>,
}

/// Success payload for a dry run: the computed blocks, nothing written.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DryRunData {
    pub dry_run: bool,
    pub children: Vec<Block>,
    pub has_videos: bool,
    pub stats: ConvertStats,
}
