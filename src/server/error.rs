//! API error envelope.
//!
//! Every failure leaves the service as
//! `{ "success": false, "error": { code, message, details } }` with a
//! status the caller can branch on: 400 for payload problems, 404 for
//! unknown pages or databases, 500 for everything internal.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::{Value, json};

use crate::nesting_orchestrator::OrchestrateError;
use crate::notion_ext::NotionHttpError;
use crate::page_uploader::UploadError;

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: String,
    pub message: String,
    pub details: Option<Value>,
}

impl ApiError {
    pub fn bad_request(code: &str, message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code: code.to_string(),
            message: message.into(),
            details: None,
        }
    }

    pub fn not_found(code: &str, message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            code: code.to_string(),
            message: message.into(),
            details: None,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "INTERNAL_ERROR".to_string(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({
            "success": false,
            "error": {
                "code": self.code,
                "message": self.message,
                "details": self.details,
            },
        });
        (self.status, Json(body)).into_response()
    }
}

impl From<notion_client::NotionClientError> for ApiError {
    fn from(err: notion_client::NotionClientError) -> Self {
        match &err {
            notion_client::NotionClientError::InvalidStatusCode { error } => {
                status_mapped(error.status as u16, err.to_string())
            }
            _ => ApiError::internal(format!("notion client error: {err}")),
        }
    }
}

impl From<NotionHttpError> for ApiError {
    fn from(err: NotionHttpError) -> Self {
        match &err {
            NotionHttpError::Api { status, .. } => status_mapped(*status, err.to_string()),
            _ => ApiError::internal(format!("notion http error: {err}")),
        }
    }
}

impl From<UploadError> for ApiError {
    fn from(err: UploadError) -> Self {
        match err {
            UploadError::NotionApi(inner) => inner.into(),
        }
    }
}

impl From<OrchestrateError> for ApiError {
    fn from(err: OrchestrateError) -> Self {
        match err {
            OrchestrateError::NotionApi(inner) => inner.into(),
            OrchestrateError::Http(inner) => inner.into(),
        }
    }
}

fn status_mapped(status: u16, message: String) -> ApiError {
    match status {
        400 => ApiError {
            status: StatusCode::BAD_REQUEST,
            code: "NOTION_VALIDATION".to_string(),
            message,
            details: None,
        },
        401 | 403 => ApiError {
            status: StatusCode::BAD_REQUEST,
            code: "NOTION_UNAUTHORIZED".to_string(),
            message,
            details: None,
        },
        404 => ApiError::not_found("NOTION_NOT_FOUND", message),
        _ => ApiError::internal(message),
    }
}
