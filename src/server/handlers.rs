//! Endpoint handlers.

use std::collections::BTreeMap;

use axum::Json;
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use log::{info, warn};
use notion_client::objects::page::PageProperty;
use notion_client::objects::rich_text::{RichText, Text};
use serde_json::{Map, Value, json};

use crate::config::ValidationConfig;
use crate::h2n::{Conversion, convert_document};
use crate::nesting_orchestrator::{OrchestrationReport, Orchestrator, list_descendants};
use crate::page_uploader::PageUploader;
use crate::page_validator::{ValidationOutcome, validate_page, write_validation_properties};

use super::AppState;
use super::error::ApiError;
use super::payload::{
    ConvertData, ConvertRequest, DirectUploadRequest, DryRunData, Envelope, FetchUploadRequest,
    PageSummary, ValidateRequest,
};

/// `POST /api/W2N` — convert HTML and create a page.
pub async fn convert(
    State(state): State<AppState>,
    Json(request): Json<ConvertRequest>,
) -> Result<Response, ApiError> {
    let title = request
        .title
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ApiError::bad_request("MISSING_TITLE", "title is required"))?
        .to_string();
    let html = request
        .html()
        .ok_or_else(|| {
            ApiError::bad_request("MISSING_CONTENT", "content or contentHtml is required")
        })?
        .to_string();

    info!("converting \"{title}\" ({} bytes of HTML)", html.len());
    let mut ctx = Conversion::new();
    let blocks = convert_document(&html, &mut ctx);
    info!(
        "conversion produced {} block(s), {} deferred marker(s)",
        blocks.len(),
        ctx.deferred.len()
    );

    if request.dry_run {
        return Ok(Envelope::ok(DryRunData {
            dry_run: true,
            children: blocks,
            has_videos: ctx.has_videos,
            stats: ctx.stats,
        })
        .into_response());
    }

    let database_id = request.database_id.clone().ok_or_else(|| {
        ApiError::bad_request("MISSING_DATABASE", "databaseId is required unless dryRun is set")
    })?;

    let properties = build_properties(&title, request.url.as_deref(), &request.properties)?;
    let uploader = PageUploader::new(&state.notion);
    let outcome = uploader
        .create_page(&database_id, properties, blocks)
        .await?;
    let mut warnings = outcome.warnings.clone();

    if request.icon.is_some() || request.cover.is_some() {
        if let Err(err) = state
            .ext
            .update_page_meta(&outcome.page_id, request.icon.as_ref(), request.cover.as_ref())
            .await
        {
            warn!("icon/cover update failed: {err}");
            warnings.push(format!("icon/cover update failed: {err}"));
        }
    }

    let validation_config = request.validation_config(&state.config.validation);
    let (orchestration, validation_result) = finish_page(
        &state,
        &outcome.page_id,
        &mut ctx,
        &html,
        &validation_config,
        &mut warnings,
    )
    .await;

    Ok(Envelope::ok(ConvertData {
        page_url: outcome.page_url.clone(),
        page: PageSummary {
            id: outcome.page_id,
            url: outcome.page_url,
            title,
        },
        validation_result,
        warnings,
        stats: ctx.stats,
        orchestration,
    })
    .into_response())
}

/// `PATCH /api/W2N/:pageId` — replace an existing page's content.
pub async fn update(
    State(state): State<AppState>,
    Path(page_id): Path<String>,
    Json(request): Json<ConvertRequest>,
) -> Result<Response, ApiError> {
    info!("[PATCH-PROGRESS] STEP 1: payload received for page {page_id}");
    let html = request
        .html()
        .ok_or_else(|| {
            ApiError::bad_request("MISSING_CONTENT", "content or contentHtml is required")
        })?
        .to_string();

    let page = state
        .notion
        .pages
        .retrieve_a_page(&page_id, None)
        .await
        .map_err(ApiError::from)?;
    if page.in_trash {
        return Err(ApiError::bad_request(
            "PAGE_ARCHIVED",
            "target page is archived; unarchive it and retry",
        ));
    }

    let mut ctx = Conversion::new();
    let blocks = convert_document(&html, &mut ctx);
    info!(
        "[PATCH-PROGRESS] STEP 2: converted {} block(s), {} marker(s)",
        blocks.len(),
        ctx.deferred.len()
    );

    let removed = clear_page_children(&state, &page_id).await?;
    info!("[PATCH-PROGRESS] STEP 3: removed {removed} existing block(s)");

    let uploader = PageUploader::new(&state.notion);
    let (chunks, mut warnings) = uploader.append_all(&page_id, blocks).await;
    info!("[PATCH-PROGRESS] STEP 4: appended {chunks} chunk(s)");

    if !request.properties.is_empty() {
        let mut properties = std::collections::BTreeMap::new();
        for (name, value) in &request.properties {
            match coerce_property(value.clone()) {
                Ok(prop) => {
                    properties.insert(name.clone(), Some(prop));
                }
                Err(err) => warnings.push(format!("property \"{name}\" skipped: {err}")),
            }
        }
        let update = notion_client::endpoints::pages::update::request::UpdatePagePropertiesRequest {
            properties,
            in_trash: None,
            icon: None,
            cover: None,
        };
        if let Err(err) = state
            .notion
            .pages
            .update_page_properties(&page_id, update)
            .await
        {
            warn!("property update on page {page_id} failed: {err}");
            warnings.push(format!("property update failed: {err}"));
        }
    }

    let validation_config = request.validation_config(&state.config.validation);
    let (orchestration, validation_result) = finish_page(
        &state,
        &page_id,
        &mut ctx,
        &html,
        &validation_config,
        &mut warnings,
    )
    .await;
    info!("[PATCH-PROGRESS] STEP 5: orchestration and sweep finished");

    let title = request.title.unwrap_or_default();
    Ok(Envelope::ok(ConvertData {
        page_url: page.url.clone(),
        page: PageSummary {
            id: page.id.clone(),
            url: page.url.clone(),
            title,
        },
        validation_result,
        warnings,
        stats: ctx.stats,
        orchestration,
    })
    .into_response())
}

/// Orchestrate deferred content, sweep tokens, then validate. Shared by the
/// create and update paths; every failure downgrades to a warning.
async fn finish_page(
    state: &AppState,
    page_id: &str,
    ctx: &mut Conversion,
    source_html: &str,
    validation_config: &ValidationConfig,
    warnings: &mut Vec<String>,
) -> (Option<OrchestrationReport>, Option<ValidationOutcome>) {
    let orchestrator = Orchestrator::new(&state.notion, &state.ext);
    let sidecar = std::mem::take(&mut ctx.deferred);

    let mut report = match orchestrator.run(page_id, sidecar).await {
        Ok(report) => Some(report),
        Err(err) => {
            warn!("orchestration failed: {err}");
            warnings.push(format!("orchestration failed: {err}"));
            None
        }
    };

    match orchestrator.sweep(page_id).await {
        Ok(swept) => {
            if let Some(report) = report.as_mut() {
                report.swept_blocks = swept;
            }
        }
        Err(err) => {
            warn!("marker sweep failed: {err}");
            warnings.push(format!("marker sweep failed: {err}"));
        }
    }

    let validation = match validate_page(&state.notion, page_id, source_html, validation_config)
        .await
    {
        Ok(outcome) => {
            write_validation_properties(&state.notion, page_id, &outcome).await;
            Some(outcome)
        }
        Err(err) => {
            warn!("validation skipped: {err}");
            warnings.push(format!("validation skipped: {err}"));
            None
        }
    };

    if let Some(report) = &report {
        warnings.extend(report.warnings.iter().cloned());
        for id in &report.orphaned {
            warnings.push(format!("marker {id}: host not found, content orphaned"));
        }
    }
    (report, validation)
}

/// Delete every top-level child of a page. Returns how many went away.
async fn clear_page_children(state: &AppState, page_id: &str) -> Result<usize, ApiError> {
    let mut removed = 0;
    let mut cursor: Option<String> = None;
    let mut ids = Vec::new();
    loop {
        let response = state
            .notion
            .blocks
            .retrieve_block_children(page_id, cursor.as_deref(), Some(100))
            .await
            .map_err(ApiError::from)?;
        ids.extend(response.results.iter().filter_map(|b| b.id.clone()));
        if response.has_more {
            cursor = response.next_cursor.clone();
            if cursor.is_none() {
                break;
            }
        } else {
            break;
        }
    }
    for id in ids {
        match state.ext.delete_block(&id).await {
            Ok(()) => removed += 1,
            Err(err) => warn!("failed to delete block {id}: {err}"),
        }
    }
    Ok(removed)
}

/// `GET /api/databases/:id` — property schema for the mapping UI.
pub async fn database_schema(
    State(state): State<AppState>,
    Path(database_id): Path<String>,
) -> Result<Response, ApiError> {
    let database = state.ext.retrieve_database(&database_id).await?;
    let title = database["title"]
        .as_array()
        .map(|runs| {
            runs.iter()
                .filter_map(|r| r["plain_text"].as_str())
                .collect::<String>()
        })
        .unwrap_or_default();
    let mut properties = Map::new();
    if let Some(props) = database["properties"].as_object() {
        for (name, prop) in props {
            let type_name = prop["type"].as_str().unwrap_or_default();
            let mut entry = json!({
                "id": prop["id"],
                "type": type_name,
            });
            if let Some(options) = prop[type_name]["options"].as_array() {
                entry["options"] = Value::Array(options.clone());
            }
            properties.insert(name.clone(), entry);
        }
    }
    Ok(Envelope::ok(json!({
        "id": database["id"],
        "title": title,
        "properties": properties,
    }))
    .into_response())
}

/// `GET /api/health`.
pub async fn health() -> Response {
    Envelope::ok(json!({
        "status": "ok",
        "version": crate::VERSION,
    }))
    .into_response()
}

/// `GET /health` — legacy shape for old watchdogs.
pub async fn health_legacy() -> Response {
    Json(json!({ "status": "ok" })).into_response()
}

/// `POST /api/fetch-and-upload` — download a URL and push it to Notion's
/// file storage.
pub async fn fetch_and_upload(
    State(state): State<AppState>,
    Json(request): Json<FetchUploadRequest>,
) -> Result<Response, ApiError> {
    let response = state
        .http
        .get(&request.url)
        .send()
        .await
        .map_err(|err| ApiError::bad_request("FETCH_FAILED", err.to_string()))?;
    if !response.status().is_success() {
        return Err(ApiError::bad_request(
            "FETCH_FAILED",
            format!("source returned {}", response.status()),
        ));
    }
    let file_name = request.file_name.clone().unwrap_or_else(|| {
        request
            .url
            .rsplit('/')
            .next()
            .filter(|s| !s.is_empty())
            .unwrap_or("download")
            .split('?')
            .next()
            .unwrap_or("download")
            .to_string()
    });
    let bytes = response
        .bytes()
        .await
        .map_err(|err| ApiError::bad_request("FETCH_FAILED", err.to_string()))?;
    let content_type = crate::notion_ext::NotionHttp::content_type_for(&file_name);
    let handle = state
        .ext
        .upload_bytes(&file_name, content_type, bytes.to_vec())
        .await?;
    Ok(Envelope::ok(handle).into_response())
}

/// `POST /api/upload-to-notion` — accept base64 or a data URI.
pub async fn upload_to_notion(
    State(state): State<AppState>,
    Json(request): Json<DirectUploadRequest>,
) -> Result<Response, ApiError> {
    let (data, uri_type) = match request.data.strip_prefix("data:") {
        Some(rest) => {
            let (meta, payload) = rest.split_once(",").ok_or_else(|| {
                ApiError::bad_request("INVALID_DATA_URI", "malformed data URI")
            })?;
            let mime = meta.split(';').next().unwrap_or_default().to_string();
            (payload.to_string(), Some(mime))
        }
        None => (request.data.clone(), None),
    };
    let bytes = BASE64
        .decode(data.trim())
        .map_err(|err| ApiError::bad_request("INVALID_BASE64", err.to_string()))?;
    let file_name = request.file_name.clone().unwrap_or_else(|| "upload.bin".to_string());
    let content_type = request
        .content_type
        .or(uri_type)
        .unwrap_or_else(|| {
            crate::notion_ext::NotionHttp::content_type_for(&file_name).to_string()
        });
    let handle = state
        .ext
        .upload_bytes(&file_name, &content_type, bytes)
        .await?;
    Ok(Envelope::ok(handle).into_response())
}

/// `POST /api/validate` — run the comparator against an existing page.
pub async fn validate(
    State(state): State<AppState>,
    Json(request): Json<ValidateRequest>,
) -> Result<Response, ApiError> {
    let page_id = request
        .page_id
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("MISSING_PAGE_ID", "pageId is required"))?;
    let html = request
        .content_html
        .as_deref()
        .or(request.content.as_deref())
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| {
            ApiError::bad_request("MISSING_CONTENT", "content or contentHtml is required")
        })?;
    let mut config = state.config.validation.clone();
    if let Some(overrides) = &request.validation {
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
    let outcome = validate_page(&state.notion, page_id, html, &config).await?;
    write_validation_properties(&state.notion, page_id, &outcome).await;
    Ok(Envelope::ok(outcome).into_response())
}

/// `POST /api/compare/:pageId` — comparator with the page id in the path.
pub async fn compare(
    State(state): State<AppState>,
    Path(page_id): Path<String>,
    Json(mut request): Json<ValidateRequest>,
) -> Result<Response, ApiError> {
    request.page_id = Some(page_id);
    validate(State(state), Json(request)).await
}

/// `POST /api/cleanup/:pageId` — sweep residual marker tokens from a page
/// left behind by a cancelled conversion.
pub async fn cleanup(
    State(state): State<AppState>,
    Path(page_id): Path<String>,
) -> Result<Response, ApiError> {
    let orchestrator = Orchestrator::new(&state.notion, &state.ext);
    let swept = orchestrator.sweep(&page_id).await?;
    let scanned = list_descendants(&state.notion, &page_id).await?.len();
    Ok(Envelope::ok(json!({
        "sweptBlocks": swept,
        "scannedBlocks": scanned,
    }))
    .into_response())
}

/// Assemble the page properties: the title, the source URL, then the
/// caller's pre-mapped properties verbatim.
fn build_properties(
    title: &str,
    url: Option<&str>,
    caller: &Map<String, Value>,
) -> Result<BTreeMap<String, PageProperty>, ApiError> {
    let mut properties = BTreeMap::new();
    let title_text = RichText::Text {
        text: Text {
            content: title.to_string(),
            link: None,
        },
        annotations: None,
        plain_text: Some(title.to_string()),
        href: None,
    };
    properties.insert(
        "title".to_string(),
        PageProperty::Title {
            id: None,
            title: vec![title_text],
        },
    );
    if let Some(url) = url.filter(|u| !u.trim().is_empty()) {
        if let Ok(prop) = coerce_property(json!({ "type": "url", "url": url })) {
            properties.insert("URL".to_string(), prop);
        }
    }
    for (name, value) in caller {
        match coerce_property(value.clone()) {
            Ok(prop) => {
                properties.insert(name.clone(), prop);
            }
            Err(err) => {
                return Err(ApiError::bad_request(
                    "INVALID_PROPERTY",
                    format!("property \"{name}\" is not a valid Notion property value"),
                )
                .with_details(json!({ "property": name, "reason": err.to_string() })));
            }
        }
    }
    Ok(properties)
}

/// Deserialize a caller-supplied property value, tolerating payloads that
/// omit the `type` discriminator.
fn coerce_property(value: Value) -> Result<PageProperty, serde_json::Error> {
    match serde_json::from_value::<PageProperty>(value.clone()) {
        Ok(prop) => Ok(prop),
        Err(err) => {
            let Value::Object(map) = &value else {
                return Err(err);
            };
            let keys: Vec<&String> = map.keys().filter(|k| *k != "type" && *k != "id").collect();
            let [only] = keys.as_slice() else {
                return Err(err);
            };
            let mut patched = map.clone();
            patched.insert("type".to_string(), Value::String((*only).clone()));
            serde_json::from_value(Value::Object(patched))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn properties_include_title_and_url() {
        let properties =
            build_properties("My Page", Some("https://x.test/doc"), &Map::new()).expect("props");
        assert!(properties.contains_key("title"));
        assert!(properties.contains_key("URL"));
    }

    #[test]
    fn caller_property_without_type_is_coerced() {
        let prop = coerce_property(json!({ "checkbox": true }));
        assert!(prop.is_ok());
    }

    #[test]
    fn invalid_property_is_rejected() {
        let mut caller = Map::new();
        caller.insert("Broken".to_string(), json!("just a string"));
        let err = build_properties("t", None, &caller).expect_err("should fail");
        assert_eq!(err.code, "INVALID_PROPERTY");
    }
}
