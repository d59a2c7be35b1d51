//! Post-upload validation comparator.
//!
//! Canonicalizes the source HTML and the created page's text the same way,
//! measures how much of the source survived (token LCS or Jaccard over
//! shingles), and writes the result back as page properties.

use std::collections::BTreeMap;
use std::collections::HashSet;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use notion_client::endpoints::Client as NotionClient;
use notion_client::endpoints::pages::update::request::UpdatePagePropertiesRequest;
use notion_client::objects::page::PageProperty;
use scraper::{ElementRef, Html};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::config::ValidationConfig;
use crate::nesting_orchestrator::{OrchestrateError, page_plain_text};

/// Bump when canonicalization rules change; stored with every result.
pub const CANONICALIZATION_VERSION: &str = "v1";

/// Token cap per side for the LCS table.
const LCS_TOKEN_CAP: usize = 8192;

/// A run of missing tokens must be at least this long to count as a span;
/// shorter gaps are formatting noise.
const MIN_SPAN_TOKENS: usize = 3;

const SPAN_SAMPLE_LIMIT: usize = 5;

const CHROME_TAGS: &[&str] = &[
    "nav", "footer", "header", "script", "style", "noscript", "button", "form",
];

const CHROME_CLASS_WORDS: &[&str] = &[
    "breadcrumb",
    "toolbar",
    "banner",
    "sidebar",
    "feedback",
    "pagination",
    "zdocsbreadcrumbs",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationMethod {
    Lcs,
    Jaccard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationStatus {
    Complete,
    Attention,
}

/// The record returned in responses and written to page properties.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationOutcome {
    pub coverage: f64,
    #[serde(rename = "missingCount")]
    pub missing_count: usize,
    #[serde(rename = "missingSpans")]
    pub missing_spans: Vec<String>,
    pub method: ValidationMethod,
    pub canonicalization: &'static str,
    pub status: ValidationStatus,
    #[serde(rename = "runId")]
    pub run_id: String,
    #[serde(rename = "checkedAt")]
    pub checked_at: DateTime<Utc>,
}

/// Canonicalize source HTML: strip tags and chrome, decode entities,
/// collapse whitespace.
pub fn canonicalize_source(html: &str) -> String {
    let doc = Html::parse_document(html);
    let root = crate::h2n::walker::content_root_of(&doc);
    let mut out = String::new();
    if let Some(root) = root {
        collect_text(root, &mut out);
    }
    canonicalize_text(&out)
}

fn collect_text(el: ElementRef, out: &mut String) {
    if CHROME_TAGS.contains(&el.value().name()) {
        return;
    }
    let classes = el.value().attr("class").unwrap_or("").to_ascii_lowercase();
    if CHROME_CLASS_WORDS
        .iter()
        .any(|word| classes.split(|c: char| !c.is_ascii_alphanumeric()).any(|w| w == *word))
    {
        return;
    }
    for node in el.children() {
        if let Some(child) = ElementRef::wrap(node) {
            collect_text(child, out);
        } else if let Some(text) = node.value().as_text() {
            out.push_str(text);
            out.push(' ');
        }
    }
}

/// Shared whitespace normalization applied to both sides.
pub fn canonicalize_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Compare canonicalized source against canonicalized page text.
pub fn compare(source: &str, page: &str, method: ValidationMethod) -> (f64, Vec<String>) {
    match method {
        ValidationMethod::Lcs => compare_lcs(source, page),
        ValidationMethod::Jaccard => compare_jaccard(source, page),
    }
}

fn compare_lcs(source: &str, page: &str) -> (f64, Vec<String>) {
    let mut src_tokens: Vec<&str> = source.split_whitespace().collect();
    let mut page_tokens: Vec<&str> = page.split_whitespace().collect();
    if src_tokens.is_empty() {
        return (1.0, Vec::new());
    }
    if src_tokens.len() > LCS_TOKEN_CAP || page_tokens.len() > LCS_TOKEN_CAP {
        debug!(
            "token cap reached ({} source, {} page); comparing the first {LCS_TOKEN_CAP}",
            src_tokens.len(),
            page_tokens.len()
        );
        src_tokens.truncate(LCS_TOKEN_CAP);
        page_tokens.truncate(LCS_TOKEN_CAP);
    }

    let total = src_tokens.len();
    let mut matched = 0usize;
    let mut spans = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    for step in diff::slice(&src_tokens, &page_tokens) {
        match step {
            diff::Result::Both(..) => {
                matched += 1;
                flush_span(&mut current, &mut spans);
            }
            diff::Result::Left(token) => current.push(token),
            diff::Result::Right(_) => {}
        }
    }
    flush_span(&mut current, &mut spans);
    (matched as f64 / total as f64, spans)
}

fn flush_span<'a>(current: &mut Vec<&'a str>, spans: &mut Vec<String>) {
    if current.len() >= MIN_SPAN_TOKENS {
        spans.push(current.join(" "));
    }
    current.clear();
}

fn compare_jaccard(source: &str, page: &str) -> (f64, Vec<String>) {
    let src_tokens: Vec<&str> = source.split_whitespace().collect();
    let page_tokens: Vec<&str> = page.split_whitespace().collect();
    if src_tokens.is_empty() {
        return (1.0, Vec::new());
    }
    if src_tokens.len() < 3 {
        // Too short to shingle; fall back to containment.
        let covered = page.contains(source);
        return if covered {
            (1.0, Vec::new())
        } else {
            (0.0, vec![source.to_string()])
        };
    }

    let page_shingles: HashSet<String> = shingles(&page_tokens).collect();
    let src_shingles: Vec<String> = shingles(&src_tokens).collect();
    let total = src_shingles.len();
    let mut matched = 0usize;
    let mut spans = Vec::new();
    let mut run_start: Option<usize> = None;
    for (i, shingle) in src_shingles.iter().enumerate() {
        if page_shingles.contains(shingle) {
            matched += 1;
            if let Some(start) = run_start.take() {
                push_shingle_span(&src_tokens, start, i, &mut spans);
            }
        } else if run_start.is_none() {
            run_start = Some(i);
        }
    }
    if let Some(start) = run_start {
        push_shingle_span(&src_tokens, start, src_shingles.len(), &mut spans);
    }
    (matched as f64 / total as f64, spans)
}

fn shingles<'a>(tokens: &'a [&'a str]) -> impl Iterator<Item = String> + 'a {
    tokens.windows(3).map(|w| w.join(" "))
}

fn push_shingle_span(tokens: &[&str], start: usize, end: usize, spans: &mut Vec<String>) {
    // A run of missing shingles [start, end) covers tokens start..end+2.
    let token_end = (end + 2).min(tokens.len());
    if token_end.saturating_sub(start) >= MIN_SPAN_TOKENS {
        spans.push(tokens[start..token_end].join(" "));
    }
}

/// Build the outcome for a source/page text pair.
pub fn evaluate(source_canon: &str, page_canon: &str, config: &ValidationConfig) -> ValidationOutcome {
    let (coverage, mut spans) = compare(source_canon, page_canon, config.method);
    let missing_count = spans.len();
    spans.truncate(SPAN_SAMPLE_LIMIT);
    for span in &mut spans {
        if span.chars().count() > 200 {
            *span = span.chars().take(200).collect();
        }
    }
    let status = if coverage >= config.coverage_threshold && missing_count <= config.max_missing {
        ValidationStatus::Complete
    } else {
        ValidationStatus::Attention
    };
    ValidationOutcome {
        coverage: (coverage * 10_000.0).round() / 10_000.0,
        missing_count,
        missing_spans: spans,
        method: config.method,
        canonicalization: CANONICALIZATION_VERSION,
        status,
        run_id: Uuid::new_v4().simple().to_string(),
        checked_at: Utc::now(),
    }
}

/// Fetch the created page's text and validate it against the source HTML.
pub async fn validate_page(
    client: &NotionClient,
    page_id: &str,
    source_html: &str,
    config: &ValidationConfig,
) -> Result<ValidationOutcome, OrchestrateError> {
    let source_canon = canonicalize_source(source_html);
    let page_text = page_plain_text(client, page_id).await?;
    let page_canon = canonicalize_text(&page_text);
    let outcome = evaluate(&source_canon, &page_canon, config);
    info!(
        "validated page {page_id}: coverage {:.4}, {} missing span(s), {:?}",
        outcome.coverage, outcome.missing_count, outcome.status
    );
    Ok(outcome)
}

/// Write the outcome to the page's properties. Properties the database does
/// not define are rejected by Notion; failures here never fail the request.
pub async fn write_validation_properties(
    client: &NotionClient,
    page_id: &str,
    outcome: &ValidationOutcome,
) {
    let mut properties: BTreeMap<String, Option<PageProperty>> = BTreeMap::new();
    let entries = [
        ("Coverage", json!({ "type": "number", "number": outcome.coverage })),
        (
            "MissingCount",
            json!({ "type": "number", "number": outcome.missing_count }),
        ),
        (
            "Method",
            rich_text_property(match outcome.method {
                ValidationMethod::Lcs => "lcs",
                ValidationMethod::Jaccard => "jaccard",
            }),
        ),
        (
            "MissingSpans",
            rich_text_property(&truncate(&outcome.missing_spans.join("; "), 1800)),
        ),
        ("RunId", rich_text_property(&outcome.run_id)),
        (
            "Status",
            json!({
                "type": "select",
                "select": { "name": match outcome.status {
                    ValidationStatus::Complete => "Complete",
                    ValidationStatus::Attention => "Attention",
                } },
            }),
        ),
        (
            "LastChecked",
            json!({
                "type": "date",
                "date": { "start": outcome.checked_at.to_rfc3339() },
            }),
        ),
    ];
    for (name, value) in entries {
        match serde_json::from_value::<PageProperty>(value) {
            Ok(property) => {
                properties.insert(name.to_string(), Some(property));
            }
            Err(err) => debug!("skipping property {name}: {err}"),
        }
    }
    if properties.is_empty() {
        return;
    }
    let request = UpdatePagePropertiesRequest {
        properties,
        in_trash: None,
        icon: None,
        cover: None,
    };
    if let Err(err) = client.pages.update_page_properties(page_id, request).await {
        warn!("validation property write on page {page_id} failed: {err}");
    }
}

fn rich_text_property(content: &str) -> serde_json::Value {
    json!({
        "type": "rich_text",
        "rich_text": [{
            "type": "text",
            "text": { "content": content, "link": null },
        }],
    })
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn config(method: ValidationMethod) -> ValidationConfig {
        ValidationConfig {
            method,
            ..ValidationConfig::default()
        }
    }

    #[test]
    fn identical_text_has_full_coverage() {
        let outcome = evaluate(
            "install the plugin and restart",
            "install the plugin and restart",
            &config(ValidationMethod::Lcs),
        );
        assert_eq!(outcome.coverage, 1.0);
        assert_eq!(outcome.missing_count, 0);
        assert_eq!(outcome.status, ValidationStatus::Complete);
    }

    #[test]
    fn missing_tail_is_reported() {
        let source = "step one step two step three and then the final warning block here";
        let page = "step one step two step three";
        let outcome = evaluate(source, page, &config(ValidationMethod::Lcs));
        assert!(outcome.coverage < 1.0);
        assert_eq!(outcome.status, ValidationStatus::Attention);
        assert_eq!(outcome.missing_count, 1);
        assert!(outcome.missing_spans[0].contains("final warning"));
    }

    #[test]
    fn jaccard_detects_full_coverage() {
        let text = "alpha beta gamma delta epsilon";
        let outcome = evaluate(text, text, &config(ValidationMethod::Jaccard));
        assert_eq!(outcome.coverage, 1.0);
        assert_eq!(outcome.status, ValidationStatus::Complete);
    }

    #[test]
    fn jaccard_reports_missing_middle() {
        let source = "one two three four five six seven eight nine ten";
        let page = "one two three eight nine ten";
        let outcome = evaluate(source, page, &config(ValidationMethod::Jaccard));
        assert!(outcome.coverage < 1.0);
        assert!(outcome.missing_count >= 1);
    }

    #[test]
    fn canonicalize_source_drops_chrome() {
        let html = r#"<html><body><nav>Home / Docs</nav><article><p>Real content here.</p></article><footer>Legal</footer></body></html>"#;
        let canon = canonicalize_source(html);
        assert!(canon.contains("Real content here."));
        assert!(!canon.contains("Legal"));
        assert!(!canon.contains("Home / Docs"));
    }

    #[test]
    fn empty_source_is_fully_covered() {
        let outcome = evaluate("", "anything", &config(ValidationMethod::Lcs));
        assert_eq!(outcome.coverage, 1.0);
    }

    #[test]
    fn whitespace_canonicalization_collapses() {
        assert_eq!(canonicalize_text("a\n  b\t c"), "a b c");
    }
}
