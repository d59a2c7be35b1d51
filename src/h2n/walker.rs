//! Document walker.
//!
//! Walks the DOM in source order from a content root chosen by a priority
//! selector list and dispatches every element by tag and class to the
//! specialized converters. Output order is strictly the source order; media
//! extracted from inline content is emitted directly after the block that
//! contained it.

use log::{debug, warn};
use notion_client::objects::rich_text::RichText;
use scraper::{ElementRef, Html, Selector};

use crate::richtext::plain_text;

use super::html_callout::{
    CalloutKind, callout_block, is_callout_class, is_gray_chrome, kind_for_classes, kind_for_label,
    shape_prereq_text,
};
use super::html_media::sidecar_blocks;
use super::html_paragraph::paragraph_blocks;
use super::html_text::{ParsedFragment, parse_fragment};
use super::{Conversion, DraftBlock};

/// Selectors tried in order to locate the documentation body. The document
/// body is the fallback.
const CONTENT_ROOT_SELECTORS: &[&str] = &[
    "div.zDocsTopicPageBody div.body",
    "div.zDocsTopicPageBody",
    "article.dita",
    "div.body.conbody",
    "main article",
    "article",
    "main",
    "body",
];

/// Elements never worth converting.
const SKIPPED_TAGS: &[&str] = &[
    "script", "style", "nav", "header", "footer", "noscript", "button", "form", "input", "br",
    "hr", "template", "link", "meta",
];

/// Convert a full document into the draft block stream.
pub fn walk_document(html: &str, ctx: &mut Conversion) -> Vec<DraftBlock> {
    let doc = Html::parse_document(html);
    let root = content_root_of(&doc);
    let mut out = Vec::new();
    match root {
        Some(root) => walk_container(root, ctx, &mut out),
        None => debug!("document has no content root; emitting nothing"),
    }
    out
}

/// The element the walk starts from. Shared with the validator so both
/// sides canonicalize the same subtree.
pub(crate) fn content_root_of(doc: &Html) -> Option<ElementRef<'_>> {
    for selector in CONTENT_ROOT_SELECTORS {
        let parsed = match Selector::parse(selector) {
            Ok(parsed) => parsed,
            Err(_) => continue,
        };
        if let Some(found) = doc.select(&parsed).next() {
            return Some(found);
        }
    }
    doc.root_element().into()
}

/// True when an element opens a block context of its own.
pub(crate) fn is_block_level(el: ElementRef) -> bool {
    match el.value().name() {
        "p" | "ul" | "ol" | "dl" | "dt" | "dd" | "table" | "figure" | "iframe" | "pre"
        | "blockquote" | "aside" | "section" | "article" | "h1" | "h2" | "h3" | "h4" | "h5"
        | "h6" => true,
        "div" => {
            is_callout_class(el.value().attr("class").unwrap_or(""))
                || has_block_descendants(el)
        }
        _ => false,
    }
}

fn has_block_descendants(el: ElementRef) -> bool {
    el.children()
        .filter_map(ElementRef::wrap)
        .any(|child| is_block_level(child) || has_block_descendants(child))
}

/// Walk a container: inline runs between block-level children become
/// paragraphs in place, block-level children dispatch recursively.
fn walk_container(el: ElementRef, ctx: &mut Conversion, out: &mut Vec<DraftBlock>) {
    let mut inline = String::new();
    for node in el.children() {
        if let Some(child) = ElementRef::wrap(node) {
            if is_block_level(child) {
                flush_inline(&mut inline, ctx, out, true);
                dispatch_element(child, ctx, out);
                continue;
            }
            if SKIPPED_TAGS.contains(&child.value().name()) {
                if child.value().name() == "br" {
                    inline.push_str("<br>");
                }
                continue;
            }
            inline.push_str(&child.html());
        } else if let Some(text) = node.value().as_text() {
            // Text nodes come back decoded; re-escape so the fragment
            // parser's tag stripping cannot eat literal angle brackets.
            let raw: &str = text;
            inline.push_str(&html_escape::encode_text(raw));
        }
    }
    flush_inline(&mut inline, ctx, out, true);
}

/// Emit the buffered inline HTML as a paragraph (or labeled callout), then
/// any media it contained.
fn flush_inline(
    inline: &mut String,
    ctx: &mut Conversion,
    out: &mut Vec<DraftBlock>,
    allow_label: bool,
) {
    if inline.trim().is_empty() {
        inline.clear();
        return;
    }
    let parsed = parse_fragment(inline);
    inline.clear();
    emit_parsed(parsed, ctx, out, allow_label);
}

fn emit_parsed(
    parsed: ParsedFragment,
    ctx: &mut Conversion,
    out: &mut Vec<DraftBlock>,
    allow_label: bool,
) {
    let text = plain_text(&parsed.rich_text);
    if !text.trim().is_empty() {
        let labeled = allow_label.then(|| kind_for_label(&text)).flatten();
        match labeled {
            Some(kind) => out.push(DraftBlock::new(callout_block(parsed.rich_text.clone(), kind))),
            None => out.extend(
                paragraph_blocks(parsed.rich_text.clone())
                    .into_iter()
                    .map(DraftBlock::new),
            ),
        }
    }
    for block in sidecar_blocks(&parsed.images, &parsed.media, ctx) {
        out.push(DraftBlock::new(block));
    }
}

/// The dispatch table: one element, one converter.
pub(crate) fn dispatch_element(el: ElementRef, ctx: &mut Conversion, out: &mut Vec<DraftBlock>) {
    let name = el.value().name();
    match name {
        "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
            let level: u8 = name[1..].parse().unwrap_or(3);
            let parsed = parse_fragment(&el.inner_html());
            if !plain_text(&parsed.rich_text).trim().is_empty() {
                out.push(DraftBlock::new(super::html_heading::heading_block(
                    level,
                    parsed.rich_text.clone(),
                )));
            }
            for block in sidecar_blocks(&parsed.images, &parsed.media, ctx) {
                out.push(DraftBlock::new(block));
            }
        }
        "p" => {
            if has_block_descendants(el) {
                walk_container(el, ctx, out);
            } else {
                emit_parsed(parse_fragment(&el.inner_html()), ctx, out, true);
            }
        }
        "div" => {
            let classes = el.value().attr("class").unwrap_or("");
            if is_callout_class(classes) {
                convert_callout(el, kind_for_classes(classes), ctx, out);
            } else {
                walk_container(el, ctx, out);
            }
        }
        "aside" => convert_callout(el, kind_for_classes(el.value().attr("class").unwrap_or("")), ctx, out),
        "section" => {
            let classes = el.value().attr("class").unwrap_or("");
            if classes.split_whitespace().any(|c| c == "prereq") {
                convert_prereq(el, ctx, out);
            } else {
                walk_container(el, ctx, out);
            }
        }
        "pre" => match super::html_code::convert_pre(el) {
            Some(block) => out.push(DraftBlock::new(block)),
            None => ctx.stats.skipped_fragments += 1,
        },
        "iframe" => match super::html_media::convert_iframe(el, ctx) {
            Some(block) => out.push(DraftBlock::new(block)),
            None => {
                warn!("iframe without src skipped");
                ctx.stats.skipped_fragments += 1;
            }
        },
        "figure" => {
            let blocks = super::html_media::convert_figure(el);
            if blocks.is_empty() {
                ctx.stats.skipped_fragments += 1;
            }
            out.extend(blocks.into_iter().map(DraftBlock::new));
        }
        "img" => {
            if let Some(src) = el.value().attr("src") {
                out.push(DraftBlock::new(super::html_media::image_block(
                    &crate::util::urls::absolutize_url(src),
                )));
            }
        }
        "table" => {
            out.extend(
                super::html_table::convert_table(el, ctx)
                    .into_iter()
                    .map(DraftBlock::new),
            );
        }
        "ul" => out.extend(super::html_list::convert_list(el, false, ctx)),
        "ol" => out.extend(super::html_list::convert_list(el, true, ctx)),
        "dl" => {
            for child in el.children().filter_map(ElementRef::wrap) {
                match child.value().name() {
                    "dt" => convert_term(child, out),
                    "dd" => walk_container(child, ctx, out),
                    _ => {}
                }
            }
        }
        "dt" => convert_term(el, out),
        "dd" | "blockquote" | "article" => walk_container(el, ctx, out),
        skipped if SKIPPED_TAGS.contains(&skipped) => {}
        other => {
            // Unknown container: recurse when block children exist,
            // otherwise a single paragraph.
            debug!("unknown element <{other}>, walking generically");
            if has_block_descendants(el) {
                walk_container(el, ctx, out);
            } else {
                emit_parsed(parse_fragment(&el.inner_html()), ctx, out, false);
            }
        }
    }
}

/// `<dt>` renders as a bold paragraph.
fn convert_term(el: ElementRef, out: &mut Vec<DraftBlock>) {
    let parsed = parse_fragment(&el.inner_html());
    if plain_text(&parsed.rich_text).trim().is_empty() {
        return;
    }
    let bolded: Vec<RichText> = parsed.rich_text.iter().map(embolden).collect();
    out.extend(paragraph_blocks(bolded).into_iter().map(DraftBlock::new));
}

fn embolden(run: &RichText) -> RichText {
    match run {
        RichText::Text {
            text,
            annotations,
            plain_text,
            href,
        } => {
            let mut ann = annotations.clone().unwrap_or_default();
            ann.bold = true;
            RichText::Text {
                text: text.clone(),
                annotations: Some(ann),
                plain_text: plain_text.clone(),
                href: href.clone(),
            }
        }
        other => other.clone(),
    }
}

/// Convert a note container to a callout, with gray chrome detection.
fn convert_callout(
    el: ElementRef,
    kind: CalloutKind,
    ctx: &mut Conversion,
    out: &mut Vec<DraftBlock>,
) {
    let kind = if is_gray_chrome(el.value().attr("style")) {
        CalloutKind::CHROME
    } else {
        kind
    };
    let parsed = parse_fragment(&el.inner_html());
    let text = plain_text(&parsed.rich_text);
    if text.trim().is_empty() {
        ctx.stats.skipped_fragments += 1;
    } else {
        out.push(DraftBlock::new(callout_block(parsed.rich_text.clone(), kind)));
    }
    for block in sidecar_blocks(&parsed.images, &parsed.media, ctx) {
        out.push(DraftBlock::new(block));
    }
}

/// `section.prereq` becomes a pushpin callout with shaped text.
fn convert_prereq(el: ElementRef, ctx: &mut Conversion, out: &mut Vec<DraftBlock>) {
    let parsed = parse_fragment(&el.inner_html());
    let text = shape_prereq_text(&plain_text(&parsed.rich_text));
    if text.trim().is_empty() {
        ctx.stats.skipped_fragments += 1;
        return;
    }
    out.push(DraftBlock::new(callout_block(
        vec![crate::richtext::text_run(&text)],
        CalloutKind::PREREQ,
    )));
    for block in sidecar_blocks(&parsed.images, &parsed.media, ctx) {
        out.push(DraftBlock::new(block));
    }
}
