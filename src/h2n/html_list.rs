//! List conversion.
//!
//! Notion caps create-request nesting at two levels below a list item and
//! forbids several block types as list-item children outright. Items whose
//! source content crosses either line get a marker token appended to their
//! rich text; the offending blocks ride the sidecar and are re-parented by
//! the orchestrator once the page exists.

use log::debug;
use notion_client::objects::block::{
    Block, BlockType, BulletedListItemValue, NumberedListItemValue, TextColor,
};
use notion_client::objects::rich_text::RichText;
use scraper::ElementRef;

use crate::limits::{MAX_RICH_TEXT_ITEMS, split_long_runs};
use crate::marker::marker_token;
use crate::richtext::{plain_text, text_run};

use super::html_media::{block_for_media, image_block};
use super::html_paragraph::paragraph_block;
use super::html_text::parse_fragment;
use super::walker::is_block_level;
use super::{Conversion, DraftBlock, block_of};

/// Convert a `<ul>` or `<ol>` into a run of list-item draft blocks.
pub fn convert_list(el: ElementRef, ordered: bool, ctx: &mut Conversion) -> Vec<DraftBlock> {
    let mut out = Vec::new();
    for li in el
        .children()
        .filter_map(ElementRef::wrap)
        .filter(|e| e.value().name() == "li")
    {
        out.extend(convert_list_item(li, ordered, ctx));
    }
    out
}

/// Convert one `<li>`: the item itself followed by any deferred blocks that
/// must be re-parented under it after upload.
fn convert_list_item(li: ElementRef, ordered: bool, ctx: &mut Conversion) -> Vec<DraftBlock> {
    let (inline_html, block_children) = split_item(li);
    let parsed = parse_fragment(&inline_html);

    let mut runs = non_empty_runs(parsed.rich_text);
    let mut children: Vec<Block> = Vec::new();
    let mut deferred: Vec<Block> = Vec::new();

    for image in &parsed.images {
        children.push(image_block(&image.url));
    }
    for media in &parsed.media {
        deferred.push(block_for_media(media, ctx));
    }

    for child in block_children {
        dispatch_item_child(child, ctx, &mut children, &mut deferred);
    }

    let marker = if deferred.is_empty() {
        None
    } else {
        let id = ctx.mint_marker();
        runs.push(token_run(&runs, &id));
        debug!(
            "deferring {} block(s) under list item via marker {id}",
            deferred.len()
        );
        Some(id)
    };

    let mut runs = split_long_runs(runs);
    if runs.len() > MAX_RICH_TEXT_ITEMS {
        let overflow = runs.split_off(MAX_RICH_TEXT_ITEMS);
        children.insert(0, paragraph_block(overflow));
    }

    let item = list_item_block(ordered, runs, children);
    let mut out = vec![DraftBlock::new(item)];
    if let Some(id) = marker {
        out.extend(
            deferred
                .into_iter()
                .map(|block| DraftBlock::deferred(block, id.clone())),
        );
    }
    out
}

/// Route one block-level child of an item to direct children or the
/// deferred set, per Notion's permitted-child rules.
fn dispatch_item_child(
    child: ElementRef,
    ctx: &mut Conversion,
    children: &mut Vec<Block>,
    deferred: &mut Vec<Block>,
) {
    match child.value().name() {
        "ul" => convert_nested_list(child, false, ctx, children, deferred),
        "ol" => convert_nested_list(child, true, ctx, children, deferred),
        "p" => {
            let parsed = parse_fragment(&child.inner_html());
            let runs = non_empty_runs(parsed.rich_text);
            if !plain_text(&runs).trim().is_empty() {
                children.push(paragraph_block(split_long_runs(runs)));
            }
            for image in &parsed.images {
                children.push(image_block(&image.url));
            }
            for media in &parsed.media {
                deferred.push(block_for_media(media, ctx));
            }
        }
        "figure" => {
            for block in super::html_media::convert_figure(child) {
                children.push(block);
            }
        }
        "img" => {
            if let Some(src) = child.value().attr("src") {
                children.push(image_block(&crate::util::urls::absolutize_url(src)));
            }
        }
        "iframe" => {
            if let Some(block) = super::html_media::convert_iframe(child, ctx) {
                deferred.push(block);
            }
        }
        "table" => deferred.append(&mut super::html_table::convert_table(child, ctx)),
        "pre" => deferred.extend(super::html_code::convert_pre(child)),
        "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
            let level: u8 = child.value().name()[1..].parse().unwrap_or(3);
            let parsed = parse_fragment(&child.inner_html());
            deferred.push(super::html_heading::heading_block(
                level,
                non_empty_runs(parsed.rich_text),
            ));
        }
        "div" | "aside" | "section" => {
            // Note containers and anything else div-shaped cannot nest under
            // a list item; walk them as standalone drafts and defer.
            let mut drafts = Vec::new();
            super::walker::dispatch_element(child, ctx, &mut drafts);
            for draft in drafts {
                match draft.marker {
                    Some(id) => ctx.deferred.entry(id).or_default().push(draft.block),
                    None => deferred.push(draft.block),
                }
            }
        }
        other => {
            debug!("flattening unexpected <{other}> inside list item");
            let parsed = parse_fragment(&child.inner_html());
            let runs = non_empty_runs(parsed.rich_text);
            if !plain_text(&runs).trim().is_empty() {
                children.push(paragraph_block(split_long_runs(runs)));
            }
        }
    }
}

/// Convert a nested list one level down. Items that stay within the
/// two-level ceiling become direct children; items that exceed it are
/// deferred whole.
fn convert_nested_list(
    el: ElementRef,
    ordered: bool,
    ctx: &mut Conversion,
    children: &mut Vec<Block>,
    deferred: &mut Vec<Block>,
) {
    for li in el
        .children()
        .filter_map(ElementRef::wrap)
        .filter(|e| e.value().name() == "li")
    {
        convert_nested_item(li, ordered, ctx, children, deferred);
    }
}

fn convert_nested_item(
    li: ElementRef,
    ordered: bool,
    ctx: &mut Conversion,
    children: &mut Vec<Block>,
    deferred: &mut Vec<Block>,
) {
    let (inline_html, block_children) = split_item(li);
    let parsed = parse_fragment(&inline_html);
    let mut runs = non_empty_runs(parsed.rich_text);
    let mut grandchildren: Vec<Block> = Vec::new();
    let mut overflow: Vec<Block> = Vec::new();

    for image in &parsed.images {
        grandchildren.push(image_block(&image.url));
    }
    for media in &parsed.media {
        overflow.push(block_for_media(media, ctx));
    }

    for child in block_children {
        match child.value().name() {
            // Paragraph content folds into the item's own text.
            "p" => {
                let nested = parse_fragment(&child.inner_html());
                let text = plain_text(&nested.rich_text);
                if !text.trim().is_empty() {
                    if !runs.is_empty() {
                        runs.push(text_run("\n"));
                    }
                    runs.extend(non_empty_runs(nested.rich_text));
                }
                for image in &nested.images {
                    grandchildren.push(image_block(&image.url));
                }
                for media in &nested.media {
                    overflow.push(block_for_media(media, ctx));
                }
            }
            "img" => {
                if let Some(src) = child.value().attr("src") {
                    grandchildren.push(image_block(&crate::util::urls::absolutize_url(src)));
                }
            }
            "figure" => grandchildren.extend(super::html_media::convert_figure(child)),
            "table" => overflow.append(&mut super::html_table::convert_table(child, ctx)),
            "pre" => overflow.extend(super::html_code::convert_pre(child)),
            "ul" => {
                let drafts = convert_list(child, false, ctx);
                overflow.extend(flatten_drafts(drafts, ctx));
            }
            "ol" => {
                let drafts = convert_list(child, true, ctx);
                overflow.extend(flatten_drafts(drafts, ctx));
            }
            _ => {
                let mut drafts = Vec::new();
                super::walker::dispatch_element(child, ctx, &mut drafts);
                overflow.extend(flatten_drafts(drafts, ctx));
            }
        }
    }

    let runs = split_long_runs(runs);
    let item = list_item_block(ordered, runs, grandchildren);
    if overflow.is_empty() {
        children.push(item);
    } else {
        // Beyond the ceiling: the whole nested item rides the sidecar.
        deferred.push(item);
        deferred.append(&mut overflow);
    }
}

/// Resolve nested drafts whose own markers cannot survive inside deferred
/// content: their deferred blocks are folded back inline.
fn flatten_drafts(drafts: Vec<DraftBlock>, _ctx: &mut Conversion) -> Vec<Block> {
    drafts.into_iter().map(|d| d.block).collect()
}

fn list_item_block(ordered: bool, rich_text: Vec<RichText>, children: Vec<Block>) -> Block {
    let has_children = !children.is_empty();
    let children = has_children.then_some(children);
    let block_type = if ordered {
        BlockType::NumberedListItem {
            numbered_list_item: NumberedListItemValue {
                rich_text,
                color: TextColor::Default,
                children,
            },
        }
    } else {
        BlockType::BulletedListItem {
            bulleted_list_item: BulletedListItemValue {
                rich_text,
                color: TextColor::Default,
                children,
            },
        }
    };
    let mut block = block_of(block_type);
    if has_children {
        block.has_children = Some(true);
    }
    block
}

/// Split an `<li>` into its inline HTML and its block-level child elements,
/// preserving order on the block side.
fn split_item(li: ElementRef) -> (String, Vec<ElementRef<'_>>) {
    let mut inline = String::new();
    let mut blocks = Vec::new();
    for node in li.children() {
        if let Some(el) = ElementRef::wrap(node) {
            if is_block_level(el) {
                blocks.push(el);
                continue;
            }
            inline.push_str(&el.html());
        } else if let Some(text) = node.value().as_text() {
            let raw: &str = text;
            inline.push_str(&html_escape::encode_text(raw));
        }
    }
    (inline, blocks)
}

/// Drop the placeholder empty run an empty fragment produces.
fn non_empty_runs(runs: Vec<RichText>) -> Vec<RichText> {
    runs.into_iter()
        .filter(|r| crate::richtext::run_content(r).map(|c| !c.is_empty()).unwrap_or(true))
        .collect()
}

/// The marker token as a rich-text run, space-separated from the text.
fn token_run(runs: &[RichText], id: &str) -> RichText {
    let token = marker_token(id);
    let needs_space = plain_text(runs)
        .chars()
        .last()
        .map(|c| !c.is_whitespace())
        .unwrap_or(false);
    if needs_space {
        text_run(&format!(" {token}"))
    } else {
        text_run(&token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marker::MARKER_TOKEN_RE;
    use pretty_assertions::assert_eq;
    use scraper::{Html, Selector};

    fn convert(html: &str) -> (Vec<DraftBlock>, Conversion) {
        let doc = Html::parse_fragment(html);
        let sel = Selector::parse("ul, ol").expect("selector");
        let el = doc.select(&sel).next().expect("list");
        let ordered = el.value().name() == "ol";
        let mut ctx = Conversion::new();
        let drafts = convert_list(el, ordered, &mut ctx);
        (drafts, ctx)
    }

    fn item_text(block: &Block) -> String {
        match &block.block_type {
            BlockType::BulletedListItem { bulleted_list_item } => {
                plain_text(&bulleted_list_item.rich_text)
            }
            BlockType::NumberedListItem { numbered_list_item } => {
                plain_text(&numbered_list_item.rich_text)
            }
            _ => panic!("expected list item"),
        }
    }

    #[test]
    fn simple_items_have_no_markers() {
        let (drafts, _) = convert("<ul><li>one</li><li>two</li></ul>");
        assert_eq!(drafts.len(), 2);
        assert!(drafts.iter().all(|d| d.marker.is_none()));
        assert_eq!(item_text(&drafts[0].block), "one");
    }

    #[test]
    fn table_in_item_takes_the_marker_path() {
        let (drafts, _) = convert(
            "<ol><li>First, configure:<table><tbody><tr><td>a</td><td>b</td></tr></tbody></table></li></ol>",
        );
        assert_eq!(drafts.len(), 2);
        let item = &drafts[0];
        assert!(item.marker.is_none());
        let text = item_text(&item.block);
        assert!(text.starts_with("First, configure:"), "text was {text:?}");
        assert!(MARKER_TOKEN_RE.is_match(&text));
        let table = &drafts[1];
        assert!(table.marker.is_some());
        assert!(matches!(table.block.block_type, BlockType::Table { .. }));
    }

    #[test]
    fn nested_list_stays_within_ceiling() {
        let (drafts, _) =
            convert("<ul><li>outer<ul><li>inner one</li><li>inner two</li></ul></li></ul>");
        assert_eq!(drafts.len(), 1);
        match &drafts[0].block.block_type {
            BlockType::BulletedListItem { bulleted_list_item } => {
                let children = bulleted_list_item.children.as_ref().expect("children");
                assert_eq!(children.len(), 2);
                assert_eq!(item_text(&children[0]), "inner one");
            }
            _ => panic!("expected list item"),
        }
    }

    #[test]
    fn nested_paragraphs_flatten_with_newlines() {
        let (drafts, _) = convert(
            "<ul><li>outer<ul><li>inner<p>detail line</p></li></ul></li></ul>",
        );
        match &drafts[0].block.block_type {
            BlockType::BulletedListItem { bulleted_list_item } => {
                let children = bulleted_list_item.children.as_ref().expect("children");
                assert_eq!(item_text(&children[0]), "inner\ndetail line");
            }
            _ => panic!("expected list item"),
        }
    }

    #[test]
    fn nested_code_defers_the_nested_item() {
        let (drafts, _) = convert(
            "<ul><li>outer<ul><li>inner<pre>x = 1</pre></li></ul></li></ul>",
        );
        // Host item plus the deferred nested item and its code block.
        assert_eq!(drafts.len(), 3);
        assert!(drafts[0].marker.is_none());
        assert!(MARKER_TOKEN_RE.is_match(&item_text(&drafts[0].block)));
        assert!(drafts[1].marker.is_some());
        assert_eq!(drafts[1].marker, drafts[2].marker);
        assert!(matches!(drafts[2].block.block_type, BlockType::Code { .. }));
    }

    #[test]
    fn items_share_one_marker_for_multiple_deferred_blocks() {
        let (drafts, _) = convert(
            "<ol><li>step<pre>a</pre><table><tbody><tr><td>b</td></tr></tbody></table></li></ol>",
        );
        let markers: Vec<_> = drafts.iter().filter_map(|d| d.marker.clone()).collect();
        assert_eq!(markers.len(), 2);
        assert_eq!(markers[0], markers[1]);
    }
}
