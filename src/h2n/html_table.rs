//! Table conversion.
//!
//! Notion tables host only rich text, so anything block-shaped inside a
//! cell is pulled out: figures turn into `See "<caption>"` references in
//! the cell and bare images into a bullet glyph, while the evicted content
//! (images, lists, nested tables, code) is re-emitted as sibling blocks
//! directly after the table.

use notion_client::objects::block::{Block, BlockType, TableRowsValue, TableValue};
use notion_client::objects::rich_text::RichText;
use scraper::{ElementRef, Selector};

use crate::limits::{MAX_RICH_TEXT_ITEMS, split_long_runs};
use crate::util::entities::clean_text;

use super::html_media::{blocks_for_image, block_for_media};
use super::html_text::{ParseOptions, parse_fragment_with};
use super::walker::is_block_level;
use super::{Conversion, block_of};

const CELL_BULLET: &str = "\u{2022}";

/// Convert a `<table>` subtree into a table block followed by any content
/// evicted from its cells.
pub fn convert_table(el: ElementRef, ctx: &mut Conversion) -> Vec<Block> {
    let row_sel = Selector::parse("tr").expect("tr selector");
    let mut trailing: Vec<Block> = Vec::new();
    let mut rows: Vec<Vec<Vec<RichText>>> = Vec::new();
    let mut has_column_header = false;

    for row in el.select(&row_sel).filter(|row| owning_table_is(*row, el)) {
        let mut cells = Vec::new();
        let mut all_header_cells = true;
        for cell in row.children().filter_map(ElementRef::wrap) {
            match cell.value().name() {
                "td" => all_header_cells = false,
                "th" => {}
                _ => continue,
            }
            cells.push(convert_cell(cell, &mut trailing, ctx));
        }
        if cells.is_empty() {
            continue;
        }
        if rows.is_empty() && (in_thead(row) || all_header_cells) {
            has_column_header = true;
        }
        rows.push(cells);
    }

    if rows.is_empty() {
        return trailing;
    }

    let width = rows.iter().map(Vec::len).max().unwrap_or(1).max(1);
    let children: Vec<Block> = rows
        .into_iter()
        .map(|mut cells| {
            cells.resize_with(width, Vec::new);
            block_of(BlockType::TableRow {
                table_row: TableRowsValue { cells },
            })
        })
        .collect();

    let table = block_of(BlockType::Table {
        table: TableValue {
            table_width: width as u32,
            has_column_header,
            has_row_header: false,
            children: Some(children),
        },
    });

    let mut out = vec![table];
    out.append(&mut trailing);
    out
}

/// True when `table` is the nearest table ancestor of `row`. Rows of a
/// table nested inside a cell belong to that inner table only.
fn owning_table_is(row: ElementRef, table: ElementRef) -> bool {
    let mut node = row.parent();
    while let Some(current) = node {
        if let Some(ancestor) = ElementRef::wrap(current) {
            if ancestor.value().name() == "table" {
                return ancestor.id() == table.id();
            }
        }
        node = current.parent();
    }
    true
}

fn in_thead(row: ElementRef) -> bool {
    row.parent()
        .and_then(ElementRef::wrap)
        .map(|p| p.value().name() == "thead")
        .unwrap_or(false)
}

/// Convert one cell. The cell keeps its text portion: figures become
/// `See ...` references, bare images the bullet glyph, paragraph text joins
/// in place. Every other block-level child is converted and queued as a
/// sibling block after the table.
fn convert_cell(cell: ElementRef, trailing: &mut Vec<Block>, ctx: &mut Conversion) -> Vec<RichText> {
    let mut inline = String::new();
    collect_cell_nodes(cell, &mut inline, trailing, ctx);

    let parsed = parse_fragment_with(
        &inline,
        &ParseOptions {
            image_placeholder: Some(CELL_BULLET),
        },
    );
    for image in &parsed.images {
        trailing.extend(blocks_for_image(image));
    }
    for media in &parsed.media {
        trailing.push(block_for_media(media, ctx));
    }

    let mut runs = split_long_runs(trim_cell_runs(parsed.rich_text));
    runs.truncate(MAX_RICH_TEXT_ITEMS);
    runs
}

/// Gather a cell's inline HTML, evicting block-level content along the way.
fn collect_cell_nodes(
    el: ElementRef,
    inline: &mut String,
    trailing: &mut Vec<Block>,
    ctx: &mut Conversion,
) {
    for node in el.children() {
        let Some(child) = ElementRef::wrap(node) else {
            if let Some(text) = node.value().as_text() {
                let raw: &str = text;
                inline.push_str(&html_escape::encode_text(raw));
            }
            continue;
        };
        match child.value().name() {
            "figure" => {
                let reference = evict_figure(child, trailing);
                inline.push_str(&html_escape::encode_text(&reference));
            }
            // Paragraphs are the cell's text portion.
            "p" => {
                if !inline.trim().is_empty() {
                    inline.push_str("<br>");
                }
                collect_cell_nodes(child, inline, trailing, ctx);
            }
            _ if is_block_level(child) => {
                let mut drafts = Vec::new();
                super::walker::dispatch_element(child, ctx, &mut drafts);
                for draft in drafts {
                    match draft.marker {
                        Some(id) => ctx.deferred.entry(id).or_default().push(draft.block),
                        None => trailing.push(draft.block),
                    }
                }
            }
            _ => inline.push_str(&child.html()),
        }
    }
}

/// Pull a figure out of a cell: image and caption go after the table, the
/// cell keeps a `See ...` reference. Figures without an image keep their
/// visible text.
fn evict_figure(figure: ElementRef, trailing: &mut Vec<Block>) -> String {
    let img_sel = Selector::parse("img").expect("img selector");
    let caption_sel = Selector::parse("figcaption").expect("figcaption selector");
    if figure.select(&img_sel).next().is_none() {
        return clean_text(&figure.text().collect::<String>());
    }
    let caption = figure
        .select(&caption_sel)
        .next()
        .map(|c| clean_text(&c.text().collect::<String>()))
        .or_else(|| {
            figure
                .select(&img_sel)
                .next()
                .and_then(|img| img.value().attr("alt"))
                .map(clean_text)
        })
        .filter(|c| !c.trim().is_empty());
    trailing.extend(super::html_media::convert_figure(figure));
    match caption {
        Some(text) => format!("See \"{}\"", text.trim()),
        None => "See image below".to_string(),
    }
}

/// Drop leading/trailing whitespace noise introduced by cell markup.
fn trim_cell_runs(runs: Vec<RichText>) -> Vec<RichText> {
    let mut out: Vec<RichText> = Vec::with_capacity(runs.len());
    let last_index = runs.len().saturating_sub(1);
    for (i, run) in runs.into_iter().enumerate() {
        let Some(content) = crate::richtext::run_content(&run) else {
            out.push(run);
            continue;
        };
        let trimmed = match (i == 0, i == last_index) {
            (true, true) => content.trim().to_string(),
            (true, false) => content.trim_start().to_string(),
            (false, true) => content.trim_end().to_string(),
            (false, false) => content.to_string(),
        };
        if !trimmed.is_empty() {
            out.push(crate::richtext::with_content(&run, trimmed));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::richtext::plain_text;
    use pretty_assertions::assert_eq;
    use scraper::Html;

    fn convert(html: &str) -> (Vec<Block>, Conversion) {
        let doc = Html::parse_fragment(html);
        let sel = Selector::parse("table").expect("selector");
        let el = doc.select(&sel).next().expect("table");
        let mut ctx = Conversion::new();
        let blocks = convert_table(el, &mut ctx);
        (blocks, ctx)
    }

    fn table_value(block: &Block) -> &TableValue {
        match &block.block_type {
            BlockType::Table { table } => table,
            _ => panic!("expected table block"),
        }
    }

    fn row_cells(block: &Block) -> &Vec<Vec<RichText>> {
        match &block.block_type {
            BlockType::TableRow { table_row } => &table_row.cells,
            _ => panic!("expected table row"),
        }
    }

    #[test]
    fn image_in_cell_becomes_bullet_and_sibling() {
        let (blocks, _) =
            convert(r#"<table><tr><td><img src="foo.png" alt="x"></td><td>text</td></tr></table>"#);
        let table = table_value(&blocks[0]);
        assert_eq!(table.table_width, 2);
        let rows = table.children.as_ref().expect("rows");
        let cells = row_cells(&rows[0]);
        assert_eq!(plain_text(&cells[0]), "\u{2022}");
        assert_eq!(plain_text(&cells[1]), "text");
        assert!(matches!(blocks[1].block_type, BlockType::Image { .. }));
        // The alt text follows the image as its caption.
        match &blocks[2].block_type {
            BlockType::Paragraph { paragraph } => {
                assert_eq!(plain_text(&paragraph.rich_text), "x")
            }
            _ => panic!("expected caption paragraph"),
        }
    }

    #[test]
    fn thead_sets_column_header() {
        let (blocks, _) = convert(
            "<table><thead><tr><th>A</th><th>B</th></tr></thead><tbody><tr><td>1</td><td>2</td></tr></tbody></table>",
        );
        let table = table_value(&blocks[0]);
        assert!(table.has_column_header);
        assert_eq!(table.children.as_ref().expect("rows").len(), 2);
    }

    #[test]
    fn ragged_rows_are_padded_to_width() {
        let (blocks, _) = convert(
            "<table><tr><td>a</td><td>b</td><td>c</td></tr><tr><td>only</td></tr></table>",
        );
        let table = table_value(&blocks[0]);
        assert_eq!(table.table_width, 3);
        for row in table.children.as_ref().expect("rows") {
            assert_eq!(row_cells(row).len(), 3);
        }
    }

    #[test]
    fn figure_in_cell_becomes_reference() {
        let (blocks, _) = convert(
            r#"<table><tr><td><figure><img src="a.png"><figcaption>Flow chart</figcaption></figure></td></tr></table>"#,
        );
        let table = table_value(&blocks[0]);
        let rows = table.children.as_ref().expect("rows");
        assert_eq!(plain_text(&row_cells(&rows[0])[0]), "See \"Flow chart\"");
        assert!(matches!(blocks[1].block_type, BlockType::Image { .. }));
    }

    #[test]
    fn block_content_in_cell_is_evicted_after_table() {
        let (blocks, _) = convert(
            "<table><tbody><tr><td><p>Options</p><ul><li>one</li><li>two</li></ul></td><td>plain</td></tr></tbody></table>",
        );
        let table = table_value(&blocks[0]);
        let rows = table.children.as_ref().expect("rows");
        assert_eq!(plain_text(&row_cells(&rows[0])[0]), "Options");
        assert_eq!(plain_text(&row_cells(&rows[0])[1]), "plain");
        assert_eq!(blocks.len(), 3);
        assert!(matches!(
            blocks[1].block_type,
            BlockType::BulletedListItem { .. }
        ));
        assert!(matches!(
            blocks[2].block_type,
            BlockType::BulletedListItem { .. }
        ));
    }

    #[test]
    fn nested_table_in_cell_is_evicted_after_table() {
        let (blocks, _) = convert(
            "<table><tbody><tr><td>outer<table><tbody><tr><td>inner</td></tr></tbody></table></td></tr></tbody></table>",
        );
        let table = table_value(&blocks[0]);
        let rows = table.children.as_ref().expect("rows");
        assert_eq!(plain_text(&row_cells(&rows[0])[0]), "outer");
        assert!(matches!(blocks[1].block_type, BlockType::Table { .. }));
    }

    #[test]
    fn empty_table_emits_nothing() {
        let (blocks, _) = convert("<table></table>");
        assert!(blocks.is_empty());
    }
}
