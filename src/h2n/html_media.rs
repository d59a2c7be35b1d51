//! Image, video, and embed conversion.
//!
//! Notion's image block carries no caption in the client library's object
//! model, so captions ride along as an italic paragraph directly after the
//! image block.

use notion_client::objects::block::{Block, BlockType, EmbedValue, ImageValue, VideoValue};
use notion_client::objects::file::{ExternalFile, File};
use notion_client::objects::rich_text::Annotations;
use scraper::{ElementRef, Selector};

use crate::richtext::annotated_run;
use crate::util::entities::clean_text;
use crate::util::urls::{IframeKind, absolutize_url, classify_iframe_src};

use super::html_text::{ExtractedImage, ExtractedMedia};
use super::{Conversion, block_of};

/// Build an image block with an external source URL.
pub fn image_block(url: &str) -> Block {
    let external = ExternalFile {
        url: url.to_string(),
    };
    block_of(BlockType::Image {
        image: ImageValue {
            file_type: File::External { external },
        },
    })
}

/// Build the italic caption paragraph that follows an image.
pub fn caption_paragraph(caption: &str) -> Option<Block> {
    let trimmed = caption.trim();
    if trimmed.is_empty() {
        return None;
    }
    let annotations = Annotations {
        italic: true,
        ..Default::default()
    };
    Some(super::html_paragraph::paragraph_block(vec![annotated_run(
        trimmed,
        annotations,
        None,
    )]))
}

/// Build a video block with an external source URL.
pub fn video_block(url: &str) -> Block {
    let external = ExternalFile {
        url: url.to_string(),
    };
    block_of(BlockType::Video {
        video: VideoValue {
            file_type: File::External { external },
        },
    })
}

/// Build an embed block.
pub fn embed_block(url: &str) -> Block {
    block_of(BlockType::Embed {
        embed: EmbedValue {
            url: url.to_string(),
        },
    })
}

/// Blocks for one extracted image: the image plus its caption, if any.
pub fn blocks_for_image(image: &ExtractedImage) -> Vec<Block> {
    let mut out = vec![image_block(&image.url)];
    out.extend(caption_paragraph(&image.alt));
    out
}

/// Block for one extracted iframe, recording video presence on the
/// conversion.
pub fn block_for_media(media: &ExtractedMedia, ctx: &mut Conversion) -> Block {
    if media.kind.is_video() {
        ctx.has_videos = true;
    }
    match media.kind {
        IframeKind::YouTube => video_block(&media.url),
        IframeKind::VideoHost | IframeKind::Embed => embed_block(&media.url),
    }
}

/// Sibling blocks for everything a fragment parse extracted.
pub fn sidecar_blocks(
    images: &[ExtractedImage],
    media: &[ExtractedMedia],
    ctx: &mut Conversion,
) -> Vec<Block> {
    let mut out = Vec::new();
    for image in images {
        out.extend(blocks_for_image(image));
    }
    for item in media {
        out.push(block_for_media(item, ctx));
    }
    out
}

/// Convert a standalone `<figure>`: the nested `<img>` becomes an image
/// block, the `<figcaption>` its caption.
pub fn convert_figure(el: ElementRef) -> Vec<Block> {
    let img_sel = Selector::parse("img").expect("img selector");
    let caption_sel = Selector::parse("figcaption").expect("figcaption selector");
    let Some(img) = el.select(&img_sel).next() else {
        return Vec::new();
    };
    let Some(src) = img.value().attr("src") else {
        return Vec::new();
    };
    let caption = el
        .select(&caption_sel)
        .next()
        .map(|c| clean_text(&c.text().collect::<String>()))
        .or_else(|| img.value().attr("alt").map(clean_text))
        .unwrap_or_default();
    let mut out = vec![image_block(&absolutize_url(src))];
    out.extend(caption_paragraph(&caption));
    out
}

/// Convert a standalone `<iframe>` element.
pub fn convert_iframe(el: ElementRef, ctx: &mut Conversion) -> Option<Block> {
    let src = el.value().attr("src")?;
    let url = absolutize_url(src);
    let kind = classify_iframe_src(&url);
    Some(block_for_media(
        &ExtractedMedia { url, kind },
        ctx,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use scraper::Html;

    #[test]
    fn youtube_iframe_becomes_video_and_flags_conversion() {
        let doc = Html::parse_fragment(
            r#"<iframe src="https://www.youtube.com/embed/abc123"></iframe>"#,
        );
        let sel = Selector::parse("iframe").expect("selector");
        let el = doc.select(&sel).next().expect("iframe");
        let mut ctx = Conversion::new();
        let block = convert_iframe(el, &mut ctx).expect("block");
        assert!(matches!(block.block_type, BlockType::Video { .. }));
        assert!(ctx.has_videos);
    }

    #[test]
    fn other_hosts_become_embeds() {
        let doc =
            Html::parse_fragment(r#"<iframe src="https://player.vimeo.com/video/9"></iframe>"#);
        let sel = Selector::parse("iframe").expect("selector");
        let el = doc.select(&sel).next().expect("iframe");
        let mut ctx = Conversion::new();
        let block = convert_iframe(el, &mut ctx).expect("block");
        assert!(matches!(block.block_type, BlockType::Embed { .. }));
        assert!(ctx.has_videos);
    }

    #[test]
    fn figure_with_caption_emits_image_then_caption() {
        let doc = Html::parse_fragment(
            r#"<figure><img src="/docs/pic.png" alt="alt text"><figcaption>The picture</figcaption></figure>"#,
        );
        let sel = Selector::parse("figure").expect("selector");
        let el = doc.select(&sel).next().expect("figure");
        let blocks = convert_figure(el);
        assert_eq!(blocks.len(), 2);
        assert!(matches!(blocks[0].block_type, BlockType::Image { .. }));
        match &blocks[1].block_type {
            BlockType::Paragraph { paragraph } => {
                assert_eq!(
                    crate::richtext::plain_text(&paragraph.rich_text),
                    "The picture"
                );
            }
            _ => panic!("expected caption paragraph"),
        }
    }

    #[test]
    fn figure_without_img_emits_nothing() {
        let doc = Html::parse_fragment("<figure><figcaption>empty</figcaption></figure>");
        let sel = Selector::parse("figure").expect("selector");
        let el = doc.select(&sel).next().expect("figure");
        assert!(convert_figure(el).is_empty());
    }
}
