//! Converter for HTML fragments to Notion rich text.
//!
//! The parser does not build a DOM for inline content. It runs two string
//! phases over the fragment: an extraction phase that pulls iframes, images,
//! and links out into sidecars, and a formatting phase that rewrites paired
//! tags into one-character delimiters. A small state machine then tokenizes
//! the delimited string into annotated runs.

use notion_client::objects::rich_text::{Annotations, RichText, TextColor};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::richtext::annotated_run;
use crate::util::entities::{decode_entities, normalize_whitespace};
use crate::util::urls::{IframeKind, absolutize_url, classify_iframe_src};

const BOLD_OPEN: char = '\u{E000}';
const BOLD_CLOSE: char = '\u{E001}';
const ITALIC_OPEN: char = '\u{E002}';
const ITALIC_CLOSE: char = '\u{E003}';
const CODE_OPEN: char = '\u{E004}';
const CODE_CLOSE: char = '\u{E005}';
const UI_OPEN: char = '\u{E006}';
const UI_CLOSE: char = '\u{E007}';
const SOFT_BREAK: char = '\u{E008}';
const LINK_OPEN: char = '\u{E100}';
const LINK_CLOSE: char = '\u{E101}';

static RE_IFRAME_PAIR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<iframe\b[^>]*>.*?</iframe>").expect("iframe pattern"));
static RE_IFRAME_LONE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<iframe\b[^>]*/?>").expect("lone iframe pattern"));
static RE_IMG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<img\b[^>]*/?>").expect("img pattern"));
static RE_SVG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<svg\b[^>]*>.*?</svg>").expect("svg pattern"));
static RE_SRC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)\bsrc\s*=\s*["']([^"']*)["']"#).expect("src pattern"));
static RE_ALT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)\balt\s*=\s*["']([^"']*)["']"#).expect("alt pattern"));
static RE_CLASS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)\bclass\s*=\s*["']([^"']*)["']"#).expect("class pattern"));
static RE_ANCHOR_SOFT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)</a>\s*<p\b").expect("anchor soft-break pattern"));
static RE_LINK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)<a\b[^>]*?href\s*=\s*["']([^"']*)["'][^>]*>(.*?)</a>"#)
        .expect("link pattern")
});
static RE_ANCHOR_PLAIN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<a\b[^>]*>(.*?)</a>").expect("plain anchor pattern"));
static RE_BOLD_OPEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<(?:b|strong)\b[^>]*>").expect("bold open pattern"));
static RE_BOLD_CLOSE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)</(?:b|strong)>").expect("bold close pattern"));
static RE_ITALIC_OPEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<(?:i|em)\b[^>]*>").expect("italic open pattern"));
static RE_ITALIC_CLOSE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)</(?:i|em)>").expect("italic close pattern"));
static RE_CODE_OPEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<code\b[^>]*>").expect("code open pattern"));
static RE_CODE_CLOSE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)</code>").expect("code close pattern"));
static RE_BR: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<br\s*/?>").expect("br pattern"));
static RE_SPAN_OPEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<span\b[^>]*>").expect("span open pattern"));
static RE_SPAN_CLOSE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)</span>").expect("span close pattern"));
static RE_BLOCK_TAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)</?(?:p|div|ul|ol|li|dl|dt|dd|table|thead|tbody|tr|td|th|section|article|figure|figcaption|blockquote|h[1-6])\b[^>]*>",
    )
    .expect("block tag pattern")
});
static RE_ANY_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]+>").expect("tag pattern"));

/// Word pattern for inline technical identifiers such as `sys_user` or
/// `com.snc.change`.
static RE_TECH_ID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b[A-Za-z0-9][A-Za-z0-9._-]*[._][A-Za-z0-9._-]+").expect("identifier pattern")
});

const CODE_SPAN_CLASSES: [&str; 4] = ["ph", "keyword", "parmname", "codeph"];

/// An image pulled out of a fragment during extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedImage {
    pub url: String,
    pub alt: String,
}

/// An iframe pulled out of a fragment during extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedMedia {
    pub url: String,
    pub kind: IframeKind,
}

/// Result of parsing one HTML fragment.
#[derive(Debug, Clone, Default)]
pub struct ParsedFragment {
    pub rich_text: Vec<RichText>,
    pub images: Vec<ExtractedImage>,
    pub media: Vec<ExtractedMedia>,
}

impl ParsedFragment {
    pub fn has_videos(&self) -> bool {
        self.media.iter().any(|m| m.kind.is_video())
    }
}

/// Knobs for context-dependent parsing.
#[derive(Debug, Clone, Default)]
pub struct ParseOptions {
    /// Replacement text for extracted images and SVGs. Table cells pass the
    /// bullet glyph here; normal flow leaves the slot empty.
    pub image_placeholder: Option<&'static str>,
}

/// Parse a fragment with default options.
pub fn parse_fragment(html: &str) -> ParsedFragment {
    parse_fragment_with(html, &ParseOptions::default())
}

/// Parse an HTML fragment into rich-text runs plus media sidecars.
pub fn parse_fragment_with(html: &str, opts: &ParseOptions) -> ParsedFragment {
    let mut images = Vec::new();
    let mut media = Vec::new();
    let mut links: Vec<(String, String)> = Vec::new();

    let mut work = RE_ANCHOR_SOFT
        .replace_all(html, format!("</a>{SOFT_BREAK}<p").as_str())
        .into_owned();

    // Extraction phase: iframes first, then images, then links.
    for re in [&*RE_IFRAME_PAIR, &*RE_IFRAME_LONE] {
        work = re
            .replace_all(&work, |caps: &regex::Captures| {
                if let Some(src) = RE_SRC.captures(&caps[0]).map(|c| c[1].to_string()) {
                    let url = absolutize_url(&src);
                    let kind = classify_iframe_src(&url);
                    media.push(ExtractedMedia { url, kind });
                }
                String::new()
            })
            .into_owned();
    }
    let placeholder = opts.image_placeholder.unwrap_or("");
    work = RE_IMG
        .replace_all(&work, |caps: &regex::Captures| {
            if let Some(src) = RE_SRC.captures(&caps[0]).map(|c| c[1].to_string()) {
                let alt = RE_ALT
                    .captures(&caps[0])
                    .map(|c| decode_entities(&c[1]))
                    .unwrap_or_default();
                images.push(ExtractedImage {
                    url: absolutize_url(&src),
                    alt,
                });
            }
            placeholder.to_string()
        })
        .into_owned();
    work = RE_SVG.replace_all(&work, placeholder).into_owned();
    work = RE_LINK
        .replace_all(&work, |caps: &regex::Captures| {
            let idx = links.len();
            links.push((absolutize_url(&caps[1]), caps[2].to_string()));
            format!("{LINK_OPEN}{idx}{LINK_CLOSE}")
        })
        .into_owned();
    work = RE_ANCHOR_PLAIN.replace_all(&work, "$1").into_owned();

    // Formatting phase: paired tags become delimiter characters.
    work = rewrite_spans(work);
    work = RE_BOLD_OPEN
        .replace_all(&work, BOLD_OPEN.to_string().as_str())
        .into_owned();
    work = RE_BOLD_CLOSE
        .replace_all(&work, BOLD_CLOSE.to_string().as_str())
        .into_owned();
    work = RE_ITALIC_OPEN
        .replace_all(&work, ITALIC_OPEN.to_string().as_str())
        .into_owned();
    work = RE_ITALIC_CLOSE
        .replace_all(&work, ITALIC_CLOSE.to_string().as_str())
        .into_owned();
    work = RE_CODE_OPEN
        .replace_all(&work, CODE_OPEN.to_string().as_str())
        .into_owned();
    work = RE_CODE_CLOSE
        .replace_all(&work, CODE_CLOSE.to_string().as_str())
        .into_owned();
    work = RE_BR.replace_all(&work, "\n").into_owned();
    work = RE_BLOCK_TAG.replace_all(&work, " ").into_owned();
    work = RE_ANY_TAG.replace_all(&work, "").into_owned();
    work = normalize_whitespace(&decode_entities(&work));

    let rich_text = tokenize(&work, &links);
    ParsedFragment {
        rich_text,
        images,
        media,
    }
}

/// Rewrite `<span>` pairs innermost-first. The class vocabulary decides the
/// delimiter: `uicontrol` brackets bold+blue, `sectiontitle tasklabel`
/// brackets bold, the code classes bracket code when the content carries a
/// technical identifier, anything else unwraps.
fn rewrite_spans(mut work: String) -> String {
    for _ in 0..10_000 {
        let Some(close) = RE_SPAN_CLOSE.find(&work).map(|m| (m.start(), m.end())) else {
            break;
        };
        let open = RE_SPAN_OPEN
            .find_iter(&work[..close.0])
            .last()
            .map(|m| (m.start(), m.end()));
        let Some(open) = open else {
            // Orphan close tag.
            work.replace_range(close.0..close.1, "");
            continue;
        };
        let classes = RE_CLASS
            .captures(&work[open.0..open.1])
            .map(|c| c[1].to_lowercase())
            .unwrap_or_default();
        let inner = work[open.1..close.0].to_string();
        let replacement = transform_span(&classes, &inner);
        work.replace_range(open.0..close.1, &replacement);
    }
    work
}

fn transform_span(classes: &str, inner: &str) -> String {
    let words: Vec<&str> = classes.split_whitespace().collect();
    if words.iter().any(|w| *w == "uicontrol") {
        return format!("{UI_OPEN}{inner}{UI_CLOSE}");
    }
    if words.contains(&"sectiontitle") && words.contains(&"tasklabel") {
        return format!("{BOLD_OPEN}{inner}{BOLD_CLOSE}");
    }
    let is_code_class = words
        .iter()
        .any(|w| CODE_SPAN_CLASSES.contains(w));
    if is_code_class {
        let visible = RE_ANY_TAG.replace_all(inner, "");
        if RE_TECH_ID.is_match(&visible) {
            return format!("{CODE_OPEN}{inner}{CODE_CLOSE}");
        }
    }
    inner.to_string()
}

/// Annotation state machine over the delimited string.
struct RunBuilder {
    runs: Vec<RichText>,
    buf: String,
    bold: u32,
    italic: u32,
    code: u32,
    ui: u32,
}

impl RunBuilder {
    fn new() -> Self {
        Self {
            runs: Vec::new(),
            buf: String::new(),
            bold: 0,
            italic: 0,
            code: 0,
            ui: 0,
        }
    }

    fn annotations(&self) -> Annotations {
        // Entering code overrides the current color with red; leaving it
        // restores whatever the surrounding state implies.
        let color = if self.code > 0 {
            TextColor::Red
        } else if self.ui > 0 {
            TextColor::Blue
        } else {
            TextColor::Default
        };
        Annotations {
            bold: self.bold > 0 || self.ui > 0,
            italic: self.italic > 0,
            strikethrough: false,
            underline: false,
            code: self.code > 0,
            color,
        }
    }

    fn is_plain(&self) -> bool {
        self.bold == 0 && self.italic == 0 && self.code == 0 && self.ui == 0
    }

    fn push_run(&mut self, content: &str, annotations: Option<Annotations>, link: Option<String>) {
        if content.is_empty() {
            return;
        }
        match annotations {
            Some(a) => self.runs.push(annotated_run(content, a, link)),
            None => match link {
                Some(url) => self
                    .runs
                    .push(annotated_run(content, Annotations::default(), Some(url))),
                None => self.runs.push(crate::richtext::text_run(content)),
            },
        }
    }

    fn commit(&mut self) {
        if self.buf.is_empty() {
            return;
        }
        let text = std::mem::take(&mut self.buf);
        if self.code > 0 {
            // Already inside code delimiters; nothing left to detect.
            let ann = self.annotations();
            self.push_run(&text, Some(ann), None);
        } else {
            self.commit_with_identifiers(&text);
        }
    }

    /// Emit a segment, code-wrapping inline technical identifiers. Detection
    /// runs regardless of the surrounding formatting state; identifier runs
    /// keep the surrounding bold/italic and add code+red on top. Tokens
    /// whose letters are entirely uppercase (acronyms) stay plain, as do
    /// all-digit dotted tokens like version numbers.
    fn commit_with_identifiers(&mut self, text: &str) {
        let base = if self.is_plain() {
            None
        } else {
            Some(self.annotations())
        };
        let mut code_ann = self.annotations();
        code_ann.code = true;
        code_ann.color = TextColor::Red;

        let mut cursor = 0;
        for m in RE_TECH_ID.find_iter(text) {
            let mut token = m.as_str();
            // Sentence punctuation glued onto the identifier stays plain.
            while token.ends_with(['.', ',', ';', ':']) {
                token = &token[..token.len() - 1];
            }
            if token.len() < 3 || !token.contains(['.', '_']) || is_acronym_like(token) {
                continue;
            }
            let start = m.start();
            let end = start + token.len();
            if start > cursor {
                self.push_run(&text[cursor..start], base.clone(), None);
            }
            self.push_run(token, Some(code_ann.clone()), None);
            cursor = end;
        }
        if cursor < text.len() {
            self.push_run(&text[cursor..], base, None);
        }
    }

    fn finish(mut self) -> Vec<RichText> {
        self.commit();
        space_adjacent_runs(self.runs)
    }
}

fn is_acronym_like(token: &str) -> bool {
    token
        .chars()
        .filter(|c| c.is_ascii_alphabetic())
        .all(|c| c.is_ascii_uppercase())
}

/// Insert a single space between adjacent runs when neither side carries
/// boundary whitespace.
fn space_adjacent_runs(mut runs: Vec<RichText>) -> Vec<RichText> {
    for i in 1..runs.len() {
        let prev_ends_ws = crate::richtext::run_content(&runs[i - 1])
            .map(|c| c.ends_with(char::is_whitespace) || c.is_empty())
            .unwrap_or(true);
        let next_starts_ws = crate::richtext::run_content(&runs[i])
            .map(|c| c.starts_with(char::is_whitespace) || c.is_empty())
            .unwrap_or(true);
        if !prev_ends_ws && !next_starts_ws {
            if let Some(content) = crate::richtext::run_content(&runs[i - 1]) {
                let spaced = format!("{content} ");
                let replaced = crate::richtext::with_content(&runs[i - 1], spaced);
                runs[i - 1] = replaced;
            }
        }
    }
    runs
}

fn tokenize(work: &str, links: &[(String, String)]) -> Vec<RichText> {
    let mut builder = RunBuilder::new();
    let mut chars = work.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            BOLD_OPEN => {
                builder.commit();
                builder.bold += 1;
            }
            BOLD_CLOSE => {
                builder.commit();
                builder.bold = builder.bold.saturating_sub(1);
            }
            ITALIC_OPEN => {
                builder.commit();
                builder.italic += 1;
            }
            ITALIC_CLOSE => {
                builder.commit();
                builder.italic = builder.italic.saturating_sub(1);
            }
            CODE_OPEN => {
                builder.commit();
                builder.code += 1;
            }
            CODE_CLOSE => {
                builder.commit();
                builder.code = builder.code.saturating_sub(1);
            }
            UI_OPEN => {
                builder.commit();
                builder.ui += 1;
            }
            UI_CLOSE => {
                builder.commit();
                builder.ui = builder.ui.saturating_sub(1);
            }
            SOFT_BREAK => {
                builder.commit();
                builder.buf.push('\n');
            }
            LINK_OPEN => {
                builder.commit();
                let mut digits = String::new();
                for next in chars.by_ref() {
                    if next == LINK_CLOSE {
                        break;
                    }
                    digits.push(next);
                }
                if let Some((url, inner)) = digits.parse::<usize>().ok().and_then(|i| links.get(i))
                {
                    let visible = normalize_whitespace(&decode_entities(
                        &RE_ANY_TAG.replace_all(inner, ""),
                    ));
                    let visible = visible.trim();
                    if !visible.is_empty() {
                        let ann = builder.annotations();
                        builder.push_run(visible, Some(ann), Some(url.clone()));
                    }
                }
            }
            other => builder.buf.push(other),
        }
    }
    let runs = builder.finish();
    if runs.is_empty() {
        vec![crate::richtext::text_run("")]
    } else {
        runs
    }
}
