//! URL normalization and iframe classification.

use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

/// Origin used to absolutize relative documentation links and media paths.
pub const DOCS_ORIGIN: &str = "https://www.servicenow.com";

static VIDEO_HOST_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(youtube\.com/(embed|watch)|youtu\.be/|player\.vimeo\.com|wistia\.(com|net)|loom\.com/embed|vidyard\.com|players\.brightcove\.net)",
    )
    .expect("video host pattern")
});

static YOUTUBE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(youtube\.com/(embed|watch)|youtu\.be/)").expect("youtube pattern"));

/// How an `<iframe>` source should be materialized on the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IframeKind {
    /// YouTube URLs become native `video` blocks.
    YouTube,
    /// Other known video hosts become `embed` blocks.
    VideoHost,
    /// Everything else also becomes an `embed` block.
    Embed,
}

impl IframeKind {
    pub fn is_video(self) -> bool {
        matches!(self, IframeKind::YouTube | IframeKind::VideoHost)
    }
}

/// Classify an iframe `src` value.
pub fn classify_iframe_src(src: &str) -> IframeKind {
    if YOUTUBE_RE.is_match(src) {
        IframeKind::YouTube
    } else if VIDEO_HOST_RE.is_match(src) {
        IframeKind::VideoHost
    } else {
        IframeKind::Embed
    }
}

/// Turn a possibly relative documentation URL into an absolute one.
///
/// Scheme-relative (`//cdn...`) and root-relative (`/docs/...`) forms are
/// joined against [`DOCS_ORIGIN`]; absolute URLs are passed through. Values
/// that cannot be parsed are returned unchanged.
pub fn absolutize_url(src: &str) -> String {
    let trimmed = src.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    if trimmed.starts_with("//") {
        return format!("https:{trimmed}");
    }
    if let Ok(parsed) = Url::parse(trimmed) {
        return parsed.into();
    }
    match Url::parse(DOCS_ORIGIN).and_then(|base| base.join(trimmed)) {
        Ok(joined) => joined.into(),
        Err(_) => trimmed.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn classifies_youtube_as_video() {
        assert_eq!(
            classify_iframe_src("https://www.youtube.com/embed/abc123"),
            IframeKind::YouTube
        );
        assert_eq!(
            classify_iframe_src("https://www.youtube.com/watch?v=abc123"),
            IframeKind::YouTube
        );
    }

    #[test]
    fn classifies_other_video_hosts() {
        assert_eq!(
            classify_iframe_src("https://player.vimeo.com/video/1"),
            IframeKind::VideoHost
        );
        assert_eq!(
            classify_iframe_src("https://www.loom.com/embed/xyz"),
            IframeKind::VideoHost
        );
    }

    #[test]
    fn everything_else_is_embed() {
        assert_eq!(
            classify_iframe_src("https://example.com/widget"),
            IframeKind::Embed
        );
    }

    #[test]
    fn absolutizes_relative_urls() {
        assert_eq!(
            absolutize_url("/docs/foo.png"),
            "https://www.servicenow.com/docs/foo.png"
        );
        assert_eq!(absolutize_url("//cdn.example.com/a.png"), "https://cdn.example.com/a.png");
        assert_eq!(absolutize_url("https://x.test/a"), "https://x.test/a");
    }
}
