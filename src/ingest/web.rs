//! HTML pages (local or fetched) and YouTube transcripts.

use super::{is_url, read_source, unescape_xml, TextExtractor};
use crate::models::{Result, SynthkitError};
use async_trait::async_trait;
use regex::Regex;
use scraper::{Html, Node};
use std::sync::LazyLock;
use std::time::Duration;
use tracing::debug;

/// User agent sent with every fetch.
pub const USER_AGENT: &str = concat!("synthkit/", env!("CARGO_PKG_VERSION"));

/// Timeout for page and transcript fetches.
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Elements whose text never reaches the output.
const SKIPPED_ELEMENTS: &[&str] = &["script", "style", "noscript"];

/// Build the HTTP client shared by the web extractors.
pub fn http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(FETCH_TIMEOUT)
        .build()
        .map_err(|e| SynthkitError::Internal(format!("Failed to build HTTP client: {e}")))
}

/// GET a URL as text; any failure means the source is unreachable.
async fn fetch_text(client: &reqwest::Client, url: &str) -> Result<String> {
    let not_found = |e: reqwest::Error| SynthkitError::NotFound(format!("Failed to fetch {url}: {e}"));

    client
        .get(url)
        .header(reqwest::header::ACCEPT_LANGUAGE, "en-US,en;q=0.9")
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(not_found)?
        .text()
        .await
        .map_err(not_found)
}

/// HTML from a local file or any non-YouTube URL.
pub struct HtmlExtractor {
    client: reqwest::Client,
}

impl HtmlExtractor {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl TextExtractor for HtmlExtractor {
    fn name(&self) -> &'static str {
        "html"
    }

    async fn extract(&self, source: &str) -> Result<String> {
        let html = if is_url(source) {
            fetch_text(&self.client, source).await?
        } else {
            let bytes = read_source(source).await?;
            String::from_utf8_lossy(&bytes).into_owned()
        };
        Ok(html_to_text(&html))
    }
}

/// Visible text of a document, one phrase per line.
pub fn html_to_text(html: &str) -> String {
    let document = Html::parse_document(html);

    let mut raw = String::new();
    for node in document.tree.root().descendants() {
        let Node::Text(text) = node.value() else {
            continue;
        };
        let hidden = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .is_some_and(|el| SKIPPED_ELEMENTS.contains(&el.name()))
        });
        if !hidden {
            raw.push_str(text);
        }
    }

    clean_text(&raw)
}

/// Trim lines, split on double spaces, drop blanks.
fn clean_text(raw: &str) -> String {
    raw.lines()
        .flat_map(|line| line.trim().split("  "))
        .map(str::trim)
        .filter(|phrase| !phrase.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

static VIDEO_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:v=|\.be/)([^&?#/]+)").expect("static video id pattern"));
static CAPTION_URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""captionTracks":\[\{"baseUrl":"((?:[^"\\]|\\.)*)""#).expect("static caption pattern")
});
static TITLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""title":"((?:[^"\\]|\\.)*)""#).expect("static title pattern"));
static AUTHOR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""author":"((?:[^"\\]|\\.)*)""#).expect("static author pattern"));
static LENGTH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""lengthSeconds":"(\d+)""#).expect("static length pattern"));
static CAPTION_TEXT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<text\b[^>]*>(.*?)</text>").expect("static caption text pattern"));

/// Video ID from a watch or short URL.
pub fn youtube_video_id(url: &str) -> Option<String> {
    VIDEO_ID_RE
        .captures(url)
        .map(|caps| caps[1].to_string())
}

/// Metadata scraped from a watch page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VideoDetails {
    pub title: String,
    pub author: String,
    pub length_seconds: u64,
    pub caption_url: Option<String>,
}

/// Decode a JSON string body (the text between the quotes).
fn json_unescape(raw: &str) -> String {
    serde_json::from_str::<String>(&format!("\"{raw}\"")).unwrap_or_else(|_| raw.to_string())
}

/// Pull title, author, length and first caption track out of the embedded player response.
pub fn parse_watch_page(page: &str) -> VideoDetails {
    // Fields are looked up after "videoDetails" to skip unrelated "title" keys.
    let details = page
        .find("\"videoDetails\"")
        .map(|start| &page[start..])
        .unwrap_or(page);

    let field = |re: &Regex| {
        re.captures(details)
            .map(|caps| json_unescape(&caps[1]))
            .unwrap_or_default()
    };

    VideoDetails {
        title: field(&TITLE_RE),
        author: field(&AUTHOR_RE),
        length_seconds: LENGTH_RE
            .captures(details)
            .and_then(|caps| caps[1].parse().ok())
            .unwrap_or(0),
        caption_url: CAPTION_URL_RE
            .captures(page)
            .map(|caps| json_unescape(&caps[1])),
    }
}

/// Caption lines from a timedtext XML document.
pub fn parse_timedtext(xml: &str) -> Vec<String> {
    CAPTION_TEXT_RE
        .captures_iter(xml)
        .map(|caps| unescape_xml(&caps[1]).replace('\n', " ").trim().to_string())
        .filter(|line| !line.is_empty())
        .collect()
}

pub fn format_transcript(details: &VideoDetails, url: &str, lines: &[String]) -> String {
    format!(
        "Title: {}\nAuthor: {}\nLength: {} seconds\nURL: {}\n\nTranscript:\n{}",
        details.title,
        details.author,
        details.length_seconds,
        url,
        lines.join(" ")
    )
}

/// Transcript of a YouTube video with a metadata header.
pub struct YoutubeExtractor {
    client: reqwest::Client,
}

impl YoutubeExtractor {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl TextExtractor for YoutubeExtractor {
    fn name(&self) -> &'static str {
        "youtube"
    }

    async fn extract(&self, source: &str) -> Result<String> {
        let video_id = youtube_video_id(source).ok_or_else(|| {
            SynthkitError::Validation(format!("Could not find a video ID in {source}"))
        })?;

        let watch_url = format!("https://www.youtube.com/watch?v={video_id}");
        let page = fetch_text(&self.client, &watch_url).await?;
        let details = parse_watch_page(&page);

        let caption_url = details.caption_url.as_deref().ok_or_else(|| {
            SynthkitError::NotFound(format!("No transcript available for video {video_id}"))
        })?;
        let xml = fetch_text(&self.client, caption_url).await?;
        let lines = parse_timedtext(&xml);

        debug!(video_id = %video_id, lines = lines.len(), "Transcript fetched");
        Ok(format_transcript(&details, source, &lines))
    }
}
