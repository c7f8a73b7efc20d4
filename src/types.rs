use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which backend produced a record. `Notice` marks a placeholder that carries
/// a message instead of a real result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultKind {
    Summary,
    Web,
    Video,
    Notice,
}

/// Search backend selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Summary,
    Web,
    Video,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Summary => "summary",
            ProviderKind::Web => "web",
            ProviderKind::Video => "video",
        }
    }

    pub fn result_kind(&self) -> ResultKind {
        match self {
            ProviderKind::Summary => ResultKind::Summary,
            ProviderKind::Web => ResultKind::Web,
            ProviderKind::Video => ResultKind::Video,
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "summary" | "wikipedia" => Ok(ProviderKind::Summary),
            "web" | "cse" => Ok(ProviderKind::Web),
            "video" | "youtube" => Ok(ProviderKind::Video),
            other => Err(format!("unknown provider '{}'", other)),
        }
    }
}

/// The one result shape shared by every provider and every persisted
/// collection. `key` is the natural key: the term for summaries, the link
/// for web and video results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "StoredRecord")]
pub struct ResultRecord {
    pub key: String,
    pub title: String,
    pub summary: String,
    pub image_url: Option<String>,
    pub kind: ResultKind,
}

impl ResultRecord {
    pub fn notice(key: impl Into<String>, message: impl Into<String>) -> Self {
        let key = key.into();
        Self {
            title: key.clone(),
            key,
            summary: message.into(),
            image_url: None,
            kind: ResultKind::Notice,
        }
    }

    pub fn is_notice(&self) -> bool {
        self.kind == ResultKind::Notice
    }
}

// Everything older app builds ever wrote under a result-ish key:
// `{term, summary, imageUrl}`, `{title, snippet, link, thumbnail}` and the
// current camelCase form.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredRecord {
    #[serde(default, alias = "naturalKey")]
    key: Option<String>,
    #[serde(default)]
    term: Option<String>,
    #[serde(default, alias = "url")]
    link: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    snippet: Option<String>,
    #[serde(default, alias = "image")]
    image_url: Option<String>,
    #[serde(default)]
    thumbnail: Option<String>,
    #[serde(default)]
    kind: Option<ResultKind>,
}

impl From<StoredRecord> for ResultRecord {
    fn from(raw: StoredRecord) -> Self {
        let kind = raw.kind.unwrap_or(if raw.link.is_some() {
            ResultKind::Web
        } else {
            ResultKind::Summary
        });
        let key = raw
            .key
            .or(raw.link)
            .or_else(|| raw.term.clone())
            .unwrap_or_default();
        let title = raw.title.or(raw.term).unwrap_or_else(|| key.clone());
        let image_url = raw
            .image_url
            .or(raw.thumbnail)
            .filter(|s| !s.trim().is_empty());

        ResultRecord {
            key,
            title,
            summary: raw.summary.or(raw.snippet).unwrap_or_default(),
            image_url,
            kind,
        }
    }
}

/// One remembered search term, newest first in the history collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "StoredHistoryEntry")]
pub struct HistoryEntry {
    pub term: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub searched_at: Option<DateTime<Utc>>,
}

impl HistoryEntry {
    pub fn new(term: impl Into<String>) -> Self {
        Self {
            term: term.into(),
            searched_at: Some(Utc::now()),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StoredHistoryEntry {
    Term(String),
    Entry {
        term: String,
        #[serde(default, rename = "searchedAt")]
        searched_at: Option<DateTime<Utc>>,
    },
}

impl From<StoredHistoryEntry> for HistoryEntry {
    fn from(raw: StoredHistoryEntry) -> Self {
        match raw {
            StoredHistoryEntry::Term(term) => HistoryEntry {
                term,
                searched_at: None,
            },
            StoredHistoryEntry::Entry { term, searched_at } => HistoryEntry { term, searched_at },
        }
    }
}

// HTTP surface

#[derive(Debug, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default)]
    pub provider: Option<ProviderKind>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ToggleFavoriteRequest {
    #[serde(default)]
    pub record: Option<ResultRecord>,
    #[serde(default)]
    pub key: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ToggleFavoriteResponse {
    pub toggle: crate::collections::Toggle,
    pub favorites: Vec<ResultRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RemoveFavoriteRequest {
    pub key: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PinRequest {
    pub pin: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UnlockResponse {
    pub unlocked: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BlockedWordRequest {
    pub word: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

// Provider wire formats

#[derive(Debug, Deserialize)]
pub struct SummaryResponse {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub extract: Option<String>,
    #[serde(default)]
    pub thumbnail: Option<SummaryThumbnail>,
}

#[derive(Debug, Deserialize)]
pub struct SummaryThumbnail {
    #[serde(default)]
    pub source: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct WebSearchResponse {
    #[serde(default)]
    pub items: Vec<WebSearchItem>,
}

#[derive(Debug, Deserialize)]
pub struct WebSearchItem {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub snippet: String,
    #[serde(default)]
    pub link: String,
    #[serde(default)]
    pub pagemap: Option<WebPagemap>,
}

#[derive(Debug, Deserialize)]
pub struct WebPagemap {
    #[serde(default)]
    pub cse_image: Vec<WebImage>,
}

#[derive(Debug, Deserialize)]
pub struct WebImage {
    #[serde(default)]
    pub src: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct VideoSearchResponse {
    #[serde(default)]
    pub items: Vec<VideoItem>,
}

#[derive(Debug, Deserialize)]
pub struct VideoItem {
    #[serde(default)]
    pub id: VideoId,
    #[serde(default)]
    pub snippet: VideoSnippet,
}

#[derive(Debug, Default, Deserialize)]
pub struct VideoId {
    #[serde(rename = "videoId", default)]
    pub video_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct VideoSnippet {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub thumbnails: Option<VideoThumbnails>,
}

#[derive(Debug, Deserialize)]
pub struct VideoThumbnails {
    #[serde(default)]
    pub high: Option<VideoThumbnail>,
    #[serde(default)]
    pub medium: Option<VideoThumbnail>,
    #[serde(default)]
    pub default: Option<VideoThumbnail>,
}

#[derive(Debug, Deserialize)]
pub struct VideoThumbnail {
    pub url: String,
}
