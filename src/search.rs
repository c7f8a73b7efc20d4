use crate::config::Config;
use crate::text::{non_empty, strip_html};
use crate::types::*;
use anyhow::Result;
use async_trait::async_trait;
use backoff::future::retry;
use backoff::ExponentialBackoffBuilder;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use url::Url;

/// Shown when a provider could not be reached or answered with garbage.
pub const FAILURE_MESSAGE: &str = "Failed to fetch results. Please try again.";

const USER_AGENT: &str = "TUEBO/1.0";

// Same set a browser's encodeURIComponent leaves alone.
const PATH_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("request to {provider} failed: {source}")]
    Request {
        provider: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("{provider} responded with status {status}")]
    Status {
        provider: &'static str,
        status: StatusCode,
    },
    #[error("failed to decode {provider} response: {source}")]
    Decode {
        provider: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("{provider} is not configured: missing {what}")]
    NotConfigured {
        provider: &'static str,
        what: &'static str,
    },
    #[error("invalid endpoint url '{url}': {source}")]
    InvalidEndpoint {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("no {0} provider registered")]
    UnknownProvider(ProviderKind),
}

impl SearchError {
    /// Network failures and 5xx answers are worth another attempt.
    fn is_transient(&self) -> bool {
        match self {
            SearchError::Request { .. } => true,
            SearchError::Status { status, .. } => status.is_server_error(),
            _ => false,
        }
    }
}

/// One external search backend.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Human-readable name for logging.
    fn name(&self) -> &'static str;

    /// Placeholder text when the provider answered but found nothing.
    fn empty_message(&self, query: &str) -> String {
        format!("No results found for {}", query)
    }

    async fn fetch(&self, client: &Client, query: &str) -> Result<Vec<ResultRecord>, SearchError>;
}

async fn send(client: &Client, provider: &'static str, url: Url) -> Result<Response, SearchError> {
    client
        .get(url)
        .header("User-Agent", USER_AGENT)
        .header("Accept", "application/json")
        .send()
        .await
        .map_err(|source| SearchError::Request { provider, source })
}

async fn decode<T: DeserializeOwned>(provider: &'static str, resp: Response) -> Result<T, SearchError> {
    let status = resp.status();
    if !status.is_success() {
        return Err(SearchError::Status { provider, status });
    }
    resp.json::<T>()
        .await
        .map_err(|source| SearchError::Decode { provider, source })
}

fn parse_endpoint(url: &str, params: &[(&str, &str)]) -> Result<Url, SearchError> {
    Url::parse_with_params(url, params).map_err(|source| SearchError::InvalidEndpoint {
        url: url.to_string(),
        source,
    })
}

/// Encyclopedia page summary: `GET {endpoint}/{term}`.
#[derive(Debug, Clone)]
pub struct SummaryProvider {
    endpoint: String,
}

impl SummaryProvider {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
        }
    }

    fn url_for(&self, query: &str) -> Result<Url, SearchError> {
        let raw = format!(
            "{}/{}",
            self.endpoint.trim_end_matches('/'),
            utf8_percent_encode(query, PATH_COMPONENT)
        );
        Url::parse(&raw).map_err(|source| SearchError::InvalidEndpoint { url: raw, source })
    }
}

#[async_trait]
impl SearchProvider for SummaryProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Summary
    }

    fn name(&self) -> &'static str {
        "summary"
    }

    fn empty_message(&self, query: &str) -> String {
        format!("No summary found for {}", query)
    }

    async fn fetch(&self, client: &Client, query: &str) -> Result<Vec<ResultRecord>, SearchError> {
        let resp = send(client, self.name(), self.url_for(query)?).await?;
        // Unknown pages come back as 404; that is "nothing found", not a failure.
        if resp.status() == StatusCode::NOT_FOUND {
            debug!("summary provider has no page for {}", query);
            return Ok(Vec::new());
        }
        let summary: SummaryResponse = decode(self.name(), resp).await?;
        Ok(summary_records(query, summary))
    }
}

pub fn summary_records(query: &str, summary: SummaryResponse) -> Vec<ResultRecord> {
    let extract = strip_html(summary.extract.as_deref().unwrap_or(""));
    if extract.is_empty() {
        return Vec::new();
    }
    vec![ResultRecord {
        key: query.to_string(),
        title: query.to_string(),
        summary: extract,
        image_url: non_empty(summary.thumbnail.and_then(|t| t.source)),
        kind: ResultKind::Summary,
    }]
}

/// General web search (custom search engine API).
#[derive(Debug, Clone)]
pub struct WebProvider {
    endpoint: String,
    api_key: Option<String>,
    engine_id: Option<String>,
}

impl WebProvider {
    pub fn new(endpoint: impl Into<String>, api_key: Option<String>, engine_id: Option<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key,
            engine_id,
        }
    }
}

#[async_trait]
impl SearchProvider for WebProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Web
    }

    fn name(&self) -> &'static str {
        "web"
    }

    async fn fetch(&self, client: &Client, query: &str) -> Result<Vec<ResultRecord>, SearchError> {
        let key = self.api_key.as_deref().ok_or(SearchError::NotConfigured {
            provider: self.name(),
            what: "api key",
        })?;
        let cx = self.engine_id.as_deref().ok_or(SearchError::NotConfigured {
            provider: self.name(),
            what: "engine id",
        })?;
        let url = parse_endpoint(
            &self.endpoint,
            &[("key", key), ("cx", cx), ("q", query), ("safe", "active")],
        )?;
        let resp = send(client, self.name(), url).await?;
        let parsed: WebSearchResponse = decode(self.name(), resp).await?;
        Ok(web_records(parsed))
    }
}

pub fn web_records(response: WebSearchResponse) -> Vec<ResultRecord> {
    response
        .items
        .into_iter()
        .filter(|item| !item.link.trim().is_empty())
        .map(|item| {
            let image_url = non_empty(
                item.pagemap
                    .and_then(|p| p.cse_image.into_iter().next())
                    .and_then(|img| img.src),
            );
            ResultRecord {
                key: item.link.trim().to_string(),
                title: strip_html(&item.title),
                summary: strip_html(&item.snippet),
                image_url,
                kind: ResultKind::Web,
            }
        })
        .collect()
}

/// Video search restricted to strict safe-search.
#[derive(Debug, Clone)]
pub struct VideoProvider {
    endpoint: String,
    api_key: Option<String>,
    max_results: u32,
}

impl VideoProvider {
    pub fn new(endpoint: impl Into<String>, api_key: Option<String>, max_results: u32) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key,
            max_results,
        }
    }
}

#[async_trait]
impl SearchProvider for VideoProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Video
    }

    fn name(&self) -> &'static str {
        "video"
    }

    fn empty_message(&self, query: &str) -> String {
        format!("No videos found for {}", query)
    }

    async fn fetch(&self, client: &Client, query: &str) -> Result<Vec<ResultRecord>, SearchError> {
        let key = self.api_key.as_deref().ok_or(SearchError::NotConfigured {
            provider: self.name(),
            what: "api key",
        })?;
        let max_results = self.max_results.to_string();
        let url = parse_endpoint(
            &self.endpoint,
            &[
                ("part", "snippet"),
                ("q", query),
                ("type", "video"),
                ("safeSearch", "strict"),
                ("maxResults", max_results.as_str()),
                ("key", key),
            ],
        )?;
        let resp = send(client, self.name(), url).await?;
        let parsed: VideoSearchResponse = decode(self.name(), resp).await?;
        Ok(video_records(parsed))
    }
}

pub fn watch_url(video_id: &str) -> String {
    format!("https://www.youtube.com/watch?v={}", video_id)
}

pub fn video_records(response: VideoSearchResponse) -> Vec<ResultRecord> {
    response
        .items
        .into_iter()
        .filter_map(|item| {
            let video_id = non_empty(item.id.video_id)?;
            let image_url = item.snippet.thumbnails.and_then(|t| {
                t.high
                    .or(t.medium)
                    .or(t.default)
                    .and_then(|thumb| non_empty(Some(thumb.url)))
            });
            Some(ResultRecord {
                key: watch_url(&video_id),
                title: strip_html(&item.snippet.title),
                summary: strip_html(&item.snippet.description),
                image_url,
                kind: ResultKind::Video,
            })
        })
        .collect()
}

/// What one gateway call produced. `failed` is set when the provider could
/// not be reached or answered with an error; `results` then holds the
/// failure notice.
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayOutcome {
    pub results: Vec<ResultRecord>,
    pub failed: bool,
}

impl GatewayOutcome {
    fn failure(query: &str) -> Self {
        Self {
            results: vec![ResultRecord::notice(query, FAILURE_MESSAGE)],
            failed: true,
        }
    }
}

/// Routes a query to one provider and turns whatever comes back into
/// displayable records. Never returns an error: failures become a single
/// notice record.
pub struct Gateway {
    client: Client,
    default_kind: ProviderKind,
    providers: HashMap<ProviderKind, Arc<dyn SearchProvider>>,
    retry_max_elapsed: Duration,
}

impl Gateway {
    pub fn new(client: Client, default_kind: ProviderKind) -> Self {
        Self {
            client,
            default_kind,
            providers: HashMap::new(),
            retry_max_elapsed: Duration::ZERO,
        }
    }

    pub fn with_provider(mut self, provider: Arc<dyn SearchProvider>) -> Self {
        self.providers.insert(provider.kind(), provider);
        self
    }

    /// Retry transient failures with exponential backoff for at most
    /// `max_elapsed`. Zero means a single attempt.
    pub fn with_retry(mut self, max_elapsed: Duration) -> Self {
        self.retry_max_elapsed = max_elapsed;
        self
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.http_timeout)
            .build()?;

        Ok(Self::new(client, config.provider)
            .with_provider(Arc::new(SummaryProvider::new(config.summary_url.clone())))
            .with_provider(Arc::new(WebProvider::new(
                config.web_search_url.clone(),
                config.web_api_key.clone(),
                config.web_engine_id.clone(),
            )))
            .with_provider(Arc::new(VideoProvider::new(
                config.video_search_url.clone(),
                config.video_api_key.clone(),
                config.video_max_results,
            )))
            .with_retry(config.retry_max_elapsed))
    }

    pub fn default_kind(&self) -> ProviderKind {
        self.default_kind
    }

    pub async fn search(&self, query: &str) -> Vec<ResultRecord> {
        self.search_with(self.default_kind, query).await
    }

    pub async fn search_with(&self, kind: ProviderKind, query: &str) -> Vec<ResultRecord> {
        self.lookup(kind, query).await.results
    }

    /// Like `search_with`, but also reports whether the provider call failed.
    pub async fn lookup(&self, kind: ProviderKind, query: &str) -> GatewayOutcome {
        let query = query.trim();
        if query.is_empty() {
            debug!("ignoring blank query");
            return GatewayOutcome {
                results: Vec::new(),
                failed: false,
            };
        }
        let Some(provider) = self.providers.get(&kind) else {
            error!("{}", SearchError::UnknownProvider(kind));
            return GatewayOutcome::failure(query);
        };

        info!("Searching {} for: {}", provider.name(), query);
        match self.fetch(provider.as_ref(), query).await {
            Ok(records) => {
                let records = crate::collections::dedup_by_key(records);
                info!("{} returned {} results", provider.name(), records.len());
                let results = if records.is_empty() {
                    vec![ResultRecord::notice(query, provider.empty_message(query))]
                } else {
                    records
                };
                GatewayOutcome {
                    results,
                    failed: false,
                }
            }
            Err(e) => {
                warn!("Search failed, returning placeholder: {}", e);
                GatewayOutcome::failure(query)
            }
        }
    }

    async fn fetch(&self, provider: &dyn SearchProvider, query: &str) -> Result<Vec<ResultRecord>, SearchError> {
        if self.retry_max_elapsed.is_zero() {
            return provider.fetch(&self.client, query).await;
        }

        let client = &self.client;
        retry(
            ExponentialBackoffBuilder::new()
                .with_initial_interval(Duration::from_millis(200))
                .with_max_interval(Duration::from_secs(2))
                .with_max_elapsed_time(Some(self.retry_max_elapsed))
                .build(),
            move || async move {
                provider.fetch(client, query).await.map_err(|e| {
                    if e.is_transient() {
                        debug!("transient {} failure: {}", provider.name(), e);
                        backoff::Error::transient(e)
                    } else {
                        backoff::Error::permanent(e)
                    }
                })
            },
        )
        .await
    }
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut kinds: Vec<&str> = self.providers.keys().map(|k| k.as_str()).collect();
        kinds.sort();
        f.debug_struct("Gateway")
            .field("default_kind", &self.default_kind)
            .field("providers", &kinds)
            .field("retry_max_elapsed", &self.retry_max_elapsed)
            .finish()
    }
}
