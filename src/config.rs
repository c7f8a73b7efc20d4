use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::collections::Cap;
use crate::repository::RepositoryLimits;
use crate::types::ProviderKind;

pub const DEFAULT_SUMMARY_URL: &str = "https://en.wikipedia.org/api/rest_v1/page/summary";
pub const DEFAULT_WEB_SEARCH_URL: &str = "https://www.googleapis.com/customsearch/v1";
pub const DEFAULT_VIDEO_SEARCH_URL: &str = "https://www.googleapis.com/youtube/v3/search";

/// `TUEBO_DATA_DIR` value that selects the in-memory store.
pub const MEMORY_DATA_DIR: &str = ":memory:";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value '{value}' for {var}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    /// `None` keeps everything in memory.
    pub data_dir: Option<PathBuf>,
    pub provider: ProviderKind,
    pub summary_url: String,
    pub web_search_url: String,
    pub video_search_url: String,
    pub web_api_key: Option<String>,
    pub web_engine_id: Option<String>,
    pub video_api_key: Option<String>,
    pub video_max_results: u32,
    pub history_cap: usize,
    pub results_cap: usize,
    pub parent_pin: String,
    pub http_timeout: Duration,
    pub retry_max_elapsed: Duration,
    pub blocked_words: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:5000".to_string(),
            data_dir: Some(PathBuf::from("./tuebo-data")),
            provider: ProviderKind::Summary,
            summary_url: DEFAULT_SUMMARY_URL.to_string(),
            web_search_url: DEFAULT_WEB_SEARCH_URL.to_string(),
            video_search_url: DEFAULT_VIDEO_SEARCH_URL.to_string(),
            web_api_key: None,
            web_engine_id: None,
            video_api_key: None,
            video_max_results: 6,
            history_cap: 10,
            results_cap: 50,
            parent_pin: "1234".to_string(),
            http_timeout: Duration::from_secs(30),
            retry_max_elapsed: Duration::ZERO,
            blocked_words: Vec::new(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build a config from any variable source. Unset or blank variables keep
    /// their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut config = Config::default();

        if let Some(addr) = get("TUEBO_BIND_ADDR") {
            config.bind_addr = addr;
        }
        if let Some(dir) = get("TUEBO_DATA_DIR") {
            config.data_dir = if dir == MEMORY_DATA_DIR {
                None
            } else {
                Some(PathBuf::from(dir))
            };
        }
        if let Some(provider) = get("TUEBO_PROVIDER") {
            config.provider = provider
                .parse()
                .map_err(|reason| ConfigError::Invalid {
                    var: "TUEBO_PROVIDER",
                    value: provider.clone(),
                    reason,
                })?;
        }
        if let Some(url) = get("TUEBO_SUMMARY_URL") {
            config.summary_url = url;
        }
        if let Some(url) = get("TUEBO_WEB_SEARCH_URL") {
            config.web_search_url = url;
        }
        if let Some(url) = get("TUEBO_VIDEO_SEARCH_URL") {
            config.video_search_url = url;
        }
        config.web_api_key = get("TUEBO_WEB_API_KEY");
        config.web_engine_id = get("TUEBO_WEB_ENGINE_ID");
        config.video_api_key = get("TUEBO_VIDEO_API_KEY");

        if let Some(v) = get("TUEBO_VIDEO_MAX_RESULTS") {
            config.video_max_results = parse_var("TUEBO_VIDEO_MAX_RESULTS", &v)?;
        }
        if let Some(v) = get("TUEBO_HISTORY_CAP") {
            config.history_cap = parse_var("TUEBO_HISTORY_CAP", &v)?;
        }
        if let Some(v) = get("TUEBO_RESULTS_CAP") {
            config.results_cap = parse_var("TUEBO_RESULTS_CAP", &v)?;
        }
        if let Some(pin) = get("TUEBO_PARENT_PIN") {
            config.parent_pin = pin;
        }
        if let Some(v) = get("TUEBO_HTTP_TIMEOUT_SECS") {
            config.http_timeout = Duration::from_secs(parse_var("TUEBO_HTTP_TIMEOUT_SECS", &v)?);
        }
        if let Some(v) = get("TUEBO_RETRY_MAX_ELAPSED_MS") {
            config.retry_max_elapsed =
                Duration::from_millis(parse_var("TUEBO_RETRY_MAX_ELAPSED_MS", &v)?);
        }
        if let Some(words) = get("TUEBO_BLOCKED_WORDS") {
            config.blocked_words = words
                .split(',')
                .map(|w| w.trim().to_string())
                .filter(|w| !w.is_empty())
                .collect();
        }

        Ok(config)
    }

    /// A cap of zero means unbounded.
    pub fn repository_limits(&self) -> RepositoryLimits {
        let cap = |n: usize| if n == 0 { Cap::Unbounded } else { Cap::Max(n) };
        RepositoryLimits {
            history_cap: cap(self.history_cap),
            results_cap: cap(self.results_cap),
        }
    }
}

fn parse_var<T>(var: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|e: T::Err| ConfigError::Invalid {
        var,
        value: value.to_string(),
        reason: e.to_string(),
    })
}
