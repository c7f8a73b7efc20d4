//! Canonical in-memory collections mirrored to a [`JsonStore`].
//!
//! Every reader goes through one [`Repository`], so there is a single copy of
//! favorites/history/results per process. Each mutation changes the
//! in-memory collection and writes the full collection back while holding
//! the state lock; concurrent mutations of the same key are serialized
//! instead of overwriting each other. A failed write is logged and the
//! in-memory state stays authoritative for the rest of the session.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::BTreeSet;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::collections::{self, Cap, Toggle};
use crate::storage::JsonStore;
use crate::text::normalize_term;
use crate::types::{HistoryEntry, ResultRecord};

pub const HISTORY_KEY: &str = "history";
pub const LEGACY_HISTORY_KEY: &str = "searchHistory";
pub const FAVORITES_KEY: &str = "favorites";
pub const FAVORITE_DETAILS_KEY: &str = "favoriteDetails";
pub const RESULTS_KEY: &str = "searchResults";
pub const BLOCKED_WORDS_KEY: &str = "blockedWords";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepositoryLimits {
    pub history_cap: Cap,
    pub results_cap: Cap,
}

impl Default for RepositoryLimits {
    fn default() -> Self {
        Self {
            history_cap: Cap::Max(10),
            results_cap: Cap::Max(50),
        }
    }
}

/// `favorites` was written either as full records or as bare keys paired
/// with a `favoriteDetails` side table.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StoredFavorites {
    Records(Vec<ResultRecord>),
    Keys(Vec<String>),
}

#[derive(Debug, Default, Clone)]
struct Collections {
    history: Vec<HistoryEntry>,
    results: Vec<ResultRecord>,
    favorites: Vec<ResultRecord>,
    blocked_words: BTreeSet<String>,
}

#[derive(Debug)]
pub struct Repository {
    store: JsonStore,
    limits: RepositoryLimits,
    state: Mutex<Collections>,
}

impl Repository {
    /// Load every collection from `store`.
    pub async fn open(store: JsonStore, limits: RepositoryLimits) -> Self {
        let collections = load_all(&store, limits).await;
        info!(
            "Repository opened on {} store: {} history, {} results, {} favorites, {} blocked words",
            store.backend_name(),
            collections.history.len(),
            collections.results.len(),
            collections.favorites.len(),
            collections.blocked_words.len()
        );
        Self {
            store,
            limits,
            state: Mutex::new(collections),
        }
    }

    pub fn limits(&self) -> RepositoryLimits {
        self.limits
    }

    /// Read one collection straight from the store. Absent or malformed data
    /// yields `fallback`.
    pub async fn load_collection<T: DeserializeOwned>(&self, key: &str, fallback: T) -> T {
        self.store.load(key, fallback).await
    }

    /// Re-read every collection, replacing the in-memory copy.
    pub async fn reload(&self) {
        let collections = load_all(&self.store, self.limits).await;
        *self.state.lock().await = collections;
        debug!("Repository reloaded");
    }

    // History

    pub async fn history(&self) -> Vec<HistoryEntry> {
        self.state.lock().await.history.clone()
    }

    pub async fn history_terms(&self) -> Vec<String> {
        self.state
            .lock()
            .await
            .history
            .iter()
            .map(|entry| entry.term.clone())
            .collect()
    }

    /// Put `term` at the front of the history, dropping an older occurrence
    /// and anything beyond the cap.
    pub async fn record_search(&self, term: &str) -> Vec<HistoryEntry> {
        let mut state = self.state.lock().await;
        self.push_history(&mut state, term).await;
        state.history.clone()
    }

    async fn push_history(&self, state: &mut Collections, term: &str) {
        let term = term.trim();
        if term.is_empty() {
            return;
        }
        let history = std::mem::take(&mut state.history);
        state.history =
            collections::upsert_and_cap(history, HistoryEntry::new(term), self.limits.history_cap);
        self.store.save(HISTORY_KEY, &state.history).await;
    }

    pub async fn remove_history(&self, term: &str) -> Vec<HistoryEntry> {
        let mut state = self.state.lock().await;
        let history = std::mem::take(&mut state.history);
        state.history = collections::remove_by_key(history, term);
        self.store.save(HISTORY_KEY, &state.history).await;
        state.history.clone()
    }

    pub async fn clear_history(&self) {
        let mut state = self.state.lock().await;
        state.history.clear();
        self.store.save(HISTORY_KEY, &state.history).await;
        info!("Search history cleared");
    }

    // Results

    pub async fn results(&self) -> Vec<ResultRecord> {
        self.state.lock().await.results.clone()
    }

    /// Merge fresh provider results into the cached results. Notices are
    /// never cached.
    pub async fn merge_results(&self, records: Vec<ResultRecord>) -> Vec<ResultRecord> {
        let mut state = self.state.lock().await;
        self.merge_into_results(&mut state, records).await;
        state.results.clone()
    }

    async fn merge_into_results(&self, state: &mut Collections, records: Vec<ResultRecord>) {
        let records: Vec<ResultRecord> = records
            .into_iter()
            .filter(|r| !r.is_notice() && !r.key.is_empty())
            .collect();
        if records.is_empty() {
            return;
        }
        let results = std::mem::take(&mut state.results);
        state.results = collections::merge_front(results, records, self.limits.results_cap);
        self.store.save(RESULTS_KEY, &state.results).await;
    }

    /// Persist the outcome of one search in a single critical section.
    /// `still_current` is evaluated while the lock is held; when it returns
    /// false nothing is written. The term goes into history only when
    /// `record_history` is set. Returns whether anything was committed.
    pub async fn commit_search<F>(
        &self,
        term: &str,
        records: Vec<ResultRecord>,
        record_history: bool,
        still_current: F,
    ) -> bool
    where
        F: Fn() -> bool,
    {
        let mut state = self.state.lock().await;
        if !still_current() {
            return false;
        }
        if record_history {
            self.push_history(&mut state, term).await;
        }
        self.merge_into_results(&mut state, records).await;
        true
    }

    pub async fn clear_results(&self) {
        let mut state = self.state.lock().await;
        state.results.clear();
        self.store.save(RESULTS_KEY, &state.results).await;
    }

    // Favorites

    pub async fn favorites(&self) -> Vec<ResultRecord> {
        self.state.lock().await.favorites.clone()
    }

    pub async fn favorite_keys(&self) -> Vec<String> {
        self.state
            .lock()
            .await
            .favorites
            .iter()
            .map(|r| r.key.clone())
            .collect()
    }

    pub async fn is_favorite(&self, key: &str) -> bool {
        collections::contains_key(&self.state.lock().await.favorites, key)
    }

    /// Add `record` unless its key is already a favorite. Returns whether it
    /// was added.
    pub async fn add_favorite(&self, record: ResultRecord) -> bool {
        let mut state = self.state.lock().await;
        if collections::contains_key(&state.favorites, &record.key) {
            debug!("Already favorited: {}", record.key);
            return false;
        }
        state.favorites.push(record);
        self.store.save(FAVORITES_KEY, &state.favorites).await;
        true
    }

    pub async fn toggle_favorite(&self, record: ResultRecord) -> (Toggle, Vec<ResultRecord>) {
        if record.is_notice() || record.key.is_empty() {
            return (Toggle::Ignored, self.favorites().await);
        }
        let mut state = self.state.lock().await;
        let favorites = std::mem::take(&mut state.favorites);
        let (favorites, toggle) = collections::toggle_record(favorites, record);
        state.favorites = favorites;
        self.store.save(FAVORITES_KEY, &state.favorites).await;
        (toggle, state.favorites.clone())
    }

    /// Toggle by key alone. Adding needs a detail record, looked up in the
    /// cached results; without one nothing happens.
    pub async fn toggle_favorite_key(&self, key: &str) -> (Toggle, Vec<ResultRecord>) {
        let mut state = self.state.lock().await;
        if collections::contains_key(&state.favorites, key) {
            let favorites = std::mem::take(&mut state.favorites);
            state.favorites = collections::remove_by_key(favorites, key);
            self.store.save(FAVORITES_KEY, &state.favorites).await;
            return (Toggle::Removed, state.favorites.clone());
        }
        match state.results.iter().find(|r| r.key == key).cloned() {
            Some(detail) => {
                state.favorites.push(detail);
                self.store.save(FAVORITES_KEY, &state.favorites).await;
                (Toggle::Added, state.favorites.clone())
            }
            None => {
                debug!("No detail record for favorite key {}, ignoring", key);
                (Toggle::Ignored, state.favorites.clone())
            }
        }
    }

    pub async fn remove_favorite(&self, key: &str) -> Vec<ResultRecord> {
        let mut state = self.state.lock().await;
        let favorites = std::mem::take(&mut state.favorites);
        state.favorites = collections::remove_by_key(favorites, key);
        self.store.save(FAVORITES_KEY, &state.favorites).await;
        state.favorites.clone()
    }

    // Blocked words

    pub async fn blocked_words(&self) -> Vec<String> {
        self.state.lock().await.blocked_words.iter().cloned().collect()
    }

    /// Returns `false` when the word is blank or already blocked.
    pub async fn add_blocked_word(&self, word: &str) -> bool {
        let word = normalize_term(word);
        if word.is_empty() {
            return false;
        }
        let mut state = self.state.lock().await;
        if !state.blocked_words.insert(word) {
            return false;
        }
        self.store.save(BLOCKED_WORDS_KEY, &state.blocked_words).await;
        true
    }

    pub async fn remove_blocked_word(&self, word: &str) -> bool {
        let word = normalize_term(word);
        let mut state = self.state.lock().await;
        if !state.blocked_words.remove(&word) {
            return false;
        }
        self.store.save(BLOCKED_WORDS_KEY, &state.blocked_words).await;
        true
    }

    /// A term is blocked when its normalized form, or any word in it, is a
    /// blocked word.
    pub async fn is_blocked(&self, term: &str) -> bool {
        let term = normalize_term(term);
        if term.is_empty() {
            return false;
        }
        let state = self.state.lock().await;
        state.blocked_words.contains(&term)
            || term
                .split_whitespace()
                .any(|word| state.blocked_words.contains(word))
    }
}

async fn load_all(store: &JsonStore, limits: RepositoryLimits) -> Collections {
    let history = match store.try_load::<Vec<HistoryEntry>>(HISTORY_KEY).await {
        Ok(Some(history)) => history,
        Ok(None) => store.load(LEGACY_HISTORY_KEY, Vec::new()).await,
        Err(e) => {
            warn!("Failed to load history, starting empty: {}", e);
            Vec::new()
        }
    };
    let mut history = collections::dedup_by_key(
        history
            .into_iter()
            .filter(|entry| !entry.term.trim().is_empty())
            .collect(),
    );
    limits.history_cap.truncate(&mut history);

    let mut results = collections::dedup_by_key(clean_records(
        store.load(RESULTS_KEY, Vec::new()).await,
    ));
    limits.results_cap.truncate(&mut results);

    let favorites = match store
        .load(FAVORITES_KEY, StoredFavorites::Records(Vec::new()))
        .await
    {
        StoredFavorites::Records(records) => clean_records(records),
        StoredFavorites::Keys(keys) => {
            let details: Vec<ResultRecord> = store.load(FAVORITE_DETAILS_KEY, Vec::new()).await;
            resolve_favorite_keys(keys, details)
        }
    };
    let favorites = collections::dedup_by_key(favorites);

    let blocked_words = store
        .load::<Vec<String>>(BLOCKED_WORDS_KEY, Vec::new())
        .await
        .iter()
        .map(|w| normalize_term(w))
        .filter(|w| !w.is_empty())
        .collect();

    Collections {
        history,
        results,
        favorites,
        blocked_words,
    }
}

fn clean_records(records: Vec<ResultRecord>) -> Vec<ResultRecord> {
    records
        .into_iter()
        .filter(|r| !r.key.is_empty() && !r.is_notice())
        .collect()
}

fn resolve_favorite_keys(keys: Vec<String>, details: Vec<ResultRecord>) -> Vec<ResultRecord> {
    keys.into_iter()
        .filter_map(|key| {
            let detail = details.iter().find(|d| d.key == key).cloned();
            if detail.is_none() {
                warn!("Favorite {} has no detail record, dropping it", key);
            }
            detail
        })
        .collect()
}
