//! One search from raw input to persisted history.
//!
//! Order matters: blank input is rejected before any I/O, blocked terms are
//! rejected before the provider is called or history is touched, and a
//! response that arrives after a newer search was issued is dropped.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

use crate::repository::Repository;
use crate::search::Gateway;
use crate::types::{ProviderKind, ResultRecord};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum SearchOutcome {
    /// Blank query; nothing happened.
    Rejected,
    Blocked { term: String },
    /// A newer search was issued before this one finished.
    Superseded { ticket: u64, term: String },
    Completed {
        ticket: u64,
        term: String,
        results: Vec<ResultRecord>,
    },
}

#[derive(Debug)]
pub struct SearchSession {
    repository: Arc<Repository>,
    gateway: Arc<Gateway>,
    sequence: AtomicU64,
}

impl SearchSession {
    pub fn new(repository: Arc<Repository>, gateway: Arc<Gateway>) -> Self {
        Self {
            repository,
            gateway,
            sequence: AtomicU64::new(0),
        }
    }

    /// Ticket of the most recently issued search, 0 before the first one.
    pub fn latest_ticket(&self) -> u64 {
        self.sequence.load(Ordering::SeqCst)
    }

    pub fn is_current(&self, ticket: u64) -> bool {
        self.latest_ticket() == ticket
    }

    fn issue_ticket(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub async fn run(&self, query: &str) -> SearchOutcome {
        self.run_with(None, query).await
    }

    pub async fn run_with(&self, provider: Option<ProviderKind>, query: &str) -> SearchOutcome {
        let term = query.trim();
        if term.is_empty() {
            return SearchOutcome::Rejected;
        }
        if self.repository.is_blocked(term).await {
            info!("Blocked search term rejected");
            return SearchOutcome::Blocked {
                term: term.to_string(),
            };
        }

        let ticket = self.issue_ticket();
        let kind = provider.unwrap_or_else(|| self.gateway.default_kind());
        let outcome = self.gateway.lookup(kind, term).await;

        // A failed call leaves history alone; an empty answer still counts.
        let committed = self
            .repository
            .commit_search(term, outcome.results.clone(), !outcome.failed, || {
                self.is_current(ticket)
            })
            .await;
        if !committed {
            debug!(
                "Dropping results for superseded search {} (latest {})",
                ticket,
                self.latest_ticket()
            );
            return SearchOutcome::Superseded {
                ticket,
                term: term.to_string(),
            };
        }

        SearchOutcome::Completed {
            ticket,
            term: term.to_string(),
            results: outcome.results,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collections::Toggle;
    use crate::repository::RepositoryLimits;
    use crate::search::{SearchError, SearchProvider, SummaryProvider, FAILURE_MESSAGE};
    use crate::storage::JsonStore;
    use crate::types::ResultKind;
    use async_trait::async_trait;
    use reqwest::Client;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Notify;

    /// Counts calls and answers with one web record per query, optionally
    /// parking queries named "slow" until released.
    #[derive(Default)]
    struct ScriptedProvider {
        calls: AtomicUsize,
        started: Notify,
        release: Notify,
        empty: bool,
    }

    #[async_trait]
    impl SearchProvider for ScriptedProvider {
        fn kind(&self) -> ProviderKind {
            ProviderKind::Web
        }

        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn fetch(&self, _client: &Client, query: &str) -> Result<Vec<ResultRecord>, SearchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if query == "slow" {
                self.started.notify_one();
                self.release.notified().await;
            }
            if self.empty {
                return Ok(Vec::new());
            }
            Ok(vec![ResultRecord {
                key: format!("https://example.org/{}", query),
                title: query.to_string(),
                summary: String::new(),
                image_url: None,
                kind: ResultKind::Web,
            }])
        }
    }

    async fn session_with(provider: Arc<ScriptedProvider>) -> (Arc<SearchSession>, Arc<Repository>) {
        let repository = Arc::new(
            Repository::open(JsonStore::memory(), RepositoryLimits::default()).await,
        );
        let gateway =
            Arc::new(Gateway::new(Client::new(), ProviderKind::Web).with_provider(provider));
        (
            Arc::new(SearchSession::new(repository.clone(), gateway)),
            repository,
        )
    }

    #[tokio::test]
    async fn test_completed_search_updates_history_and_results() {
        let provider = Arc::new(ScriptedProvider::default());
        let (session, repository) = session_with(provider.clone()).await;

        let outcome = session.run("  planets ").await;
        let SearchOutcome::Completed { ticket, term, results } = outcome else {
            panic!("expected completed outcome");
        };
        assert_eq!(ticket, 1);
        assert_eq!(term, "planets");
        assert_eq!(results.len(), 1);
        assert_eq!(repository.history_terms().await, vec!["planets"]);
        assert_eq!(repository.results().await, results);
    }

    #[tokio::test]
    async fn test_blank_query_is_rejected_without_io() {
        let provider = Arc::new(ScriptedProvider::default());
        let (session, repository) = session_with(provider.clone()).await;
        assert_eq!(session.run("   ").await, SearchOutcome::Rejected);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
        assert_eq!(session.latest_ticket(), 0);
        assert!(repository.history().await.is_empty());
    }

    #[tokio::test]
    async fn test_blocked_term_never_reaches_provider_or_history() {
        let provider = Arc::new(ScriptedProvider::default());
        let (session, repository) = session_with(provider.clone()).await;
        repository.add_blocked_word("xyz").await;

        let outcome = session.run("xyz").await;
        assert_eq!(outcome, SearchOutcome::Blocked { term: "xyz".into() });
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
        assert!(repository.history().await.is_empty());
        assert!(repository.results().await.is_empty());
    }

    #[tokio::test]
    async fn test_empty_answer_records_history_but_caches_nothing() {
        let provider = Arc::new(ScriptedProvider {
            empty: true,
            ..Default::default()
        });
        let (session, repository) = session_with(provider).await;

        let SearchOutcome::Completed { results, .. } = session.run("zzz").await else {
            panic!("expected completed outcome");
        };
        assert_eq!(results.len(), 1);
        assert!(results[0].is_notice());
        assert_eq!(results[0].summary, "No results found for zzz");
        assert_eq!(repository.history_terms().await, vec!["zzz"]);
        assert!(repository.results().await.is_empty());
    }

    #[tokio::test]
    async fn test_failed_search_leaves_history_untouched() {
        let repository = Arc::new(
            Repository::open(JsonStore::memory(), RepositoryLimits::default()).await,
        );
        let gateway = Arc::new(
            Gateway::new(Client::new(), ProviderKind::Summary).with_provider(Arc::new(
                SummaryProvider::new("http://127.0.0.1:1/page/summary"),
            )),
        );
        let session = SearchSession::new(repository.clone(), gateway);

        let SearchOutcome::Completed { ticket, results, .. } = session.run("volcano").await else {
            panic!("expected completed outcome");
        };
        assert_eq!(ticket, 1);
        assert_eq!(results, vec![ResultRecord::notice("volcano", FAILURE_MESSAGE)]);
        assert!(repository.history().await.is_empty());
        assert!(repository.results().await.is_empty());
    }

    #[tokio::test]
    async fn test_superseded_response_is_discarded() {
        let provider = Arc::new(ScriptedProvider::default());
        let (session, repository) = session_with(provider.clone()).await;

        let slow = {
            let session = session.clone();
            tokio::spawn(async move { session.run("slow").await })
        };
        provider.started.notified().await;

        let fast = session.run("fast").await;
        assert!(matches!(fast, SearchOutcome::Completed { ticket: 2, .. }));

        provider.release.notify_one();
        let slow = slow.await.unwrap();
        assert_eq!(
            slow,
            SearchOutcome::Superseded {
                ticket: 1,
                term: "slow".into()
            }
        );

        assert_eq!(repository.history_terms().await, vec!["fast"]);
        let keys: Vec<String> = repository.results().await.into_iter().map(|r| r.key).collect();
        assert_eq!(keys, vec!["https://example.org/fast"]);
    }

    #[tokio::test]
    async fn test_favorite_then_unfavorite_keeps_result() {
        let provider = Arc::new(ScriptedProvider::default());
        let (session, repository) = session_with(provider).await;
        session.run("L1").await;

        let key = "https://example.org/L1";
        let (toggle, _) = repository.toggle_favorite_key(key).await;
        assert_eq!(toggle, Toggle::Added);
        let (toggle, favorites) = repository.toggle_favorite_key(key).await;
        assert_eq!(toggle, Toggle::Removed);
        assert!(favorites.is_empty());
        assert_eq!(repository.results().await[0].key, key);
    }
}
