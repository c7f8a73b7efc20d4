pub mod api;
pub mod collections;
pub mod config;
pub mod featured;
pub mod parental;
pub mod repository;
pub mod search;
pub mod session;
pub mod storage;
pub mod text;
pub mod types;

use std::sync::Arc;
use tracing::info;

use config::Config;
use parental::ParentGate;
use repository::Repository;
use search::Gateway;
use session::SearchSession;
use storage::{FileStore, JsonStore};

/// Everything a request handler needs. One repository per process, so every
/// reader sees the same favorites and history.
#[derive(Debug)]
pub struct AppState {
    pub repository: Arc<Repository>,
    pub gateway: Arc<Gateway>,
    pub session: SearchSession,
    pub parent_gate: ParentGate,
}

// Re-export the shared types for easy access
pub use types::*;

impl AppState {
    pub fn new(repository: Arc<Repository>, gateway: Arc<Gateway>, parent_gate: ParentGate) -> Self {
        Self {
            session: SearchSession::new(repository.clone(), gateway.clone()),
            repository,
            gateway,
            parent_gate,
        }
    }

    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        let store = match &config.data_dir {
            Some(dir) => {
                info!("Data directory: {}", dir.display());
                JsonStore::new(Arc::new(FileStore::new(dir)))
            }
            None => {
                info!("Using in-memory storage");
                JsonStore::memory()
            }
        };
        let repository = Arc::new(Repository::open(store, config.repository_limits()).await);
        for word in &config.blocked_words {
            repository.add_blocked_word(word).await;
        }
        let gateway = Arc::new(Gateway::from_config(config)?);

        Ok(Self::new(
            repository,
            gateway,
            ParentGate::new(config.parent_pin.clone()),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_from_config_seeds_blocked_words() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            data_dir: Some(dir.path().to_path_buf()),
            blocked_words: vec!["Scary".into(), "gore".into()],
            ..Config::default()
        };
        let state = AppState::from_config(&config).await.unwrap();
        assert_eq!(state.repository.blocked_words().await, vec!["gore", "scary"]);
        assert!(state.parent_gate.verify("1234"));
        assert!(dir.path().join("blockedWords.json").exists());

        // A second start over the same directory sees the same data.
        let reopened = AppState::from_config(&Config {
            blocked_words: Vec::new(),
            ..config
        })
        .await
        .unwrap();
        assert_eq!(reopened.repository.blocked_words().await.len(), 2);
    }

    #[test]
    fn test_in_memory_state() {
        let config = Config {
            data_dir: None,
            ..Config::default()
        };
        let state = tokio_test::block_on(AppState::from_config(&config)).unwrap();
        assert_eq!(state.gateway.default_kind(), ProviderKind::Summary);
        assert_eq!(state.session.latest_ticket(), 0);
    }
}
