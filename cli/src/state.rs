use std::sync::Arc;

use everlog_core::watcher::WatcherHandle;
use everlog_core::{AppConfig, GameSession, SpellCatalog};
use tokio::task::JoinHandle;
use tracing::warn;

pub struct AppState {
    pub config: AppConfig,
    pub catalog: Arc<SpellCatalog>,
    pub session: Option<GameSession>,
    pub active_file: Option<std::path::PathBuf>,
    pub tail_task: Option<WatcherHandle>,
    pub consumer_task: Option<JoinHandle<()>>,
    pub dir_watcher_task: Option<JoinHandle<()>>,
}

impl AppState {
    pub fn new() -> Self {
        let config = AppConfig::load();
        let whitelist = config.whitelist_file.as_ref().map(std::path::PathBuf::from);
        let catalog = match SpellCatalog::load(
            std::path::Path::new(&config.spells_file),
            whitelist.as_deref(),
        ) {
            Ok(catalog) => catalog,
            Err(e) => {
                warn!(error = %e, "running without spell data");
                SpellCatalog::empty()
            }
        };
        Self {
            config,
            catalog: Arc::new(catalog),
            session: None,
            active_file: None,
            tail_task: None,
            consumer_task: None,
            dir_watcher_task: None,
        }
    }

    /// Stop the tail and its consumer, keeping the session.
    pub fn stop_watch_tasks(&mut self) {
        if let Some(tail) = self.tail_task.take() {
            tail.abort();
        }
        if let Some(consumer) = self.consumer_task.take() {
            consumer.abort();
        }
    }
}
