use std::path::PathBuf;
use std::sync::Arc;

use everlog_core::watcher::{parse_log_filename, DirectoryEvent, DirectoryWatcher};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use crate::commands;
use crate::state::AppState;

/// Start the directory watcher that follows whichever character's log is
/// being written.
pub async fn init_watcher(state: Arc<RwLock<AppState>>) -> Option<JoinHandle<()>> {
    let dir = {
        let s = state.read().await;
        PathBuf::from(&s.config.log_directory)
    };

    if !dir.exists() {
        println!("Warning: log directory {} does not exist", dir.display());
        return None;
    }

    let mut watcher = match DirectoryWatcher::new(&dir) {
        Ok(w) => w,
        Err(e) => {
            println!("Failed to start directory watcher: {e}");
            return None;
        }
    };

    println!("Watching directory: {}", dir.display());

    let watcher_state = Arc::clone(&state);
    let handle = tokio::spawn(async move {
        while let Some(event) = watcher.next_event().await {
            handle_watcher_event(event, Arc::clone(&watcher_state)).await;
        }
    });

    Some(handle)
}

async fn handle_watcher_event(event: DirectoryEvent, state: Arc<RwLock<AppState>>) {
    match event {
        // A different character's log receiving writes means the player
        // switched characters; follow them.
        DirectoryEvent::FileWritten(path) | DirectoryEvent::NewFile(path) => {
            let should_switch = {
                let s = state.read().await;
                if s.session.is_none() {
                    false
                } else if s.active_file.as_deref() == Some(path.as_path()) {
                    false
                } else {
                    matches_server(&path, &s.config.server)
                }
            };
            if should_switch {
                println!("Log activity on {}, switching", path.display());
                commands::watch_path(&path, state).await;
            }
        }

        DirectoryEvent::FileRemoved(path) => {
            let mut s = state.write().await;
            if s.active_file.as_deref() == Some(path.as_path()) {
                println!("Active log file removed: {}", path.display());
                s.stop_watch_tasks();
                s.active_file = None;
            }
        }

        DirectoryEvent::Error(err) => {
            println!("Directory watch error: {err}");
        }
    }
}

fn matches_server(path: &std::path::Path, server: &str) -> bool {
    if server.is_empty() {
        return true;
    }
    path.file_name()
        .and_then(|n| n.to_str())
        .and_then(parse_log_filename)
        .is_some_and(|(_, file_server)| file_server == server)
}
