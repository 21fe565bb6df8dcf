//! Directory-level watch for character log files.
//!
//! Notifies when a new character log appears, one is removed, or a
//! different log receives writes, so the driver can follow whichever
//! character is actually playing. notify's callback runs on its own
//! thread; events bridge into tokio over an unbounded channel.

use std::path::{Path, PathBuf};

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::warn;

use super::{WatchError, parse_log_filename};

#[derive(Debug)]
pub enum DirectoryEvent {
    NewFile(PathBuf),
    FileRemoved(PathBuf),
    /// A character log received writes.
    FileWritten(PathBuf),
    Error(String),
}

pub struct DirectoryWatcher {
    // Held for its Drop; dropping stops the native watch.
    _watcher: RecommendedWatcher,
    rx: mpsc::UnboundedReceiver<DirectoryEvent>,
}

impl DirectoryWatcher {
    pub fn new(dir: &Path) -> Result<Self, WatchError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut watcher = notify::recommended_watcher(move |result: notify::Result<Event>| {
            match result {
                Ok(event) => {
                    for directory_event in translate(&event) {
                        if tx.send(directory_event).is_err() {
                            return;
                        }
                    }
                }
                Err(e) => {
                    warn!(error = %e, "directory watch error");
                    tx.send(DirectoryEvent::Error(e.to_string())).ok();
                }
            }
        })?;
        watcher.watch(dir, RecursiveMode::NonRecursive)?;
        Ok(Self {
            _watcher: watcher,
            rx,
        })
    }

    pub async fn next_event(&mut self) -> Option<DirectoryEvent> {
        self.rx.recv().await
    }
}

fn is_character_log(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .and_then(parse_log_filename)
        .is_some()
}

fn translate(event: &Event) -> Vec<DirectoryEvent> {
    let paths = event.paths.iter().filter(|p| is_character_log(p));
    match event.kind {
        EventKind::Create(_) => paths.cloned().map(DirectoryEvent::NewFile).collect(),
        EventKind::Remove(_) => paths.cloned().map(DirectoryEvent::FileRemoved).collect(),
        EventKind::Modify(_) => paths.cloned().map(DirectoryEvent::FileWritten).collect(),
        _ => Vec::new(),
    }
}
