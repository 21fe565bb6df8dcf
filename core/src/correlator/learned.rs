//! Persistent item -> spell associations.
//!
//! Clicked items produce no "You begin casting" line on their own, so the
//! first confidently-resolved glow teaches us which spell an item casts.
//! Associations survive restarts as a JSON file; later learning overwrites
//! earlier.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LearnedEntry {
    pub spell: String,
    /// Observed glow-to-land delay, rounded to whole seconds.
    pub cast_time_secs: u32,
}

#[derive(Debug, Default)]
pub struct LearnedItems {
    path: Option<PathBuf>,
    entries: HashMap<String, LearnedEntry>,
}

impl LearnedItems {
    /// In-memory store with no persistence.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Load from `path`, creating an empty store when the file is missing.
    /// A corrupt file is discarded with a warning rather than an error.
    pub fn load(path: &Path) -> Self {
        let entries = match std::fs::read_to_string(path) {
            Ok(text) => match serde_json::from_str(&text) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "discarding corrupt learned-items file");
                    HashMap::new()
                }
            },
            Err(_) => HashMap::new(),
        };
        Self {
            path: Some(path.to_path_buf()),
            entries,
        }
    }

    pub fn get(&self, item: &str) -> Option<&LearnedEntry> {
        self.entries.get(item)
    }

    /// Record an association, overwriting any previous one, and persist.
    pub fn learn(&mut self, item: &str, spell: &str, cast_time_secs: u32) {
        debug!(item, spell, cast_time_secs, "learned item association");
        self.entries.insert(
            item.to_string(),
            LearnedEntry {
                spell: spell.to_string(),
                cast_time_secs,
            },
        );
        self.save();
    }

    fn save(&self) {
        let Some(path) = &self.path else { return };
        let json = match serde_json::to_string_pretty(&self.entries) {
            Ok(json) => json,
            Err(e) => {
                warn!(error = %e, "failed to serialize learned items");
                return;
            }
        };
        // Persistence failure must not interrupt line processing.
        if let Err(e) = std::fs::write(path, json) {
            warn!(path = %path.display(), error = %e, "failed to save learned items");
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
