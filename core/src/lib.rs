pub mod catalog;
pub mod config;
pub mod correlator;
pub mod meter;
pub mod parser;
pub mod rolls;
pub mod session;
pub mod timers;
pub mod watcher;

// Re-exports for convenience
pub use catalog::{CatalogError, SpellCatalog, SpellId, SpellRecord};
pub use config::AppConfig;
pub use correlator::{CastCorrelator, EffectFact};
pub use parser::{Classifier, GameEvent, LogEntry, parse_line};
pub use session::{CastingView, GameSession, SessionSnapshot};
pub use timers::{TimerManager, TimerSnapshot};
pub use watcher::{WatchError, WatchEvent, WatcherHandle};
