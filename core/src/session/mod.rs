//! Session driver.
//!
//! One [`GameSession`] per watched character. Entries are processed in
//! strict arrival order by the single owner; `process` runs before
//! `tick` in the drive loop, so an application and an expiry landing on
//! the same boundary resolve in favor of the application.

use std::sync::Arc;

use chrono::NaiveDateTime;
use everlog_types::{MeterSettings, TimerSettings};
use tracing::info;

use crate::catalog::SpellCatalog;
use crate::correlator::CastCorrelator;
use crate::meter::{DamageAggregator, MeterSnapshot};
use crate::parser::{Classifier, GameEvent, LogEntry};
use crate::rolls::{RollTracker, TrackedRoll};
use crate::timers::{TimerManager, TimerSnapshot};
use crate::watcher::{find_logout_periods, find_zone_periods, TimePeriod};

/// An in-flight cast, for the casting bar.
#[derive(Debug, Clone, PartialEq)]
pub struct CastingView {
    /// Spell name, or the item name for a clicked item.
    pub name: String,
    /// Elapsed fraction of the cast time, 0..1.
    pub progress: f64,
    pub remaining_ms: i64,
}

#[derive(Debug, Clone)]
struct CastingState {
    name: String,
    started_at: NaiveDateTime,
    duration_ms: u32,
}

/// Immutable presentation view of the whole session.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub character: String,
    pub level: u8,
    pub casting: Option<CastingView>,
    pub timers: TimerSnapshot,
    pub meter: MeterSnapshot,
    pub rolls: Vec<TrackedRoll>,
}

pub struct GameSession {
    catalog: Arc<SpellCatalog>,
    character: String,
    classifier: Classifier,
    correlator: CastCorrelator,
    timers: TimerManager,
    meter: DamageAggregator,
    rolls: RollTracker,
    casting: Option<CastingState>,
}

impl GameSession {
    pub fn new(
        catalog: Arc<SpellCatalog>,
        character: &str,
        level: u8,
        timer_settings: &TimerSettings,
        meter_settings: &MeterSettings,
    ) -> Self {
        let correlator = CastCorrelator::new(
            Arc::clone(&catalog),
            timer_settings.cast_window_secs,
            level,
            timer_settings.fallback_duration_secs,
        );
        Self {
            classifier: Classifier::new(Arc::clone(&catalog)),
            catalog,
            character: character.to_string(),
            correlator,
            timers: TimerManager::new(f64::from(timer_settings.warn_fraction)),
            meter: DamageAggregator::new(meter_settings.window_secs, meter_settings.idle_secs),
            rolls: RollTracker::new(),
            casting: None,
        }
    }

    /// Attach a persistent learned-items store.
    pub fn with_learned_items(mut self, path: &std::path::Path) -> Self {
        self.correlator = self.correlator.with_learned_items(path);
        self
    }

    pub fn character(&self) -> &str {
        &self.character
    }

    pub fn set_level(&mut self, level: u8) {
        info!(character = %self.character, level, "level set");
        self.correlator.set_level(level);
    }

    /// Route one entry through classification, correlation, and state.
    pub fn process(&mut self, entry: &LogEntry) {
        let now = entry.timestamp;
        match self.classifier.classify(entry) {
            GameEvent::CastBegin { spell } => {
                let duration_ms = self.catalog.cast_time_ms(&spell);
                self.casting = (duration_ms > 0).then(|| CastingState {
                    name: spell.clone(),
                    started_at: now,
                    duration_ms,
                });
                self.correlator.begin_cast(&spell, now);
            }
            GameEvent::ItemUsed { item } => {
                // A learned glow-to-land delay doubles as the item's cast
                // time. A spell bar already underway takes precedence.
                if self.casting.is_none()
                    && let Some(secs) = self.correlator.learned_cast_time_secs(&item)
                    && secs > 0
                {
                    self.casting = Some(CastingState {
                        name: item.clone(),
                        started_at: now,
                        duration_ms: secs * 1000,
                    });
                }
                self.correlator.item_used(&item, now);
            }
            GameEvent::CastFailed => {
                self.casting = None;
                self.correlator.cast_failed();
            }
            GameEvent::LandedOnSelf {
                message,
                candidates,
            } => {
                self.casting = None;
                let fact = self.correlator.landed_on_self(&message, &candidates, now);
                self.timers.apply(&fact);
            }
            GameEvent::LandedOnOther {
                target,
                suffix: _,
                candidates,
            } => {
                self.casting = None;
                if let Some(fact) =
                    self.correlator
                        .landed_on_other(&target, &entry.message, &candidates, now)
                {
                    self.timers.apply(&fact);
                }
            }
            GameEvent::Faded { candidates } => {
                for id in candidates {
                    if let Some(record) = self.catalog.get(id) {
                        self.timers.remove(&record.name, "You");
                    }
                }
            }
            GameEvent::WornOff { spell } => self.timers.remove(&spell, "You"),
            GameEvent::Damage {
                attacker,
                target,
                amount,
            } => self.meter.record(now, &attacker, &target, amount),
            GameEvent::SlainByYou { target } => {
                self.timers.remove_all_for_target(&target);
                self.meter.end_encounter();
            }
            GameEvent::SlainByOther => self.meter.end_encounter(),
            GameEvent::Died => {
                info!(character = %self.character, "death, clearing timers");
                self.casting = None;
                self.timers.clear();
                self.correlator.cast_failed();
                self.meter.end_encounter();
            }
            GameEvent::Roll(roll) => self.rolls.record(roll),
            GameEvent::ZoneChange | GameEvent::Unrecognized => {}
        }
    }

    /// Drive expiry. Returns the evicted (spell, target) pairs.
    pub fn tick(&mut self, now: NaiveDateTime) -> Vec<(String, String)> {
        self.correlator.expire_stale(now);
        self.timers.tick(now)
    }

    pub fn snapshot(&mut self, now: NaiveDateTime) -> SessionSnapshot {
        SessionSnapshot {
            character: self.character.clone(),
            level: self.correlator.level(),
            casting: self.casting_view(now),
            timers: self.timers.snapshot(now),
            meter: self.meter.snapshot(now),
            rolls: self.rolls.rolls(),
        }
    }

    fn casting_view(&self, now: NaiveDateTime) -> Option<CastingView> {
        let casting = self.casting.as_ref()?;
        let elapsed_ms = (now - casting.started_at).num_milliseconds();
        let total_ms = i64::from(casting.duration_ms);
        if elapsed_ms < 0 || elapsed_ms >= total_ms {
            return None;
        }
        Some(CastingView {
            name: casting.name.clone(),
            progress: elapsed_ms as f64 / total_ms as f64,
            remaining_ms: total_ms - elapsed_ms,
        })
    }

    pub fn pick_roll_winner(
        &self,
        low: i64,
        high: i64,
    ) -> Result<&crate::rolls::RollRecord, crate::rolls::RollError> {
        self.rolls.pick_winner(low, high)
    }

    /// Replay preloaded history. Effect clocks pause across logouts and
    /// loading screens, so every such gap pushes active expiries forward.
    pub fn preload(&mut self, entries: &[LogEntry], now: NaiveDateTime) {
        let mut pauses: Vec<TimePeriod> = find_logout_periods(entries);
        pauses.extend(find_zone_periods(entries));
        pauses.sort_by_key(|p| p.start);
        let mut pauses = pauses.into_iter().peekable();

        for entry in entries {
            while let Some(pause) = pauses.peek() {
                if entry.timestamp >= pause.end {
                    self.timers.extend_all(pause.duration());
                    pauses.next();
                } else {
                    break;
                }
            }
            self.process(entry);
        }

        let evicted = self.tick(now);
        info!(
            character = %self.character,
            entries = entries.len(),
            evicted = evicted.len(),
            "history replay complete"
        );
    }
}
