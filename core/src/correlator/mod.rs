//! Cast correlation.
//!
//! A spell landing is spread across multiple ambiguous lines: an optional
//! "You begin casting" or item glow, then a landed message that may be
//! shared by several spells. The correlator holds short-lived pending
//! casts and resolves each landed message to one spell by a fixed
//! decision order:
//!
//! 1. an open pending cast whose spell is among the candidates
//!    (earliest-opened wins when several match),
//! 2. a recent item glow with a learned item association,
//! 3. the spell most recently resolved for this exact message text,
//! 4. the best catalog candidate, flagged low-confidence.
//!
//! Self-landed messages always resolve (an unknown placeholder with the
//! fallback duration if nothing else applies); other-landed messages with
//! no contextual support are dropped, since suffix matching alone is too
//! noisy to trust.

mod learned;


pub use learned::LearnedItems;

use std::path::Path;
use std::sync::Arc;

use chrono::{Duration, NaiveDateTime};
use everlog_types::TimerKind;
use tracing::debug;

use crate::catalog::{SpellCatalog, SpellId, SpellRecord};

/// One resolved effect, ready for the timer manager.
#[derive(Debug, Clone, PartialEq)]
pub struct EffectFact {
    pub spell_id: Option<SpellId>,
    pub spell_name: String,
    pub target: String,
    pub kind: TimerKind,
    pub duration_secs: u32,
    pub low_confidence: bool,
    pub timestamp: NaiveDateTime,
}

#[derive(Debug, Clone)]
struct PendingCast {
    spell: String,
    opened_at: NaiveDateTime,
    item: Option<String>,
}

/// Resolves ambiguous landed messages into [`EffectFact`]s.
pub struct CastCorrelator {
    catalog: Arc<SpellCatalog>,
    /// Open casts, oldest first. Item glows can open a second entry
    /// alongside a spell cast, so this is a list rather than a slot.
    pending: Vec<PendingCast>,
    learned: LearnedItems,
    recent_item: Option<(String, NaiveDateTime)>,
    /// Message text -> spell that last resolved for it.
    recent_by_text: hashbrown::HashMap<String, SpellId>,
    window: Duration,
    level: u8,
    fallback_duration_secs: u32,
}

impl CastCorrelator {
    pub fn new(
        catalog: Arc<SpellCatalog>,
        window_secs: u32,
        level: u8,
        fallback_duration_secs: u32,
    ) -> Self {
        Self {
            catalog,
            pending: Vec::new(),
            learned: LearnedItems::in_memory(),
            recent_item: None,
            recent_by_text: hashbrown::HashMap::new(),
            window: Duration::seconds(i64::from(window_secs)),
            level,
            fallback_duration_secs,
        }
    }

    /// Use a persistent learned-items store instead of the in-memory one.
    pub fn with_learned_items(mut self, path: &Path) -> Self {
        self.learned = LearnedItems::load(path);
        self
    }

    pub fn set_level(&mut self, level: u8) {
        self.level = level;
    }

    pub fn level(&self) -> u8 {
        self.level
    }

    /// "You begin casting <spell>." Replaces any open spell cast; an open
    /// item glow stays.
    pub fn begin_cast(&mut self, spell: &str, now: NaiveDateTime) {
        self.expire_stale(now);
        self.pending.retain(|p| p.item.is_some());
        self.pending.push(PendingCast {
            spell: spell.to_string(),
            opened_at: now,
            item: None,
        });
    }

    /// "Your <item> begins to glow."
    ///
    /// Attaches the item to a just-opened spell cast when one exists;
    /// otherwise a learned association synthesizes a pending cast so
    /// instant-click items still resolve confidently.
    pub fn item_used(&mut self, item: &str, now: NaiveDateTime) {
        self.expire_stale(now);
        self.recent_item = Some((item.to_string(), now));

        if let Some(open) = self.pending.iter_mut().rev().find(|p| p.item.is_none()) {
            open.item = Some(item.to_string());
            return;
        }
        if let Some(entry) = self.learned.get(item) {
            self.pending.push(PendingCast {
                spell: entry.spell.clone(),
                opened_at: now,
                item: Some(item.to_string()),
            });
        }
    }

    /// Fizzle, resist, or interrupt: the cast will not land.
    pub fn cast_failed(&mut self) {
        self.pending.clear();
    }

    /// Observed glow-to-land delay for a learned item, if any.
    pub fn learned_cast_time_secs(&self, item: &str) -> Option<u32> {
        self.learned.get(item).map(|entry| entry.cast_time_secs)
    }

    /// Drop pending casts older than the resolution window.
    pub fn expire_stale(&mut self, now: NaiveDateTime) {
        let window = self.window;
        self.pending.retain(|p| now - p.opened_at <= window);
        if let Some((_, at)) = &self.recent_item
            && now - *at > window
        {
            self.recent_item = None;
        }
    }

    /// A cast-on-you message landed. Always produces a fact.
    pub fn landed_on_self(
        &mut self,
        message: &str,
        candidates: &[SpellId],
        now: NaiveDateTime,
    ) -> EffectFact {
        self.expire_stale(now);
        let resolution = self.resolve(message, candidates, now);
        match resolution {
            Some((record, own_cast, low_confidence)) => {
                // Self-only spells cannot have come from anyone else.
                let kind = if !record.beneficial {
                    TimerKind::Debuff
                } else if own_cast || record.is_self_only() {
                    TimerKind::SelfBuff
                } else {
                    TimerKind::ReceivedBuff
                };
                self.fact(&record, "You", kind, low_confidence, now)
            }
            None => {
                // Unknown placeholder: keep the message visible even
                // though no spell data backs it.
                debug!(message, "unresolved self effect, using placeholder");
                EffectFact {
                    spell_id: None,
                    spell_name: message.trim_end_matches('.').to_string(),
                    target: "You".to_string(),
                    kind: TimerKind::ReceivedBuff,
                    duration_secs: self.fallback_duration_secs,
                    low_confidence: true,
                    timestamp: now,
                }
            }
        }
    }

    /// A cast-on-other message landed. Returns `None` when nothing but the
    /// suffix match supports it.
    pub fn landed_on_other(
        &mut self,
        target: &str,
        message: &str,
        candidates: &[SpellId],
        now: NaiveDateTime,
    ) -> Option<EffectFact> {
        self.expire_stale(now);
        let (record, _, low_confidence) = self.resolve(message, candidates, now)?;
        if low_confidence {
            debug!(target, message, "dropping uncorroborated other-target effect");
            return None;
        }
        let kind = if record.beneficial {
            TimerKind::CastOnOther
        } else {
            TimerKind::Debuff
        };
        Some(self.fact(&record, target, kind, false, now))
    }

    /// Walk the decision order. Returns the chosen spell, whether it came
    /// from the player's own cast context, and the low-confidence flag.
    fn resolve(
        &mut self,
        message: &str,
        candidates: &[SpellId],
        now: NaiveDateTime,
    ) -> Option<(SpellRecord, bool, bool)> {
        let names: Vec<(SpellId, String)> = candidates
            .iter()
            .filter_map(|id| self.catalog.get(*id).map(|r| (*id, r.name.clone())))
            .collect();

        // 1. Pending cast, earliest-opened first.
        if let Some(idx) = self
            .pending
            .iter()
            .position(|p| names.iter().any(|(_, name)| *name == p.spell))
        {
            let pending = self.pending.remove(idx);
            let (id, _) = names
                .iter()
                .find(|(_, name)| *name == pending.spell)
                .cloned()?;
            let record = self.catalog.get(id)?.clone();
            if let Some(item) = &pending.item {
                let cast_time = (now - pending.opened_at).num_seconds().max(0) as u32;
                self.learned.learn(item, &record.name, cast_time);
            }
            self.remember(message, id);
            return Some((record, true, false));
        }

        // 2. Recent item glow with a learned association.
        if let Some((item, _)) = &self.recent_item
            && let Some(entry) = self.learned.get(item)
            && let Some((id, _)) = names.iter().find(|(_, name)| *name == entry.spell).cloned()
        {
            let record = self.catalog.get(id)?.clone();
            self.recent_item = None;
            self.remember(message, id);
            return Some((record, true, false));
        }

        // 3. Whatever last resolved for this exact text.
        if let Some(id) = self.recent_by_text.get(message).copied()
            && candidates.contains(&id)
        {
            let record = self.catalog.get(id)?.clone();
            return Some((record, false, false));
        }

        // 4. Best catalog candidate, low confidence.
        let record = self.catalog.best_match(candidates, None)?.clone();
        Some((record, false, true))
    }

    fn remember(&mut self, message: &str, id: SpellId) {
        self.recent_by_text.insert(message.to_string(), id);
    }

    fn fact(
        &self,
        record: &SpellRecord,
        target: &str,
        kind: TimerKind,
        low_confidence: bool,
        now: NaiveDateTime,
    ) -> EffectFact {
        let computed = record.duration_secs(self.level);
        let (duration_secs, low_confidence) = if computed == 0 {
            (self.fallback_duration_secs, true)
        } else {
            (computed, low_confidence)
        };
        EffectFact {
            spell_id: Some(record.id),
            spell_name: record.name.clone(),
            target: target.to_string(),
            kind,
            duration_secs,
            low_confidence,
            timestamp: now,
        }
    }
}
