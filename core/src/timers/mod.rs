//! Timer lifecycle.
//!
//! Self buffs, received buffs, and debuffs are flat timers keyed by
//! (spell, target). Beneficial spells you cast on others fold into one
//! grouped timer per spell with an ordered target -> expiry map, so ten
//! party members under the same buff occupy one display row.

use std::collections::BTreeMap;

use chrono::{Duration, NaiveDateTime};
use everlog_types::TimerKind;
use hashbrown::HashMap;
use tracing::debug;

use crate::correlator::EffectFact;

#[derive(Debug, Clone, PartialEq)]
pub struct ActiveTimer {
    pub spell_name: String,
    pub target: String,
    pub kind: TimerKind,
    pub started_at: NaiveDateTime,
    pub expires_at: NaiveDateTime,
    pub low_confidence: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupedTimer {
    pub spell_name: String,
    /// Target -> expiry, update-or-insert. A target never appears twice.
    pub targets: BTreeMap<String, NaiveDateTime>,
    pub low_confidence: bool,
}

/// One entry of a presentation snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct TimerView {
    pub spell_name: String,
    pub target: String,
    pub remaining_secs: i64,
    /// Remaining time over total duration, clamped to 0..=1.
    pub remaining_fraction: f64,
    /// Set once remaining drops below the warning fraction of total.
    pub expiring: bool,
    pub low_confidence: bool,
}

/// A grouped cast-on-other row: one spell, many targets.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupedView {
    pub spell_name: String,
    /// (target, remaining seconds), soonest first.
    pub targets: Vec<(String, i64)>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimerSnapshot {
    pub self_buffs: Vec<TimerView>,
    pub received_buffs: Vec<TimerView>,
    pub debuffs: Vec<TimerView>,
    pub cast_on_others: Vec<GroupedView>,
}

/// Owns every active timer and drives expiry.
pub struct TimerManager {
    solo: HashMap<(String, String), ActiveTimer>,
    grouped: HashMap<String, GroupedTimer>,
    warn_fraction: f64,
}

impl TimerManager {
    pub fn new(warn_fraction: f64) -> Self {
        Self {
            solo: HashMap::new(),
            grouped: HashMap::new(),
            warn_fraction,
        }
    }

    /// Apply a resolved effect. Re-application refreshes the expiry but
    /// never pulls an existing expiry earlier.
    pub fn apply(&mut self, fact: &EffectFact) {
        let expires_at = fact.timestamp + Duration::seconds(fact.duration_secs as i64);

        if fact.kind == TimerKind::CastOnOther {
            let group = self
                .grouped
                .entry(fact.spell_name.clone())
                .or_insert_with(|| GroupedTimer {
                    spell_name: fact.spell_name.clone(),
                    targets: BTreeMap::new(),
                    low_confidence: fact.low_confidence,
                });
            let entry = group.targets.entry(fact.target.clone()).or_insert(expires_at);
            if expires_at > *entry {
                *entry = expires_at;
            }
            return;
        }

        let key = (fact.spell_name.clone(), fact.target.clone());
        match self.solo.get_mut(&key) {
            Some(timer) if expires_at <= timer.expires_at => {}
            Some(timer) => {
                timer.started_at = fact.timestamp;
                timer.expires_at = expires_at;
                timer.low_confidence = fact.low_confidence;
            }
            None => {
                self.solo.insert(
                    key,
                    ActiveTimer {
                        spell_name: fact.spell_name.clone(),
                        target: fact.target.clone(),
                        kind: fact.kind,
                        started_at: fact.timestamp,
                        expires_at,
                        low_confidence: fact.low_confidence,
                    },
                );
            }
        }
    }

    /// Remove by spell name, everywhere it appears for the target.
    pub fn remove(&mut self, spell_name: &str, target: &str) {
        self.solo
            .retain(|(name, tgt), _| !(name == spell_name && tgt == target));
        if let Some(group) = self.grouped.get_mut(spell_name) {
            group.targets.remove(target);
            if group.targets.is_empty() {
                self.grouped.remove(spell_name);
            }
        }
    }

    /// Drop every timer on one target (a death removes its debuffs).
    pub fn remove_all_for_target(&mut self, target: &str) {
        self.solo.retain(|(_, tgt), _| tgt != target);
        self.grouped.retain(|_, group| {
            group.targets.remove(target);
            !group.targets.is_empty()
        });
    }

    pub fn clear(&mut self) {
        self.solo.clear();
        self.grouped.clear();
    }

    /// Evict everything expired at `now`; returns the evicted (spell,
    /// target) pairs. Idempotent when nothing has expired since last call.
    pub fn tick(&mut self, now: NaiveDateTime) -> Vec<(String, String)> {
        let mut evicted = Vec::new();
        self.solo.retain(|key, timer| {
            if timer.expires_at <= now {
                evicted.push(key.clone());
                false
            } else {
                true
            }
        });
        self.grouped.retain(|spell, group| {
            group.targets.retain(|target, expiry| {
                if *expiry <= now {
                    evicted.push((spell.clone(), target.clone()));
                    false
                } else {
                    true
                }
            });
            !group.targets.is_empty()
        });
        if !evicted.is_empty() {
            debug!(count = evicted.len(), "timers expired");
        }
        evicted
    }

    /// Push every expiry forward, covering a logout or loading-screen gap
    /// during which effect clocks were paused.
    pub fn extend_all(&mut self, pause: Duration) {
        for timer in self.solo.values_mut() {
            timer.expires_at += pause;
        }
        for group in self.grouped.values_mut() {
            for expiry in group.targets.values_mut() {
                *expiry += pause;
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.solo.is_empty() && self.grouped.is_empty()
    }

    /// Presentation view at `now`, sorted soonest-expiring first with name
    /// as the tie-break.
    pub fn snapshot(&self, now: NaiveDateTime) -> TimerSnapshot {
        let mut snapshot = TimerSnapshot::default();

        let mut solo: Vec<&ActiveTimer> = self.solo.values().collect();
        solo.sort_by(|a, b| {
            (a.expires_at, &a.spell_name).cmp(&(b.expires_at, &b.spell_name))
        });
        for timer in solo {
            let total = (timer.expires_at - timer.started_at).num_seconds().max(1);
            let remaining = (timer.expires_at - now).num_seconds();
            let fraction = (remaining as f64 / total as f64).clamp(0.0, 1.0);
            let view = TimerView {
                spell_name: timer.spell_name.clone(),
                target: timer.target.clone(),
                remaining_secs: remaining.max(0),
                remaining_fraction: fraction,
                expiring: fraction < self.warn_fraction,
                low_confidence: timer.low_confidence,
            };
            match timer.kind {
                TimerKind::SelfBuff => snapshot.self_buffs.push(view),
                TimerKind::ReceivedBuff => snapshot.received_buffs.push(view),
                TimerKind::Debuff => snapshot.debuffs.push(view),
                TimerKind::CastOnOther => {}
            }
        }

        let mut grouped: Vec<&GroupedTimer> = self.grouped.values().collect();
        grouped.sort_by(|a, b| a.spell_name.cmp(&b.spell_name));
        for group in grouped {
            let mut targets: Vec<(String, i64)> = group
                .targets
                .iter()
                .map(|(target, expiry)| (target.clone(), (*expiry - now).num_seconds().max(0)))
                .collect();
            targets.sort_by(|a, b| (a.1, &a.0).cmp(&(b.1, &b.0)));
            snapshot.cast_on_others.push(GroupedView {
                spell_name: group.spell_name.clone(),
                targets,
            });
        }

        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ts(secs: i64) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 10, 9)
            .unwrap()
            .and_hms_opt(21, 0, 0)
            .unwrap()
            + Duration::seconds(secs)
    }

    fn fact(spell: &str, target: &str, kind: TimerKind, duration: u32, at: i64) -> EffectFact {
        EffectFact {
            spell_id: None,
            spell_name: spell.to_string(),
            target: target.to_string(),
            kind,
            duration_secs: duration,
            low_confidence: false,
            timestamp: ts(at),
        }
    }

    #[test]
    fn reapplication_refreshes_but_never_shortens() {
        let mut timers = TimerManager::new(0.2);
        timers.apply(&fact("Clarity", "You", TimerKind::SelfBuff, 600, 0));
        // A shorter reapplication (lower level recast) is ignored.
        timers.apply(&fact("Clarity", "You", TimerKind::SelfBuff, 60, 10));
        let snap = timers.snapshot(ts(10));
        assert_eq!(snap.self_buffs[0].remaining_secs, 590);

        // A later expiry wins.
        timers.apply(&fact("Clarity", "You", TimerKind::SelfBuff, 600, 100));
        let snap = timers.snapshot(ts(100));
        assert_eq!(snap.self_buffs[0].remaining_secs, 600);
    }

    #[test]
    fn cast_on_other_groups_by_spell() {
        let mut timers = TimerManager::new(0.2);
        timers.apply(&fact("Clarity", "Tarvik", TimerKind::CastOnOther, 600, 0));
        timers.apply(&fact("Clarity", "Meria", TimerKind::CastOnOther, 600, 5));
        timers.apply(&fact("Clarity", "Tarvik", TimerKind::CastOnOther, 600, 10));

        let snap = timers.snapshot(ts(10));
        assert_eq!(snap.cast_on_others.len(), 1);
        let group = &snap.cast_on_others[0];
        assert_eq!(group.spell_name, "Clarity");
        // Tarvik appears once, refreshed; soonest-expiring target first.
        assert_eq!(
            group.targets,
            vec![("Meria".to_string(), 595), ("Tarvik".to_string(), 600)]
        );
    }

    #[test]
    fn tick_evicts_expired_and_is_idempotent() {
        let mut timers = TimerManager::new(0.2);
        timers.apply(&fact("Clarity", "You", TimerKind::SelfBuff, 60, 0));
        timers.apply(&fact("Haste", "You", TimerKind::SelfBuff, 600, 0));
        timers.apply(&fact("Clarity", "Tarvik", TimerKind::CastOnOther, 60, 0));

        let evicted = timers.tick(ts(60));
        assert_eq!(evicted.len(), 2);
        assert!(evicted.contains(&("Clarity".to_string(), "You".to_string())));
        assert!(evicted.contains(&("Clarity".to_string(), "Tarvik".to_string())));

        assert!(timers.tick(ts(60)).is_empty());
        assert_eq!(timers.snapshot(ts(60)).self_buffs.len(), 1);
    }

    #[test]
    fn remove_clears_both_shapes() {
        let mut timers = TimerManager::new(0.2);
        timers.apply(&fact("Clarity", "You", TimerKind::SelfBuff, 600, 0));
        timers.apply(&fact("Clarity", "Tarvik", TimerKind::CastOnOther, 600, 0));

        timers.remove("Clarity", "You");
        timers.remove("Clarity", "Tarvik");
        assert!(timers.is_empty());
    }

    #[test]
    fn remove_all_for_target() {
        let mut timers = TimerManager::new(0.2);
        timers.apply(&fact("Tainted Breath", "a gnoll", TimerKind::Debuff, 70, 0));
        timers.apply(&fact("Clarity", "a gnoll", TimerKind::CastOnOther, 600, 0));
        timers.apply(&fact("Clarity", "You", TimerKind::SelfBuff, 600, 0));

        timers.remove_all_for_target("a gnoll");
        let snap = timers.snapshot(ts(0));
        assert!(snap.debuffs.is_empty());
        assert!(snap.cast_on_others.is_empty());
        assert_eq!(snap.self_buffs.len(), 1);
    }

    #[test]
    fn expiring_flag_follows_warn_fraction() {
        let mut timers = TimerManager::new(0.2);
        timers.apply(&fact("Clarity", "You", TimerKind::SelfBuff, 100, 0));

        assert!(!timers.snapshot(ts(50)).self_buffs[0].expiring);
        assert!(timers.snapshot(ts(85)).self_buffs[0].expiring);
    }

    #[test]
    fn extend_all_covers_gaps() {
        let mut timers = TimerManager::new(0.2);
        timers.apply(&fact("Clarity", "You", TimerKind::SelfBuff, 600, 0));
        timers.apply(&fact("Clarity", "Tarvik", TimerKind::CastOnOther, 600, 0));

        timers.extend_all(Duration::seconds(300));
        let snap = timers.snapshot(ts(600));
        assert_eq!(snap.self_buffs[0].remaining_secs, 300);
        assert_eq!(snap.cast_on_others[0].targets[0].1, 300);
    }

    #[test]
    fn snapshot_sorts_soonest_first() {
        let mut timers = TimerManager::new(0.2);
        timers.apply(&fact("Haste", "You", TimerKind::SelfBuff, 600, 0));
        timers.apply(&fact("Clarity", "You", TimerKind::SelfBuff, 60, 0));

        let snap = timers.snapshot(ts(0));
        let names: Vec<&str> = snap
            .self_buffs
            .iter()
            .map(|v| v.spell_name.as_str())
            .collect();
        assert_eq!(names, vec!["Clarity", "Haste"]);
    }
}
