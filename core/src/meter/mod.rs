//! Sliding-window damage aggregation.
//!
//! Damage lines append samples; the rate is the window sum over the window
//! length. Samples outside the window are pruned on record and query, so
//! memory stays bounded by the window. The meter hides itself after a
//! short idle period instead of decaying to zero on screen.

use std::collections::VecDeque;

use chrono::{Duration, NaiveDateTime};
use hashbrown::{HashMap, HashSet};

#[derive(Debug, Clone)]
struct DamageSample {
    at: NaiveDateTime,
    attacker: String,
    amount: i64,
}

/// Per-attacker totals for the current encounter.
#[derive(Debug, Clone, PartialEq)]
pub struct AttackerTotal {
    pub attacker: String,
    pub total: i64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeterSnapshot {
    /// Damage per second over the sliding window, 0 when hidden.
    pub rate: f64,
    pub visible: bool,
    /// Encounter totals, largest first.
    pub attackers: Vec<AttackerTotal>,
    /// Everything damaged this encounter.
    pub targets: Vec<String>,
}

pub struct DamageAggregator {
    window: Duration,
    idle: Duration,
    samples: VecDeque<DamageSample>,
    last_sample_at: Option<NaiveDateTime>,
    /// Encounter-scope accumulation, reset by `end_encounter`.
    totals: HashMap<String, i64>,
    targets: HashSet<String>,
}

impl DamageAggregator {
    pub fn new(window_secs: u32, idle_secs: u32) -> Self {
        Self {
            window: Duration::seconds(i64::from(window_secs)),
            idle: Duration::seconds(i64::from(idle_secs)),
            samples: VecDeque::new(),
            last_sample_at: None,
            totals: HashMap::new(),
            targets: HashSet::new(),
        }
    }

    pub fn record(&mut self, now: NaiveDateTime, attacker: &str, target: &str, amount: i64) {
        self.prune(now);
        self.samples.push_back(DamageSample {
            at: now,
            attacker: attacker.to_string(),
            amount,
        });
        self.last_sample_at = Some(now);
        *self.totals.entry(attacker.to_string()).or_insert(0) += amount;
        self.targets.insert(target.to_string());
    }

    fn prune(&mut self, now: NaiveDateTime) {
        let cutoff = now - self.window;
        while self.samples.front().is_some_and(|s| s.at < cutoff) {
            self.samples.pop_front();
        }
    }

    /// Window sum divided by the window length in seconds.
    pub fn rate(&mut self, now: NaiveDateTime) -> f64 {
        self.prune(now);
        let sum: i64 = self.samples.iter().map(|s| s.amount).sum();
        sum as f64 / self.window.num_seconds().max(1) as f64
    }

    /// Whether any sample arrived within the idle threshold. Hidden once
    /// a full threshold has elapsed.
    pub fn visible(&self, now: NaiveDateTime) -> bool {
        self.last_sample_at.is_some_and(|at| now - at < self.idle)
    }

    /// Drop encounter state; the sliding window clears with it.
    pub fn end_encounter(&mut self) {
        self.samples.clear();
        self.last_sample_at = None;
        self.totals.clear();
        self.targets.clear();
    }

    pub fn snapshot(&mut self, now: NaiveDateTime) -> MeterSnapshot {
        let visible = self.visible(now);
        let rate = if visible { self.rate(now) } else { 0.0 };
        let mut attackers: Vec<AttackerTotal> = self
            .totals
            .iter()
            .map(|(attacker, total)| AttackerTotal {
                attacker: attacker.clone(),
                total: *total,
            })
            .collect();
        attackers.sort_by(|a, b| (b.total, &a.attacker).cmp(&(a.total, &b.attacker)));
        let mut targets: Vec<String> = self.targets.iter().cloned().collect();
        targets.sort();
        MeterSnapshot {
            rate,
            visible,
            attackers,
            targets,
        }
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

    #[test]
    fn rate_is_window_sum_over_window_length() {
        let mut meter = DamageAggregator::new(30, 10);
        meter.record(ts(0), "You", "a gnoll", 150);
        meter.record(ts(5), "You", "a gnoll", 150);
        assert_eq!(meter.rate(ts(5)), 10.0);
    }

    #[test]
    fn samples_age_out_of_the_window() {
        let mut meter = DamageAggregator::new(30, 10);
        meter.record(ts(0), "You", "a gnoll", 300);
        meter.record(ts(40), "You", "a gnoll", 30);
        // The first sample is outside the window at t=40.
        assert_eq!(meter.rate(ts(40)), 1.0);
    }

    #[test]
    fn hides_after_idle_threshold() {
        let mut meter = DamageAggregator::new(30, 10);
        meter.record(ts(0), "You", "a gnoll", 100);
        assert!(meter.visible(ts(9)));
        // Hidden at exactly the threshold, not one second later.
        assert!(!meter.visible(ts(10)));
        assert_eq!(meter.snapshot(ts(10)).rate, 0.0);
    }

    #[test]
    fn encounter_totals_accumulate_per_attacker() {
        let mut meter = DamageAggregator::new(30, 10);
        meter.record(ts(0), "You", "a gnoll", 100);
        meter.record(ts(1), "Guard Ruon", "a gnoll", 40);
        meter.record(ts(2), "You", "a gnoll pup", 60);

        let snap = meter.snapshot(ts(2));
        assert_eq!(
            snap.attackers,
            vec![
                AttackerTotal {
                    attacker: "You".to_string(),
                    total: 160
                },
                AttackerTotal {
                    attacker: "Guard Ruon".to_string(),
                    total: 40
                },
            ]
        );
        assert_eq!(
            snap.targets,
            vec!["a gnoll".to_string(), "a gnoll pup".to_string()]
        );
    }

    #[test]
    fn end_encounter_resets_everything() {
        let mut meter = DamageAggregator::new(30, 10);
        meter.record(ts(0), "You", "a gnoll", 100);
        meter.end_encounter();

        let snap = meter.snapshot(ts(1));
        assert!(!snap.visible);
        assert!(snap.attackers.is_empty());
        assert!(snap.targets.is_empty());
    }
}
