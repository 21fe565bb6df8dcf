//! Dice roll tracking and winner selection.
//!
//! `/random` rolls arrive as a two-line protocol; the classifier stitches
//! them into a [`RollRecord`]. The tracker keeps the session's rolls,
//! flags collisions, and can draw a random winner among valid rolls in a
//! range.

use chrono::NaiveDateTime;
use rand::Rng;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum RollError {
    #[error("no rolls recorded for range {low}-{high}")]
    EmptyPool { low: i64, high: i64 },
}

/// One completed dice roll.
#[derive(Debug, Clone, PartialEq)]
pub struct RollRecord {
    pub player: String,
    pub low: i64,
    pub high: i64,
    pub value: i64,
    pub timestamp: NaiveDateTime,
}

impl RollRecord {
    fn same_range(&self, low: i64, high: i64) -> bool {
        self.low == low && self.high == high
    }

    fn in_declared_range(&self) -> bool {
        (self.low..=self.high).contains(&self.value)
    }
}

/// A roll annotated with whether another roll in the same range turned up
/// the same value.
#[derive(Debug, Clone)]
pub struct TrackedRoll {
    pub roll: RollRecord,
    pub duplicate: bool,
}

/// Collects rolls for the session.
#[derive(Debug, Default)]
pub struct RollTracker {
    rolls: Vec<RollRecord>,
}

impl RollTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, roll: RollRecord) {
        if self.is_duplicate(&roll) {
            info!(
                player = %roll.player,
                low = roll.low,
                high = roll.high,
                value = roll.value,
                "colliding roll"
            );
        }
        self.rolls.push(roll);
    }

    /// A roll is a duplicate when any other roll declared the same range
    /// and turned up the same value, whoever rolled it.
    pub fn is_duplicate(&self, roll: &RollRecord) -> bool {
        self.rolls
            .iter()
            .filter(|r| !std::ptr::eq(*r, roll))
            .any(|r| r.same_range(roll.low, roll.high) && r.value == roll.value)
    }

    /// All rolls in arrival order, with duplicate flags. A collision flags
    /// every colliding record, the earlier ones included.
    pub fn rolls(&self) -> Vec<TrackedRoll> {
        self.rolls
            .iter()
            .map(|roll| TrackedRoll {
                roll: roll.clone(),
                duplicate: self.is_duplicate(roll),
            })
            .collect()
    }

    /// Valid rolls for a declared range: range matches, the value actually
    /// falls within it, and no collision.
    pub fn pool(&self, low: i64, high: i64) -> Vec<&RollRecord> {
        self.rolls
            .iter()
            .filter(|r| r.same_range(low, high) && r.in_declared_range())
            .filter(|r| !self.is_duplicate(r))
            .collect()
    }

    /// Draw a uniformly random winner among valid rolls in the range.
    ///
    /// This is a raffle over who rolled, not a comparison of roll values.
    pub fn pick_winner(&self, low: i64, high: i64) -> Result<&RollRecord, RollError> {
        let pool = self.pool(low, high);
        if pool.is_empty() {
            return Err(RollError::EmptyPool { low, high });
        }
        let idx = rand::rng().random_range(0..pool.len());
        Ok(pool[idx])
    }

    pub fn clear(&mut self) {
        self.rolls.clear();
    }
}
