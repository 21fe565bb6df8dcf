//! Shared configuration types for everlog.
//!
//! These types are serialized into the user's config file and shared
//! between the core engine and the CLI front-end.

pub mod formatting;

use serde::{Deserialize, Serialize};

/// Which bucket a timer is rendered into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerKind {
    /// A buff you cast on yourself.
    SelfBuff,
    /// A buff someone else cast on you.
    ReceivedBuff,
    /// A beneficial spell you cast on someone else (grouped per spell).
    CastOnOther,
    /// A detrimental spell you landed on a target.
    Debuff,
}

/// Tunables for the cast correlator and timer display.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimerSettings {
    /// How long a pending cast may wait for its landing message (seconds).
    pub cast_window_secs: u32,
    /// Fraction of total duration below which a timer is flagged as expiring.
    pub warn_fraction: f32,
    /// Duration assigned to unresolvable "unknown spell" effects (seconds).
    pub fallback_duration_secs: u32,
    /// How far back the history preload scans (hours).
    pub history_hours: f32,
}

impl Default for TimerSettings {
    fn default() -> Self {
        Self {
            cast_window_secs: 10,
            warn_fraction: 0.2,
            fallback_duration_secs: 90,
            history_hours: 3.0,
        }
    }
}

/// Tunables for the damage meter.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MeterSettings {
    /// Sliding window the rate is computed over (seconds).
    pub window_secs: u32,
    /// Meter hides after this many seconds without a damage sample.
    pub idle_secs: u32,
}

impl Default for MeterSettings {
    fn default() -> Self {
        Self {
            window_secs: 30,
            idle_secs: 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timer_settings_defaults_fill_missing_fields() {
        let settings: TimerSettings = toml::from_str("cast_window_secs = 6").unwrap();
        assert_eq!(settings.cast_window_secs, 6);
        assert_eq!(settings.fallback_duration_secs, 90);
        assert!((settings.warn_fraction - 0.2).abs() < f32::EPSILON);
    }

    #[test]
    fn timer_kind_round_trips_as_snake_case() {
        let kind: TimerKind = serde_json_like_roundtrip();
        assert_eq!(kind, TimerKind::CastOnOther);
    }

    fn serde_json_like_roundtrip() -> TimerKind {
        // toml can't encode a bare enum, so wrap it
        #[derive(serde::Deserialize)]
        struct Wrap {
            kind: TimerKind,
        }
        let w: Wrap = toml::from_str(r#"kind = "cast_on_other""#).unwrap();
        w.kind
    }
}
