//! Spell duration formulas.
//!
//! Durations come from the reference file as a (formula, base) pair; the
//! base is a tick count and one tick is six seconds. Formulas scale with
//! caster level and are clamped to the base where the base is a cap.

const SECONDS_PER_TICK: u32 = 6;
const PERMANENT_TICKS: u32 = 72_000;

/// Calculate a spell's duration in seconds for a given caster level.
pub fn duration_secs(formula: i32, base: i32, level: u8) -> u32 {
    ticks(formula, base, level) * SECONDS_PER_TICK
}

fn capped(ticks: u32, base: i32) -> u32 {
    if base > 0 {
        ticks.min(base as u32)
    } else {
        ticks
    }
}

fn ticks(formula: i32, base: i32, level: u8) -> u32 {
    let level = level as u32;
    let base_u = base.max(0) as u32;
    match formula {
        0 => 0,
        // ceil(level / 2)
        1 | 6 => capped(level.div_ceil(2), base),
        // ceil(level * 3 / 5)
        2 => capped((level * 3).div_ceil(5), base),
        3 => capped(level * 30, base),
        4 => {
            if base > 0 {
                base_u
            } else {
                50
            }
        }
        5 => {
            if base > 0 {
                base_u
            } else {
                3
            }
        }
        7 => capped(level, base),
        8 => capped(level + 10, base),
        9 => {
            if base > 60 {
                base_u
            } else {
                capped(level * 2 + 10, base)
            }
        }
        10 => {
            if base > 60 {
                base_u
            } else {
                capped(level * 3 + 10, base)
            }
        }
        11 | 12 | 15 => base_u,
        50 => PERMANENT_TICKS,
        3600 => {
            if base > 0 {
                base_u
            } else {
                3600
            }
        }
        _ => base_u,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formula_zero_has_no_duration() {
        assert_eq!(duration_secs(0, 10, 60), 0);
    }

    #[test]
    fn linear_formula_caps_at_base() {
        // Formula 1: ceil(level/2) ticks, capped at base.
        assert_eq!(duration_secs(1, 10, 9), 5 * 6);
        assert_eq!(duration_secs(1, 10, 20), 10 * 6);
        assert_eq!(duration_secs(1, 10, 60), 10 * 6);
    }

    #[test]
    fn constant_formulas_ignore_level() {
        assert_eq!(duration_secs(11, 100, 1), 600);
        assert_eq!(duration_secs(11, 100, 60), 600);
        assert_eq!(duration_secs(4, 0, 1), 50 * 6);
    }

    #[test]
    fn tiered_formula_base_override() {
        // Formula 9 with a large base is a flat duration.
        assert_eq!(duration_secs(9, 100, 5), 100 * 6);
        // With a small base it scales and caps.
        assert_eq!(duration_secs(9, 40, 5), 20 * 6);
        assert_eq!(duration_secs(9, 40, 30), 40 * 6);
    }

    #[test]
    fn permanent_formula() {
        assert_eq!(duration_secs(50, 0, 1), 72_000 * 6);
    }

    #[test]
    fn duration_is_monotone_in_level_up_to_cap() {
        for formula in [1, 2, 3, 6, 7, 8, 9, 10] {
            let mut prev = 0;
            for level in 1..=60u8 {
                let d = duration_secs(formula, 40, level);
                assert!(
                    d >= prev,
                    "formula {formula} decreased at level {level}: {d} < {prev}"
                );
                prev = d;
            }
        }
    }

    #[test]
    fn unknown_formula_falls_back_to_base() {
        assert_eq!(duration_secs(999, 20, 10), 20 * 6);
    }
}
