//! Line classification against the fixed pattern table.

use std::sync::Arc;

use crate::catalog::{SpellCatalog, SpellId};
use crate::rolls::RollRecord;

use super::LogEntry;

/// Melee verbs in "You <verb> <target> for N points of damage."
static YOUR_MELEE_VERBS: phf::Set<&'static str> = phf::phf_set! {
    "hit", "slash", "pierce", "crush", "bash", "kick", "punch", "strike",
    "slice", "claw", "bite", "sting", "maul", "gore", "smash", "backstab",
};

/// Third-person melee verbs in "<attacker> <verb> <target> for N points of damage."
static OTHER_MELEE_VERBS: phf::Set<&'static str> = phf::phf_set! {
    "hits", "slashes", "pierces", "crushes", "bashes", "kicks", "punches",
    "strikes", "slices", "claws", "bites", "stings", "mauls", "gores",
    "smashes", "backstabs",
};

/// Messages indicating the pending cast did not complete.
const CAST_FAILURES: &[&str] = &[
    "Your spell fizzles",
    "Your target resisted",
    "Your spell is interrupted",
    "You cannot see your target",
    "Your target is out of range",
    "You must first select a target",
];

/// Spam lines that would otherwise false-positive against catalog keys.
const BLACKLISTED: &[&str] = &["You feel quite amicable."];

/// One classified log line. Exactly one variant per line, first match wins.
#[derive(Debug, Clone, PartialEq)]
pub enum GameEvent {
    /// "You begin casting <spell>."
    CastBegin { spell: String },
    /// "Your <item> begins to glow." (clicked item)
    ItemUsed { item: String },
    /// Fizzle, resist, interrupt, or similar failure.
    CastFailed,
    /// Message matched one or more spells' cast-on-you text.
    LandedOnSelf {
        message: String,
        candidates: Vec<SpellId>,
    },
    /// Message matched one or more spells' cast-on-other suffix.
    LandedOnOther {
        target: String,
        suffix: String,
        candidates: Vec<SpellId>,
    },
    /// Message matched one or more spells' fade text.
    Faded { candidates: Vec<SpellId> },
    /// "Your <spell> spell has worn off."
    WornOff { spell: String },
    /// A damage line; attacker is "You" for your melee and non-melee hits.
    Damage {
        attacker: String,
        target: String,
        amount: i64,
    },
    /// "You have slain <target>!"
    SlainByYou { target: String },
    /// Something was slain by someone else.
    SlainByOther,
    /// You died.
    Died,
    /// Entered a new zone.
    ZoneChange,
    /// Completed two-line dice roll.
    Roll(RollRecord),
    Unrecognized,
}

/// Classifies log entries against the fixed pattern table plus the spell
/// catalog's landed/faded text keys.
///
/// Classification is stateless except for the dice-roll protocol: the result
/// line is only valid when the immediately preceding entry was the announce
/// line, so the classifier carries the pending roller across that boundary.
pub struct Classifier {
    catalog: Arc<SpellCatalog>,
    pending_roller: Option<String>,
}

impl Classifier {
    pub fn new(catalog: Arc<SpellCatalog>) -> Self {
        Self {
            catalog,
            pending_roller: None,
        }
    }

    /// Classify one entry. Returns exactly one event, `Unrecognized` when no
    /// pattern applies.
    pub fn classify(&mut self, entry: &LogEntry) -> GameEvent {
        let msg = entry.message.as_str();

        // Dice rolls: the announce arms the classifier for exactly one line.
        let roller = self.pending_roller.take();
        if let Some(name) = parse_roll_announce(msg) {
            self.pending_roller = Some(name);
            return GameEvent::Unrecognized;
        }
        if let Some((low, high, value)) = parse_roll_result(msg) {
            if let Some(player) = roller {
                return GameEvent::Roll(RollRecord {
                    player,
                    low,
                    high,
                    value,
                    timestamp: entry.timestamp,
                });
            }
            return GameEvent::Unrecognized;
        }

        if BLACKLISTED.contains(&msg) {
            return GameEvent::Unrecognized;
        }

        if msg.contains("You have been slain") {
            return GameEvent::Died;
        }

        if CAST_FAILURES.iter().any(|m| msg.contains(m)) {
            return GameEvent::CastFailed;
        }

        if let Some(spell) = msg
            .strip_prefix("You begin casting ")
            .and_then(|s| s.strip_suffix('.'))
        {
            return GameEvent::CastBegin {
                spell: spell.to_string(),
            };
        }

        if let Some(item) = msg
            .strip_prefix("Your ")
            .and_then(|s| s.strip_suffix(" begins to glow."))
        {
            return GameEvent::ItemUsed {
                item: item.to_string(),
            };
        }

        let faded = self.catalog.find_by_fades(msg);
        if !faded.is_empty() {
            return GameEvent::Faded {
                candidates: faded.to_vec(),
            };
        }

        if let Some(spell) = msg
            .strip_prefix("Your ")
            .and_then(|s| s.strip_suffix(" spell has worn off."))
        {
            return GameEvent::WornOff {
                spell: spell.to_string(),
            };
        }

        let on_you = self.catalog.find_by_cast_on_you(msg);
        if !on_you.is_empty() {
            return GameEvent::LandedOnSelf {
                message: msg.to_string(),
                candidates: on_you.to_vec(),
            };
        }

        if let Some((target, suffix, candidates)) = self.catalog.match_cast_on_other(msg) {
            return GameEvent::LandedOnOther {
                target,
                suffix,
                candidates,
            };
        }

        if let Some(event) = classify_damage(msg) {
            return event;
        }

        if let Some(target) = msg
            .strip_prefix("You have slain ")
            .and_then(|s| s.strip_suffix('!'))
        {
            return GameEvent::SlainByYou {
                target: target.to_string(),
            };
        }
        if msg.contains(" has been slain by") {
            return GameEvent::SlainByOther;
        }

        if msg.starts_with("You have entered") {
            return GameEvent::ZoneChange;
        }

        GameEvent::Unrecognized
    }
}

fn parse_roll_announce(msg: &str) -> Option<String> {
    msg.strip_prefix("**A Magic Die is rolled by ")
        .and_then(|s| s.strip_suffix('.'))
        .map(|name| name.to_string())
}

fn parse_roll_result(msg: &str) -> Option<(i64, i64, i64)> {
    let rest = msg.strip_prefix("**It could have been any number from ")?;
    let (low, rest) = rest.split_once(" to ")?;
    let (high, rest) = rest.split_once(", but this time it turned up a ")?;
    let value = rest.strip_suffix('.')?;
    Some((low.parse().ok()?, high.parse().ok()?, value.parse().ok()?))
}

/// Split `"<target> for <N>"` off a damage line after the trailing
/// `" point(s) of damage."` suffix has been removed.
fn split_damage_tail(tail: &str) -> Option<(&str, i64)> {
    let (target, amount) = tail.rsplit_once(" for ")?;
    if target.is_empty() {
        return None;
    }
    Some((target, amount.parse().ok()?))
}

fn strip_damage_suffix(msg: &str) -> Option<&str> {
    msg.strip_suffix(" points of damage.")
        .or_else(|| msg.strip_suffix(" point of damage."))
}

fn classify_damage(msg: &str) -> Option<GameEvent> {
    let head = strip_damage_suffix(msg)?;

    // "You slash a gnoll for 12 points of damage."
    if let Some(rest) = head.strip_prefix("You ") {
        let (verb, tail) = rest.split_once(' ')?;
        if YOUR_MELEE_VERBS.contains(verb) {
            let (target, amount) = split_damage_tail(tail)?;
            return Some(GameEvent::Damage {
                attacker: "You".to_string(),
                target: target.to_string(),
                amount,
            });
        }
    }

    // "a gnoll was hit by non-melee for 30 points of damage." (your spells/procs)
    if let Some((target, amount)) = split_damage_tail(head)
        && let Some(target) = target.strip_suffix(" was hit by non-melee")
    {
        return Some(GameEvent::Damage {
            attacker: "You".to_string(),
            target: target.to_string(),
            amount,
        });
    }

    // "Guard Ruon crushes a gnoll for 18 points of damage."
    let (before_amount, amount) = head.rsplit_once(" for ")?;
    let amount: i64 = amount.parse().ok()?;
    let (attacker, target) = split_on_melee_verb(before_amount)?;
    Some(GameEvent::Damage {
        attacker: attacker.to_string(),
        target: target.to_string(),
        amount,
    })
}

/// Find the first third-person melee verb token and split attacker/target
/// around it. Both sides may contain spaces (multi-word NPC names).
fn split_on_melee_verb(s: &str) -> Option<(&str, &str)> {
    let bytes = s.as_bytes();
    let mut word_start = 0;
    for i in 0..=s.len() {
        if i == s.len() || bytes[i] == b' ' {
            let word = &s[word_start..i];
            if OTHER_MELEE_VERBS.contains(word) && word_start > 0 && i < s.len() {
                return Some((&s[..word_start - 1], &s[i + 1..]));
            }
            word_start = i + 1;
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::SpellCatalog;
    use crate::parser::parse_line;

    fn classifier() -> Classifier {
        Classifier::new(Arc::new(SpellCatalog::empty()))
    }

    fn entry(msg: &str) -> LogEntry {
        parse_line(&format!("[Thu Oct 09 21:10:12 2025] {msg}")).unwrap()
    }

    #[test]
    fn classifies_cast_begin() {
        let mut c = classifier();
        assert_eq!(
            c.classify(&entry("You begin casting Clarity.")),
            GameEvent::CastBegin {
                spell: "Clarity".to_string()
            }
        );
    }

    #[test]
    fn classifies_item_glow() {
        let mut c = classifier();
        assert_eq!(
            c.classify(&entry("Your Pegasus Feather Cloak begins to glow.")),
            GameEvent::ItemUsed {
                item: "Pegasus Feather Cloak".to_string()
            }
        );
    }

    #[test]
    fn classifies_your_melee_damage() {
        let mut c = classifier();
        assert_eq!(
            c.classify(&entry("You slash a gnoll pup for 12 points of damage.")),
            GameEvent::Damage {
                attacker: "You".to_string(),
                target: "a gnoll pup".to_string(),
                amount: 12,
            }
        );
    }

    #[test]
    fn classifies_single_point_of_damage() {
        let mut c = classifier();
        assert_eq!(
            c.classify(&entry("You hit a rat for 1 point of damage.")),
            GameEvent::Damage {
                attacker: "You".to_string(),
                target: "a rat".to_string(),
                amount: 1,
            }
        );
    }

    #[test]
    fn classifies_non_melee_damage_as_yours() {
        let mut c = classifier();
        assert_eq!(
            c.classify(&entry("a gnoll was hit by non-melee for 44 points of damage.")),
            GameEvent::Damage {
                attacker: "You".to_string(),
                target: "a gnoll".to_string(),
                amount: 44,
            }
        );
    }

    #[test]
    fn classifies_other_damage_with_multiword_names() {
        let mut c = classifier();
        assert_eq!(
            c.classify(&entry(
                "Guard Ruon crushes a gnoll pup for 18 points of damage."
            )),
            GameEvent::Damage {
                attacker: "Guard Ruon".to_string(),
                target: "a gnoll pup".to_string(),
                amount: 18,
            }
        );
    }

    #[test]
    fn roll_result_requires_preceding_announce() {
        let mut c = classifier();
        let result = "**It could have been any number from 1 to 100, but this time it turned up a 37.";

        // Result with no announce is ignored.
        assert_eq!(c.classify(&entry(result)), GameEvent::Unrecognized);

        // Announce immediately followed by result yields a roll.
        c.classify(&entry("**A Magic Die is rolled by Tarvik."));
        match c.classify(&entry(result)) {
            GameEvent::Roll(r) => {
                assert_eq!(r.player, "Tarvik");
                assert_eq!((r.low, r.high, r.value), (1, 100, 37));
            }
            other => panic!("expected roll, got {other:?}"),
        }

        // An intervening line breaks the sequence.
        c.classify(&entry("**A Magic Die is rolled by Tarvik."));
        c.classify(&entry("You say, 'hello'"));
        assert_eq!(c.classify(&entry(result)), GameEvent::Unrecognized);
    }

    #[test]
    fn classifies_cast_failures() {
        let mut c = classifier();
        assert_eq!(
            c.classify(&entry("Your spell fizzles!")),
            GameEvent::CastFailed
        );
        assert_eq!(
            c.classify(&entry("Your target resisted the Clarity spell.")),
            GameEvent::CastFailed
        );
    }

    #[test]
    fn classifies_death_and_kills() {
        let mut c = classifier();
        assert_eq!(
            c.classify(&entry("You have been slain by a gnoll!")),
            GameEvent::Died
        );
        assert_eq!(
            c.classify(&entry("You have slain a gnoll pup!")),
            GameEvent::SlainByYou {
                target: "a gnoll pup".to_string()
            }
        );
        assert_eq!(
            c.classify(&entry("a gnoll has been slain by Guard Ruon!")),
            GameEvent::SlainByOther
        );
    }

    #[test]
    fn unknown_lines_are_unrecognized() {
        let mut c = classifier();
        assert_eq!(
            c.classify(&entry("Welcome to EverQuest!")),
            GameEvent::Unrecognized
        );
    }
}
