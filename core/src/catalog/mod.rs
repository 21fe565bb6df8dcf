//! Spell reference catalog.
//!
//! Loads the caret-separated `spells_us.txt` reference file once at startup
//! and indexes it for the lookups the correlator needs: by name, by
//! "cast on you" message, by "cast on other" suffix, and by fade message.
//! An optional whitelist file restricts the catalog to era-valid spells.

pub mod duration;

use std::path::{Path, PathBuf};

use hashbrown::{HashMap, HashSet};
use thiserror::Error;
use tracing::{info, warn};

use crate::parser::normalize_text;

pub type SpellId = u32;

/// Expansions already live in the target era; a spell replaced within these
/// is not valid.
const ERA_EXPANSIONS: &[&str] = &["Classic", "Kunark", "Velious", "Hole", ""];

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("spell file not found: {0}")]
    NotFound(PathBuf),
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// One spell's reference data. Immutable for the process lifetime.
#[derive(Debug, Clone)]
pub struct SpellRecord {
    pub id: SpellId,
    pub name: String,
    pub cast_on_you: String,
    pub cast_on_other: String,
    pub fades: String,
    pub duration_formula: i32,
    pub duration_base: i32,
    pub cast_time_ms: u32,
    pub target_type: i32,
    pub beneficial: bool,
    pub replaced_by: u32,
    pub replacement_expansion: String,
}

impl SpellRecord {
    /// Duration in seconds for a given caster level.
    pub fn duration_secs(&self, level: u8) -> u32 {
        duration::duration_secs(self.duration_formula, self.duration_base, level)
    }

    pub fn is_self_only(&self) -> bool {
        self.target_type == 6
    }

    pub fn has_duration(&self) -> bool {
        !(self.duration_formula == 0 && self.duration_base == 0)
    }
}

/// Indexed spell reference data.
#[derive(Debug, Default)]
pub struct SpellCatalog {
    by_id: HashMap<SpellId, SpellRecord>,
    by_name: HashMap<String, SpellId>,
    by_cast_on_you: HashMap<String, Vec<SpellId>>,
    /// Cast-on-other messages are `<target><suffix>`, so these are matched
    /// by suffix rather than exact key.
    by_cast_on_other: Vec<(String, Vec<SpellId>)>,
    by_fades: HashMap<String, Vec<SpellId>>,
    /// Max observed cast time per spell name (some names have variants).
    cast_times: HashMap<String, u32>,
}

impl SpellCatalog {
    /// An empty catalog, for tests and for degraded operation when the
    /// reference file is missing.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Load and index the reference file, filtered by the whitelist.
    ///
    /// A missing whitelist disables filtering with a warning; a missing
    /// spell file is a configuration error.
    pub fn load(spells_file: &Path, whitelist_file: Option<&Path>) -> Result<Self, CatalogError> {
        let whitelist = match whitelist_file {
            Some(path) if path.exists() => Some(read_whitelist(path)?),
            Some(path) => {
                warn!(path = %path.display(), "whitelist not found, catalog unfiltered");
                None
            }
            None => None,
        };

        if !spells_file.exists() {
            return Err(CatalogError::NotFound(spells_file.to_path_buf()));
        }
        let bytes = std::fs::read(spells_file).map_err(|e| CatalogError::Io {
            path: spells_file.to_path_buf(),
            source: e,
        })?;
        // The reference file is latin-1.
        let (text, _, _) = encoding_rs::WINDOWS_1252.decode(&bytes);

        let mut catalog = Self::default();
        let mut all: Vec<SpellRecord> = Vec::new();

        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let fields: Vec<&str> = line.split('^').collect();

            // Cast times come from a superset of lines (shorter records
            // still carry them); keep the max per name.
            if fields.len() >= 14
                && let Ok(cast_time) = fields[13].parse::<u32>()
            {
                let name = fields[1];
                if !name.contains("GM") {
                    let entry = catalog.cast_times.entry(normalize_text(name)).or_insert(0);
                    *entry = (*entry).max(cast_time);
                }
            }

            if fields.len() < 85 {
                continue;
            }
            if let Some(record) = parse_record(&fields, line) {
                all.push(record);
            }
        }

        for record in all {
            if !catalog.is_era_valid(&record, whitelist.as_ref()) {
                continue;
            }
            catalog.index(record);
        }

        info!(
            spells = catalog.by_name.len(),
            cast_times = catalog.cast_times.len(),
            "spell catalog loaded"
        );
        Ok(catalog)
    }

    fn is_era_valid(&self, spell: &SpellRecord, whitelist: Option<&HashSet<String>>) -> bool {
        if let Some(list) = whitelist
            && !list.contains(&spell.name)
        {
            return false;
        }
        if spell.replaced_by == 0 {
            return true;
        }
        !ERA_EXPANSIONS.contains(&spell.replacement_expansion.as_str())
    }

    fn index(&mut self, record: SpellRecord) {
        let id = record.id;
        self.by_name.insert(record.name.clone(), id);
        if !record.cast_on_you.is_empty() {
            self.by_cast_on_you
                .entry(record.cast_on_you.clone())
                .or_default()
                .push(id);
        }
        if !record.cast_on_other.is_empty() {
            match self
                .by_cast_on_other
                .iter_mut()
                .find(|(suffix, _)| *suffix == record.cast_on_other)
            {
                Some((_, ids)) => ids.push(id),
                None => self
                    .by_cast_on_other
                    .push((record.cast_on_other.clone(), vec![id])),
            }
        }
        if !record.fades.is_empty() {
            self.by_fades
                .entry(record.fades.clone())
                .or_default()
                .push(id);
        }
        self.by_id.insert(id, record);
    }

    pub fn get(&self, id: SpellId) -> Option<&SpellRecord> {
        self.by_id.get(&id)
    }

    pub fn get_by_name(&self, name: &str) -> Option<&SpellRecord> {
        self.by_name.get(name).and_then(|id| self.by_id.get(id))
    }

    /// Max cast time in milliseconds for a spell name, 0 if unknown.
    pub fn cast_time_ms(&self, spell_name: &str) -> u32 {
        self.cast_times.get(spell_name).copied().unwrap_or(0)
    }

    /// Spells whose "cast on you" message matches exactly.
    pub fn find_by_cast_on_you(&self, message: &str) -> &[SpellId] {
        self.by_cast_on_you
            .get(message)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Spells whose fade message matches exactly.
    pub fn find_by_fades(&self, message: &str) -> &[SpellId] {
        self.by_fades.get(message).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Match a "cast on other" message: `<target><suffix>`.
    ///
    /// Candidates are collected from every matching suffix; the target is
    /// taken from the longest (most specific) one.
    pub fn match_cast_on_other(&self, message: &str) -> Option<(String, String, Vec<SpellId>)> {
        let mut best_suffix: Option<&str> = None;
        let mut candidates: Vec<SpellId> = Vec::new();

        for (suffix, ids) in &self.by_cast_on_other {
            if !message.ends_with(suffix.as_str()) {
                continue;
            }
            let target = &message[..message.len() - suffix.len()];
            if target.is_empty() || target.starts_with(' ') {
                continue;
            }
            candidates.extend_from_slice(ids);
            if best_suffix.is_none_or(|s| suffix.len() > s.len()) {
                best_suffix = Some(suffix);
            }
        }

        let suffix = best_suffix?;
        let target = message[..message.len() - suffix.len()].to_string();
        Some((target, suffix.to_string(), candidates))
    }

    /// Choose the best candidate: the preferred name if present, else the
    /// first candidate with a nonzero duration, else the first candidate.
    pub fn best_match(&self, candidates: &[SpellId], prefer: Option<&str>) -> Option<&SpellRecord> {
        let records: Vec<&SpellRecord> =
            candidates.iter().filter_map(|id| self.get(*id)).collect();
        if let Some(name) = prefer
            && let Some(record) = records.iter().find(|r| r.name == name)
        {
            return Some(record);
        }
        records
            .iter()
            .find(|r| r.has_duration())
            .or(records.first())
            .copied()
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

fn read_whitelist(path: &Path) -> Result<HashSet<String>, CatalogError> {
    let bytes = std::fs::read(path).map_err(|e| CatalogError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    let (text, _, _) = encoding_rs::WINDOWS_1252.decode(&bytes);
    let list: HashSet<String> = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(normalize_text)
        .collect();
    info!(spells = list.len(), "whitelist loaded");
    Ok(list)
}

/// Parse the trailing `!Expansion:<name>` field and replacement spell id.
fn parse_expansion_info(line: &str) -> (String, u32) {
    let fields: Vec<&str> = line.split('^').collect();
    if fields.len() < 2 {
        return (String::new(), 0);
    }
    let replacement_id = fields[fields.len() - 1].parse().unwrap_or(0);
    let expansion = fields[fields.len() - 2]
        .strip_prefix("!Expansion:")
        .unwrap_or("")
        .to_string();
    (expansion, replacement_id)
}

fn parse_record(fields: &[&str], line: &str) -> Option<SpellRecord> {
    let id: SpellId = fields[0].parse().ok()?;
    let name = fields[1];
    if name.contains("GM") {
        return None;
    }
    let (replacement_expansion, replaced_by) = parse_expansion_info(line);
    Some(SpellRecord {
        id,
        name: normalize_text(name),
        cast_on_you: normalize_text(fields[6]),
        cast_on_other: normalize_text(fields[7]),
        fades: normalize_text(fields[8]),
        duration_formula: fields[16].parse().ok()?,
        duration_base: fields[17].parse().ok()?,
        cast_time_ms: fields[13].parse().ok()?,
        target_type: fields[40].parse().ok()?,
        beneficial: fields[83] == "1",
        replaced_by,
        replacement_expansion,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    /// Build a minimal spells_us.txt line with the fields the loader reads.
    fn spell_line(
        id: u32,
        name: &str,
        cast_on_you: &str,
        cast_on_other: &str,
        fades: &str,
        formula: i32,
        base: i32,
        beneficial: bool,
    ) -> String {
        let mut fields = vec![String::new(); 85];
        fields[0] = id.to_string();
        fields[1] = name.to_string();
        fields[6] = cast_on_you.to_string();
        fields[7] = cast_on_other.to_string();
        fields[8] = fades.to_string();
        fields[13] = "3000".to_string();
        fields[16] = formula.to_string();
        fields[17] = base.to_string();
        fields[40] = "5".to_string();
        fields[83] = if beneficial { "1" } else { "0" }.to_string();
        fields.join("^")
    }

    fn write_catalog(lines: &[String]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        for line in lines {
            writeln!(file, "{line}").unwrap();
        }
        file
    }

    #[test]
    fn loads_and_indexes_spells() {
        let file = write_catalog(&[
            spell_line(
                1693,
                "Clarity",
                "You feel your mind expand.",
                " looks tranquil.",
                "Your mind returns to normal.",
                11,
                210,
                true,
            ),
            spell_line(
                2941,
                "Selo's Song",
                "Your feet move faster.",
                "'s feet move faster.",
                "Your feet slow down.",
                1,
                6,
                true,
            ),
        ]);
        let catalog = SpellCatalog::load(file.path(), None).unwrap();
        assert_eq!(catalog.len(), 2);
        assert_eq!(
            catalog.find_by_cast_on_you("You feel your mind expand."),
            &[1693]
        );
        assert_eq!(catalog.get_by_name("Clarity").unwrap().id, 1693);
        assert_eq!(catalog.cast_time_ms("Clarity"), 3000);
    }

    #[test]
    fn cast_on_other_suffix_extracts_target() {
        let file = write_catalog(&[spell_line(
            1693,
            "Clarity",
            "You feel your mind expand.",
            " looks tranquil.",
            "Your mind returns to normal.",
            11,
            210,
            true,
        )]);
        let catalog = SpellCatalog::load(file.path(), None).unwrap();
        let (target, suffix, candidates) =
            catalog.match_cast_on_other("Tarvik looks tranquil.").unwrap();
        assert_eq!(target, "Tarvik");
        assert_eq!(suffix, " looks tranquil.");
        assert_eq!(candidates, vec![1693]);

        // No target before the suffix: no match.
        assert!(catalog.match_cast_on_other(" looks tranquil.").is_none());
    }

    #[test]
    fn whitelist_filters_catalog() {
        let spells = write_catalog(&[
            spell_line(1, "Clarity", "a.", "", "", 11, 10, true),
            spell_line(2, "Haste", "b.", "", "", 11, 10, true),
        ]);
        let mut whitelist = tempfile::NamedTempFile::new().unwrap();
        writeln!(whitelist, "Clarity").unwrap();

        let catalog = SpellCatalog::load(spells.path(), Some(whitelist.path())).unwrap();
        assert_eq!(catalog.len(), 1);
        assert!(catalog.get_by_name("Clarity").is_some());
        assert!(catalog.get_by_name("Haste").is_none());
    }

    #[test]
    fn missing_whitelist_disables_filtering() {
        let spells = write_catalog(&[spell_line(1, "Clarity", "a.", "", "", 11, 10, true)]);
        let catalog = SpellCatalog::load(
            spells.path(),
            Some(Path::new("/nonexistent/whitelist.txt")),
        )
        .unwrap();
        assert_eq!(catalog.len(), 1);
    }

    #[test]
    fn missing_spell_file_is_an_error() {
        let err = SpellCatalog::load(Path::new("/nonexistent/spells_us.txt"), None).unwrap_err();
        assert!(matches!(err, CatalogError::NotFound(_)));
    }

    #[test]
    fn best_match_prefers_named_then_duration() {
        let file = write_catalog(&[
            spell_line(1, "Proc Effect", "You feel it.", "", "", 0, 0, true),
            spell_line(2, "Real Buff", "You feel it.", "", "", 11, 10, true),
        ]);
        let catalog = SpellCatalog::load(file.path(), None).unwrap();
        let candidates = catalog.find_by_cast_on_you("You feel it.").to_vec();

        // Prefer by name when asked.
        let chosen = catalog.best_match(&candidates, Some("Proc Effect")).unwrap();
        assert_eq!(chosen.id, 1);

        // Otherwise prefer the one with a duration.
        let chosen = catalog.best_match(&candidates, None).unwrap();
        assert_eq!(chosen.id, 2);
    }

    #[test]
    fn spell_names_normalize_apostrophes() {
        let line = spell_line(
            3,
            "Selo\u{2019}s Song",
            "Your feet move faster.",
            "",
            "",
            1,
            6,
            true,
        );
        // The reference file is windows-1252 on disk, so the typographic
        // apostrophe is the single byte 0x92.
        let (bytes, _, _) = encoding_rs::WINDOWS_1252.encode(&line);
        assert!(bytes.contains(&0x92));
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&bytes).unwrap();
        file.write_all(b"\n").unwrap();

        let catalog = SpellCatalog::load(file.path(), None).unwrap();
        assert!(catalog.get_by_name("Selo's Song").is_some());
    }
}
