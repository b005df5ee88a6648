//! Word and alias registry: frequency counts, alias groups, and per-word flags.
//!
//! Every mutation keeps the word → alias and alias → words directions consistent: a word
//! listed in an [`AliasInfo`] carries that alias id in its [`WordRow`], and vice versa.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use log::{debug, warn};
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TriploError};
use crate::record::Record;
use crate::serialization::aliases::{parse_alias_snapshot, AliasEntry, AliasSnapshot};
use crate::token::{AliasId, AliasToken, ResolvedId, WordId};

/// One distinct lowercase word seen across all records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WordRow {
    /// Stable id assigned in first-seen order, starting at zero.
    pub id: WordId,
    /// Lowercase word.
    pub word: String,
    /// Occurrences across all records.
    pub count: usize,
    /// Disabled words are dropped by enrichment.
    pub enabled: bool,
    /// Primary words make a subset eligible for the training catalog.
    pub is_primary: bool,
    /// Alias group the word belongs to.
    pub alias_id: Option<AliasId>,
}

/// One alias group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AliasInfo {
    /// Alias identifier.
    pub alias_id: AliasId,
    /// Member words; never empty while the alias exists.
    pub words: BTreeSet<String>,
    /// Summed occurrences of enabled member words.
    pub count: usize,
    /// Disabled aliases leave their members as plain words.
    pub enabled: bool,
    /// Whether the alias is flagged as primary.
    pub is_primary: bool,
}

impl From<&AliasInfo> for AliasToken {
    fn from(info: &AliasInfo) -> Self {
        Self {
            alias_id: info.alias_id.clone(),
            words: info.words.clone(),
            count: info.count,
            enabled: info.enabled,
            is_primary: info.is_primary,
        }
    }
}

/// Non-fatal inconsistency found while importing an alias snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryWarning {
    /// The alias lists a word absent from the current dictionary; the reference was dropped.
    UnknownWord {
        /// Alias that listed the word.
        alias_id: AliasId,
        /// Missing word.
        word: String,
    },
    /// A word listed by more than one alias keeps its first alias.
    DuplicateMember {
        /// Contested word.
        word: String,
        /// Alias the word stays in.
        kept: AliasId,
        /// Alias the word was dropped from.
        dropped: AliasId,
    },
    /// Every member of the alias was dropped, so the alias was too.
    EmptyAlias {
        /// Dropped alias.
        alias_id: AliasId,
    },
}

impl fmt::Display for RegistryWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownWord { alias_id, word } => {
                write!(f, "alias {alias_id} references unknown word {word:?}")
            }
            Self::DuplicateMember {
                word,
                kept,
                dropped,
            } => write!(f, "word {word:?} already belongs to {kept}; dropped from {dropped}"),
            Self::EmptyAlias { alias_id } => {
                write!(f, "alias {alias_id} has no known member words and was dropped")
            }
        }
    }
}

/// Outcome of [`WordRegistry::import_alias_snapshot`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportReport {
    /// Aliases installed.
    pub aliases: usize,
    /// Words attached to an alias.
    pub words: usize,
    /// Stale or conflicting references that were dropped.
    pub warnings: Vec<RegistryWarning>,
}

/// Dictionary of words and alias groups for one session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WordRegistry {
    rows: Vec<WordRow>,
    by_word: FxHashMap<String, WordId>,
    aliases: BTreeMap<AliasId, AliasInfo>,
    next_alias: usize,
}

impl WordRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds every word row from the records' words in record order.
    ///
    /// Ids follow first-seen order. All alias associations are dropped; re-apply them with
    /// [`WordRegistry::apply_alias_snapshot`] when they should survive.
    pub fn recompute_word_counts(&mut self, records: &[Record]) -> Result<()> {
        self.rows.clear();
        self.by_word.clear();
        self.aliases.clear();

        for record in records {
            for word in record.words() {
                if let Some(&id) = self.by_word.get(word) {
                    self.rows[id as usize].count += 1;
                    continue;
                }
                let id = WordId::try_from(self.rows.len())
                    .map_err(|_| TriploError::Internal("dictionary exceeds u32::MAX words".into()))?;
                self.by_word.insert(word.clone(), id);
                self.rows.push(WordRow {
                    id,
                    word: word.clone(),
                    count: 1,
                    enabled: true,
                    is_primary: false,
                    alias_id: None,
                });
            }
        }
        debug!("dictionary rebuilt with {} distinct words", self.rows.len());
        Ok(())
    }

    /// All word rows ordered by id.
    #[must_use]
    pub fn rows(&self) -> &[WordRow] {
        &self.rows
    }

    /// Word rows in display order: most frequent first, ties by id.
    #[must_use]
    pub fn rows_by_count(&self) -> Vec<&WordRow> {
        let mut rows: Vec<&WordRow> = self.rows.iter().collect();
        rows.sort_by(|a, b| b.count.cmp(&a.count).then(a.id.cmp(&b.id)));
        rows
    }

    /// Row with the given id.
    #[must_use]
    pub fn row(&self, id: WordId) -> Option<&WordRow> {
        self.rows.get(id as usize)
    }

    /// Row of the given lowercase word.
    #[must_use]
    pub fn row_by_word(&self, word: &str) -> Option<&WordRow> {
        self.by_word.get(word).and_then(|&id| self.row(id))
    }

    /// Id of the given lowercase word.
    #[must_use]
    pub fn word_id(&self, word: &str) -> Option<WordId> {
        self.by_word.get(word).copied()
    }

    /// Number of distinct words.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns `true` when no word has been counted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Alias groups ordered by id.
    pub fn aliases(&self) -> impl Iterator<Item = &AliasInfo> {
        self.aliases.values()
    }

    /// Alias group with the given id.
    #[must_use]
    pub fn alias(&self, id: &AliasId) -> Option<&AliasInfo> {
        self.aliases.get(id)
    }

    /// Alias group of the given word, if any.
    #[must_use]
    pub fn alias_of(&self, word: &str) -> Option<&AliasInfo> {
        let alias_id = self.row_by_word(word)?.alias_id.as_ref()?;
        self.aliases.get(alias_id)
    }

    /// Resolves a word: its enabled alias, else its own id, else `None` when unknown.
    #[must_use]
    pub fn resolve(&self, word: &str) -> Option<ResolvedId> {
        let row = self.row_by_word(word)?;
        match row.alias_id.as_ref().and_then(|id| self.aliases.get(id)) {
            Some(alias) if alias.enabled => Some(ResolvedId::Alias(alias.alias_id.clone())),
            _ => Some(ResolvedId::Word(row.id)),
        }
    }

    /// Groups the selected words into a new alias labelled `label`.
    ///
    /// Words that already belong to an alias, unknown ids, and repeats are skipped. The new
    /// alias takes its flags from the first selected known row, even when that row is skipped
    /// as already aliased, and counts only enabled members. Returns `None` without touching
    /// any state when no word is eligible.
    pub fn merge_into_alias(&mut self, word_ids: &[WordId], label: &str) -> Option<AliasId> {
        let mut seen = FxHashSet::default();
        let eligible: Vec<WordId> = word_ids
            .iter()
            .copied()
            .filter(|&id| seen.insert(id))
            .filter(|&id| self.row(id).is_some_and(|row| row.alias_id.is_none()))
            .collect();
        if eligible.is_empty() {
            return None;
        }
        let first = word_ids.iter().find_map(|&id| self.row(id))?;
        let (enabled, is_primary) = (first.enabled, first.is_primary);

        let alias_id = loop {
            let candidate = AliasId::from_label(label, self.next_alias);
            self.next_alias += 1;
            if !self.aliases.contains_key(&candidate) {
                break candidate;
            }
        };

        let mut info = AliasInfo {
            alias_id: alias_id.clone(),
            words: BTreeSet::new(),
            count: 0,
            enabled,
            is_primary,
        };
        for id in eligible {
            let row = &mut self.rows[id as usize];
            row.alias_id = Some(alias_id.clone());
            info.words.insert(row.word.clone());
            if row.enabled {
                info.count += row.count;
            }
        }
        debug!("created {alias_id} with {} words", info.words.len());
        self.aliases.insert(alias_id.clone(), info);
        Some(alias_id)
    }

    /// Detaches the selected words from their aliases; returns how many were detached.
    ///
    /// An alias that loses its last member is deleted.
    pub fn split_from_alias(&mut self, word_ids: &[WordId]) -> usize {
        let mut detached = 0usize;
        for &id in word_ids {
            let Some(row) = self.rows.get_mut(id as usize) else {
                continue;
            };
            let Some(alias_id) = row.alias_id.take() else {
                continue;
            };
            detached += 1;
            if let Entry::Occupied(mut occupied) = self.aliases.entry(alias_id) {
                let info = occupied.get_mut();
                info.words.remove(&row.word);
                if info.enabled {
                    info.count = info.count.saturating_sub(row.count);
                }
                if info.words.is_empty() {
                    debug!("removed empty {}", info.alias_id);
                    occupied.remove();
                }
            }
        }
        detached
    }

    /// Enables or disables a word; returns `false` for an unknown id.
    pub fn set_enabled(&mut self, id: WordId, enabled: bool) -> bool {
        match self.rows.get_mut(id as usize) {
            Some(row) => {
                row.enabled = enabled;
                true
            }
            None => false,
        }
    }

    /// Sets or clears a word's primary flag; returns `false` for an unknown id.
    pub fn set_primary(&mut self, id: WordId, is_primary: bool) -> bool {
        match self.rows.get_mut(id as usize) {
            Some(row) => {
                row.is_primary = is_primary;
                true
            }
            None => false,
        }
    }

    /// Enables or disables an alias group; returns `false` for an unknown alias.
    pub fn set_alias_enabled(&mut self, id: &AliasId, enabled: bool) -> bool {
        match self.aliases.get_mut(id) {
            Some(info) => {
                info.enabled = enabled;
                self.recount_alias(id);
                true
            }
            None => false,
        }
    }

    /// Sets or clears an alias group's primary flag; returns `false` for an unknown alias.
    pub fn set_alias_primary(&mut self, id: &AliasId, is_primary: bool) -> bool {
        match self.aliases.get_mut(id) {
            Some(info) => {
                info.is_primary = is_primary;
                self.recount_alias(id);
                true
            }
            None => false,
        }
    }

    /// Reapplies saved `(word, enabled, is_primary)` flags to the words that still exist, then
    /// recounts every alias. Returns how many rows were restored.
    pub fn restore_word_flags<'a, I>(&mut self, flags: I) -> usize
    where
        I: IntoIterator<Item = (&'a str, bool, bool)>,
    {
        let mut restored = 0usize;
        for (word, enabled, is_primary) in flags {
            let Some(&id) = self.by_word.get(word) else {
                continue;
            };
            let row = &mut self.rows[id as usize];
            row.enabled = enabled;
            row.is_primary = is_primary;
            restored += 1;
        }
        let ids: Vec<AliasId> = self.aliases.keys().cloned().collect();
        for id in &ids {
            self.recount_alias(id);
        }
        restored
    }

    fn recount_alias(&mut self, id: &AliasId) {
        let Some(info) = self.aliases.get_mut(id) else {
            return;
        };
        info.count = info
            .words
            .iter()
            .filter_map(|word| self.by_word.get(word))
            .filter_map(|&word_id| self.rows.get(word_id as usize))
            .filter(|row| row.enabled)
            .map(|row| row.count)
            .sum();
    }

    /// Snapshot of the alias table in the exchange format.
    #[must_use]
    pub fn export_alias_snapshot(&self) -> AliasSnapshot {
        self.aliases
            .values()
            .map(|info| {
                let entry = AliasEntry {
                    alias_id: info.alias_id.clone(),
                    words: info.words.iter().cloned().collect(),
                    count: info.count,
                    enabled: info.enabled,
                    is_primary: info.is_primary,
                };
                (info.alias_id.as_str().to_owned(), entry)
            })
            .collect()
    }

    /// Parses `json` and replaces the alias table with it.
    ///
    /// A malformed payload yields [`TriploError::ImportParse`] and leaves the registry as it
    /// was.
    pub fn import_alias_snapshot(&mut self, json: &str) -> Result<ImportReport> {
        let snapshot = parse_alias_snapshot(json)?;
        Ok(self.apply_alias_snapshot(&snapshot))
    }

    /// Replaces the alias table with `snapshot`.
    ///
    /// Every word row is reset to no alias, enabled, not primary, then member rows adopt
    /// their alias's flags. The map key is the alias id. Counts are recomputed and the alias
    /// counter moves one past the highest numeric suffix.
    pub fn apply_alias_snapshot(&mut self, snapshot: &AliasSnapshot) -> ImportReport {
        for row in &mut self.rows {
            row.alias_id = None;
            row.enabled = true;
            row.is_primary = false;
        }
        self.aliases.clear();

        let mut report = ImportReport::default();
        let mut max_suffix: Option<usize> = None;
        for (key, entry) in snapshot {
            let alias_id = AliasId::new(key.clone());
            if let Some(suffix) = alias_id.numeric_suffix() {
                max_suffix = Some(max_suffix.map_or(suffix, |max| max.max(suffix)));
            }

            let mut info = AliasInfo {
                alias_id: alias_id.clone(),
                words: BTreeSet::new(),
                count: 0,
                enabled: entry.enabled,
                is_primary: entry.is_primary,
            };
            for word in &entry.words {
                let word = word.to_lowercase();
                let Some(&id) = self.by_word.get(&word) else {
                    report.warnings.push(RegistryWarning::UnknownWord {
                        alias_id: alias_id.clone(),
                        word,
                    });
                    continue;
                };
                let row = &mut self.rows[id as usize];
                if let Some(kept) = &row.alias_id {
                    if *kept != alias_id {
                        report.warnings.push(RegistryWarning::DuplicateMember {
                            word,
                            kept: kept.clone(),
                            dropped: alias_id.clone(),
                        });
                    }
                    continue;
                }
                row.alias_id = Some(alias_id.clone());
                row.enabled = entry.enabled;
                row.is_primary = entry.is_primary;
                if row.enabled {
                    info.count += row.count;
                }
                info.words.insert(word);
            }

            if info.words.is_empty() {
                report
                    .warnings
                    .push(RegistryWarning::EmptyAlias { alias_id });
                continue;
            }
            report.aliases += 1;
            report.words += info.words.len();
            self.aliases.insert(alias_id, info);
        }

        self.next_alias = max_suffix.map_or(0, |max| max + 1);
        for warning in &report.warnings {
            warn!("{warning}");
        }
        debug!(
            "imported {} aliases covering {} words",
            report.aliases, report.words
        );
        report
    }
}
