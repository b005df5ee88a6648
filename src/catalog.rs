//! Training-set catalog: deduplicated token subsets and the records that contain them.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::record::{Record, RecordId};
use crate::serialization::catalog::{CatalogSnapshot, TokenSetEntry};
use crate::token::Token;

/// Separator between identifiers in canonical subset keys.
pub const KEY_SEPARATOR: &str = "|";

/// Reserved negative-example slots. The core never fills them; they survive import/export.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Negatives {
    /// Keys of token sets usable as easy negatives.
    #[serde(default)]
    pub easy: Vec<String>,
}

/// One training-set candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenSet {
    /// Member tokens ordered by identifier.
    pub tokens: Vec<Token>,
    /// Operator label, empty by default.
    pub query: String,
    /// Contributing records, ascending.
    pub record_refs: Vec<RecordId>,
    /// Set when the subset is the full token set of a contributing record.
    pub is_leaf: bool,
    /// Equals `record_refs.len()`.
    pub count: usize,
    /// Keys discarded in favour of this set because they cover the same records.
    pub redundant_keys: Vec<String>,
    /// Reserved negative-example slots.
    pub negatives: Negatives,
}

impl TokenSet {
    pub(crate) fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            query: String::new(),
            record_refs: Vec::new(),
            is_leaf: false,
            count: 0,
            redundant_keys: Vec::new(),
            negatives: Negatives::default(),
        }
    }

    pub(crate) fn add_record(&mut self, record: RecordId, is_full_set: bool) {
        self.record_refs.push(record);
        self.count = self.record_refs.len();
        self.is_leaf |= is_full_set;
    }
}

/// Canonical key for a set of identifiers: sorted, joined with [`KEY_SEPARATOR`].
#[must_use]
pub fn canonical_key<'a, I>(identifiers: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let mut ids: Vec<&str> = identifiers.into_iter().collect();
    ids.sort_unstable();
    ids.dedup();
    ids.join(KEY_SEPARATOR)
}

/// Outcome of [`TrainingCatalog::from_snapshot`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogImportReport {
    /// Token sets installed.
    pub sets: usize,
    /// Record labels that matched no record and were dropped.
    pub unresolved: Vec<String>,
    /// Labels shared by several records, sorted; references to them were dropped.
    pub ambiguous: Vec<String>,
}

/// Token sets keyed by canonical key, iterated in key order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrainingCatalog {
    sets: BTreeMap<String, TokenSet>,
}

impl TrainingCatalog {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of token sets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sets.len()
    }

    /// Returns `true` when the catalog holds no token set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    /// Token set stored under `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&TokenSet> {
        self.sets.get(key)
    }

    /// Token sets in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &TokenSet)> {
        self.sets.iter().map(|(key, set)| (key.as_str(), set))
    }

    /// Keys in order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.sets.keys().map(String::as_str)
    }

    /// Token sets flagged as leaves.
    pub fn leaves(&self) -> impl Iterator<Item = (&str, &TokenSet)> {
        self.iter().filter(|(_, set)| set.is_leaf)
    }

    /// Sets the operator label of a token set; returns `false` for an unknown key.
    pub fn set_query(&mut self, key: &str, query: impl Into<String>) -> bool {
        match self.sets.get_mut(key) {
            Some(set) => {
                set.query = query.into();
                true
            }
            None => false,
        }
    }

    pub(crate) fn entry(&mut self, key: String) -> Entry<'_, String, TokenSet> {
        self.sets.entry(key)
    }

    pub(crate) fn get_mut(&mut self, key: &str) -> Option<&mut TokenSet> {
        self.sets.get_mut(key)
    }

    pub(crate) fn remove(&mut self, key: &str) -> Option<TokenSet> {
        self.sets.remove(key)
    }

    /// Exchange payload; records are referenced through [`Record::label`].
    #[must_use]
    pub fn to_snapshot(&self, records: &[Record]) -> CatalogSnapshot {
        self.sets
            .iter()
            .map(|(key, set)| {
                let labels = set
                    .record_refs
                    .iter()
                    .map(|&id| match records.get(id) {
                        Some(record) => record.label(id),
                        None => id.to_string(),
                    })
                    .collect();
                let entry = TokenSetEntry {
                    tokens: set.tokens.clone(),
                    query: set.query.clone(),
                    count: set.count,
                    is_leaf: set.is_leaf,
                    redundant_keys: set.redundant_keys.clone(),
                    negatives: set.negatives.clone(),
                    records: labels,
                };
                (key.clone(), entry)
            })
            .collect()
    }

    /// Rebuilds a catalog from its exchange payload, resolving record labels against `records`.
    ///
    /// Labels matching no record are dropped and listed in the report. Labels carried by more
    /// than one record cannot be resolved either; they are dropped and listed as ambiguous.
    /// Each set's count follows the resolved references.
    #[must_use]
    pub fn from_snapshot(
        snapshot: &CatalogSnapshot,
        records: &[Record],
    ) -> (Self, CatalogImportReport) {
        // `None` marks a label shared by several records.
        let mut by_label: FxHashMap<String, Option<RecordId>> = FxHashMap::default();
        for (id, record) in records.iter().enumerate() {
            by_label
                .entry(record.label(id))
                .and_modify(|slot| *slot = None)
                .or_insert(Some(id));
        }

        let mut catalog = Self::new();
        let mut report = CatalogImportReport::default();
        let mut ambiguous = BTreeSet::new();
        for (key, entry) in snapshot {
            let mut record_refs = Vec::with_capacity(entry.records.len());
            for label in &entry.records {
                match by_label.get(label) {
                    Some(Some(id)) => record_refs.push(*id),
                    Some(None) => {
                        ambiguous.insert(label.clone());
                    }
                    None => report.unresolved.push(label.clone()),
                }
            }
            record_refs.sort_unstable();
            record_refs.dedup();
            let set = TokenSet {
                tokens: entry.tokens.clone(),
                query: entry.query.clone(),
                count: record_refs.len(),
                record_refs,
                is_leaf: entry.is_leaf,
                redundant_keys: entry.redundant_keys.clone(),
                negatives: entry.negatives.clone(),
            };
            catalog.sets.insert(key.clone(), set);
        }
        report.sets = catalog.len();
        report.ambiguous = ambiguous.into_iter().collect();
        (catalog, report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::{NumberToken, WordToken};

    fn word(value: &str) -> Token {
        Token::Word(WordToken {
            word: value.into(),
            resolved_id: None,
            count: 1,
            is_primary: true,
        })
    }

    #[test]
    fn canonical_key_sorts_and_dedups() {
        assert_eq!(canonical_key(["red", "apple", "red"]), "apple|red");
        assert_eq!(canonical_key(Vec::<&str>::new()), "");
    }

    #[test]
    fn add_record_keeps_count_in_sync() {
        let mut set = TokenSet::new(vec![word("apple")]);
        set.add_record(0, false);
        set.add_record(3, true);
        assert_eq!(set.count, 2);
        assert_eq!(set.record_refs, vec![0, 3]);
        assert!(set.is_leaf);
    }

    #[test]
    fn set_query_updates_known_keys_only() {
        let mut catalog = TrainingCatalog::new();
        catalog
            .entry("apple".into())
            .or_insert_with(|| TokenSet::new(vec![word("apple")]));
        assert!(catalog.set_query("apple", "fruit"));
        assert!(!catalog.set_query("pear", "fruit"));
        assert_eq!(catalog.get("apple").unwrap().query, "fruit");
    }

    #[test]
    fn snapshot_round_trip_resolves_labels() {
        let records = vec![
            Record::new("a", Some("r-a".into()), "g", vec![]),
            Record::new("b", None, "g", vec![]),
        ];
        let mut catalog = TrainingCatalog::new();
        let set = catalog
            .entry("apple".into())
            .or_insert_with(|| {
                TokenSet::new(vec![
                    word("apple"),
                    Token::Number(NumberToken { value: "1".into() }),
                ])
            });
        set.add_record(0, true);
        set.add_record(1, false);
        set.negatives.easy.push("pear".into());

        let snapshot = catalog.to_snapshot(&records);
        assert_eq!(snapshot["apple"].records, vec!["r-a", "#1"]);

        let (restored, report) = TrainingCatalog::from_snapshot(&snapshot, &records);
        assert!(report.unresolved.is_empty());
        assert_eq!(restored, catalog);

        let (partial, report) = TrainingCatalog::from_snapshot(&snapshot, &records[..1]);
        assert_eq!(report.unresolved, vec!["#1"]);
        assert_eq!(partial.get("apple").unwrap().count, 1);
    }

    #[test]
    fn numeric_row_ids_do_not_collide_with_positions() {
        let records = vec![
            Record::new("apple red", Some("1".into()), "g", vec![]),
            Record::new("apple green", None, "g", vec![]),
        ];
        let mut catalog = TrainingCatalog::new();
        catalog
            .entry("apple".into())
            .or_insert_with(|| TokenSet::new(vec![word("apple")]))
            .add_record(0, false);
        catalog.get_mut("apple").unwrap().add_record(1, false);
        catalog
            .entry("apple|red".into())
            .or_insert_with(|| TokenSet::new(vec![word("apple"), word("red")]))
            .add_record(0, true);

        let snapshot = catalog.to_snapshot(&records);
        assert_eq!(snapshot["apple"].records, vec!["1", "#1"]);
        let (restored, report) = TrainingCatalog::from_snapshot(&snapshot, &records);
        assert!(report.unresolved.is_empty() && report.ambiguous.is_empty());
        assert_eq!(restored, catalog);
    }

    #[test]
    fn duplicate_row_ids_are_reported_not_guessed() {
        let records = vec![
            Record::new("apple red", Some("x".into()), "g", vec![]),
            Record::new("apple green", Some("x".into()), "g", vec![]),
            Record::new("apple pie", Some("y".into()), "g", vec![]),
        ];
        let mut catalog = TrainingCatalog::new();
        let set = catalog
            .entry("apple".into())
            .or_insert_with(|| TokenSet::new(vec![word("apple")]));
        for id in 0..3 {
            set.add_record(id, false);
        }

        let snapshot = catalog.to_snapshot(&records);
        assert_eq!(snapshot["apple"].records, vec!["x", "x", "y"]);
        let (restored, report) = TrainingCatalog::from_snapshot(&snapshot, &records);
        assert_eq!(report.ambiguous, vec!["x"]);
        assert!(report.unresolved.is_empty());
        let set = restored.get("apple").unwrap();
        assert_eq!(set.record_refs, vec![2]);
        assert_eq!(set.count, 1);
    }
}
