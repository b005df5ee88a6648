//! Session state owning the records, registries, and training catalog of one working set.

use std::path::Path;
use std::time::Instant;

use log::{info, warn};

use crate::attributes::AttributeRegistry;
use crate::catalog::{CatalogImportReport, TrainingCatalog};
use crate::config::{IngestConfig, PipelineConfig};
use crate::dictionary::{ImportReport, WordRegistry};
use crate::enrich::{enrich, EnrichStats};
use crate::error::Result;
use crate::metrics::{PipelineMetrics, Stage};
use crate::record::{self, Record, RecordId};
use crate::serialization::aliases::AliasSnapshot;
use crate::serialization::catalog::{parse_catalog_snapshot, CatalogSnapshot};
use crate::subsets::{deduplicate, generate_token_sets};
use crate::token::{AliasId, WordId};
use crate::tokenizer::{TokenizationPass, TokenizedCorpus, WordIndex};

/// Every registry of one working set, mutated through `&mut self` only.
///
/// The pipeline is the explicit chain load → enrich → generate; each step can also be run
/// alone. Registry edits mark the enriched streams stale, and generation re-enriches before
/// enumerating when needed.
#[derive(Debug, Clone)]
pub struct Session {
    config: PipelineConfig,
    ingest: IngestConfig,
    records: Vec<Record>,
    attributes: AttributeRegistry,
    index: WordIndex,
    dictionary: WordRegistry,
    catalog: TrainingCatalog,
    stale: bool,
    metrics: PipelineMetrics,
}

impl Session {
    /// Creates an empty session with the default ingest settings.
    pub fn new(config: PipelineConfig) -> Result<Self> {
        Self::with_ingest(config, IngestConfig::default())
    }

    /// Creates an empty session with explicit ingest settings.
    pub fn with_ingest(config: PipelineConfig, ingest: IngestConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            ingest,
            records: Vec::new(),
            attributes: AttributeRegistry::new(),
            index: WordIndex::default(),
            dictionary: WordRegistry::new(),
            catalog: TrainingCatalog::new(),
            stale: true,
            metrics: PipelineMetrics::default(),
        })
    }

    /// Pipeline configuration.
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Ingest configuration.
    #[must_use]
    pub fn ingest_config(&self) -> &IngestConfig {
        &self.ingest
    }

    /// Records in input order.
    #[must_use]
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Record at position `id`.
    #[must_use]
    pub fn record(&self, id: RecordId) -> Option<&Record> {
        self.records.get(id)
    }

    /// Attribute ids assigned while tokenizing.
    #[must_use]
    pub fn attributes(&self) -> &AttributeRegistry {
        &self.attributes
    }

    /// Word and alias registry.
    #[must_use]
    pub fn dictionary(&self) -> &WordRegistry {
        &self.dictionary
    }

    /// Training catalog of the latest generation or import.
    #[must_use]
    pub fn catalog(&self) -> &TrainingCatalog {
        &self.catalog
    }

    /// Stage timings and generation counters.
    #[must_use]
    pub fn metrics(&self) -> &PipelineMetrics {
        &self.metrics
    }

    /// Whether registry edits happened since the last enrichment.
    #[must_use]
    pub fn is_enrichment_stale(&self) -> bool {
        self.stale
    }

    /// Starts a batched tokenization pass over `records`.
    ///
    /// The session is untouched until the finished pass is handed to [`Session::install`];
    /// dropping the pass abandons it.
    pub fn begin_tokenization(&self, records: Vec<Record>) -> Result<TokenizationPass> {
        TokenizationPass::new(records, self.config.batch_size)
    }

    /// Installs a completed tokenization pass and rebuilds the dictionary.
    ///
    /// Alias groups and word flags of the previous working set are carried over for the words
    /// that still exist; the training catalog is cleared.
    pub fn install(&mut self, corpus: TokenizedCorpus) -> Result<ImportReport> {
        let aliases = self.dictionary.export_alias_snapshot();
        let flags: Vec<(String, bool, bool)> = self
            .dictionary
            .rows()
            .iter()
            .map(|row| (row.word.clone(), row.enabled, row.is_primary))
            .collect();

        self.records = corpus.records;
        self.attributes = corpus.attributes;
        self.index = corpus.index;
        self.catalog = TrainingCatalog::new();
        self.metrics.generation = None;

        let start = Instant::now();
        self.dictionary.recompute_word_counts(&self.records)?;
        let report = if aliases.is_empty() {
            ImportReport::default()
        } else {
            self.dictionary.apply_alias_snapshot(&aliases)
        };
        self.dictionary.restore_word_flags(
            flags
                .iter()
                .map(|(word, enabled, is_primary)| (word.as_str(), *enabled, *is_primary)),
        );
        self.metrics
            .record(Stage::CountWords, self.dictionary.len(), start.elapsed());
        self.stale = true;
        if self.config.show_progress {
            info!(
                "installed {} records with {} distinct words",
                self.records.len(),
                self.dictionary.len()
            );
        }
        Ok(report)
    }

    /// Tokenizes `records` in one go and installs the result.
    pub fn load_records(&mut self, records: Vec<Record>) -> Result<ImportReport> {
        let start = Instant::now();
        let total = records.len();
        let corpus = self.begin_tokenization(records)?.finish()?;
        self.metrics.record(Stage::Tokenize, total, start.elapsed());
        self.install(corpus)
    }

    /// Parses a tab-separated table and loads its rows.
    pub fn load_tsv(&mut self, text: &str) -> Result<ImportReport> {
        let records = record::parse_records(text, &self.ingest)?;
        self.load_records(records)
    }

    /// Reads a tab-separated table from disk and loads its rows.
    pub fn load_path<P: AsRef<Path>>(&mut self, path: P) -> Result<ImportReport> {
        let records = record::load_records(path, &self.ingest)?;
        self.load_records(records)
    }

    /// Drops every record, registry entry, and catalog entry.
    pub fn reset(&mut self) {
        self.records.clear();
        self.attributes = AttributeRegistry::new();
        self.index = WordIndex::default();
        self.dictionary = WordRegistry::new();
        self.catalog = TrainingCatalog::new();
        self.metrics = PipelineMetrics::default();
        self.stale = true;
    }

    /// Records containing `word`, ascending.
    #[must_use]
    pub fn related_records(&self, word: &str) -> &[RecordId] {
        self.index.records_for(word)
    }

    /// Records containing any member word of `alias`, ascending.
    #[must_use]
    pub fn alias_related_records(&self, alias: &AliasId) -> Vec<RecordId> {
        let Some(info) = self.dictionary.alias(alias) else {
            return Vec::new();
        };
        let mut related: Vec<RecordId> = info
            .words
            .iter()
            .flat_map(|word| self.index.records_for(word).iter().copied())
            .collect();
        related.sort_unstable();
        related.dedup();
        related
    }

    /// Groups words into a new alias; see [`WordRegistry::merge_into_alias`].
    pub fn merge_into_alias(&mut self, word_ids: &[WordId], label: &str) -> Option<AliasId> {
        let alias = self.dictionary.merge_into_alias(word_ids, label);
        self.stale |= alias.is_some();
        alias
    }

    /// Detaches words from their aliases; see [`WordRegistry::split_from_alias`].
    pub fn split_from_alias(&mut self, word_ids: &[WordId]) -> usize {
        let detached = self.dictionary.split_from_alias(word_ids);
        self.stale |= detached > 0;
        detached
    }

    /// Enables or disables a word.
    pub fn set_enabled(&mut self, id: WordId, enabled: bool) -> bool {
        let changed = self.dictionary.set_enabled(id, enabled);
        self.stale |= changed;
        changed
    }

    /// Sets or clears a word's primary flag.
    pub fn set_primary(&mut self, id: WordId, is_primary: bool) -> bool {
        let changed = self.dictionary.set_primary(id, is_primary);
        self.stale |= changed;
        changed
    }

    /// Enables or disables an alias group.
    pub fn set_alias_enabled(&mut self, id: &AliasId, enabled: bool) -> bool {
        let changed = self.dictionary.set_alias_enabled(id, enabled);
        self.stale |= changed;
        changed
    }

    /// Sets or clears an alias group's primary flag.
    pub fn set_alias_primary(&mut self, id: &AliasId, is_primary: bool) -> bool {
        let changed = self.dictionary.set_alias_primary(id, is_primary);
        self.stale |= changed;
        changed
    }

    /// Replaces the alias table from a JSON payload; state is unchanged when it is malformed.
    pub fn import_aliases(&mut self, json: &str) -> Result<ImportReport> {
        let report = self.dictionary.import_alias_snapshot(json)?;
        self.stale = true;
        Ok(report)
    }

    /// Replaces the alias table from an already parsed payload.
    pub fn apply_aliases(&mut self, snapshot: &AliasSnapshot) -> ImportReport {
        let report = self.dictionary.apply_alias_snapshot(snapshot);
        self.stale = true;
        report
    }

    /// Alias table in the exchange format.
    #[must_use]
    pub fn export_aliases(&self) -> AliasSnapshot {
        self.dictionary.export_alias_snapshot()
    }

    /// Re-maps and enriches every record against the current registry.
    pub fn enrich(&mut self) -> EnrichStats {
        let start = Instant::now();
        let stats = enrich(&mut self.records, &self.dictionary);
        self.metrics
            .record(Stage::Enrich, stats.records, start.elapsed());
        self.stale = false;
        if self.config.show_progress {
            info!(
                "enriched {} records: {} words, {} aliases, {} dropped",
                stats.records, stats.words, stats.aliases, stats.dropped
            );
        }
        stats
    }

    /// Enumerates and deduplicates the training catalog, replacing the previous one.
    ///
    /// Records are enriched first when registry edits made their streams stale.
    pub fn generate_training_sets(&mut self) -> Result<&TrainingCatalog> {
        if self.stale {
            self.enrich();
        }

        let start = Instant::now();
        let (mut catalog, mut counters) = generate_token_sets(&self.records, &self.config)?;
        self.metrics
            .record(Stage::Generate, catalog.len(), start.elapsed());

        let start = Instant::now();
        counters.redundant_sets = deduplicate(&mut catalog);
        self.metrics
            .record(Stage::Deduplicate, counters.distinct_sets, start.elapsed());
        if self.config.show_progress {
            info!(
                "catalog holds {} token sets after dropping {} redundant ones",
                catalog.len(),
                counters.redundant_sets
            );
        }

        self.metrics.generation = Some(counters);
        self.catalog = catalog;
        Ok(&self.catalog)
    }

    /// Training catalog in the exchange format.
    #[must_use]
    pub fn export_training_sets(&self) -> CatalogSnapshot {
        self.catalog.to_snapshot(&self.records)
    }

    /// Replaces the training catalog from a JSON payload; state is unchanged when it is
    /// malformed.
    pub fn import_training_sets(&mut self, json: &str) -> Result<CatalogImportReport> {
        let snapshot = parse_catalog_snapshot(json)?;
        Ok(self.apply_training_sets(&snapshot))
    }

    /// Replaces the training catalog from an already parsed payload.
    pub fn apply_training_sets(&mut self, snapshot: &CatalogSnapshot) -> CatalogImportReport {
        let (catalog, report) = TrainingCatalog::from_snapshot(snapshot, &self.records);
        for label in &report.unresolved {
            warn!("training set references unknown record {label:?}");
        }
        for label in &report.ambiguous {
            warn!("record label {label:?} is shared by several records; references dropped");
        }
        self.catalog = catalog;
        report
    }

    /// Sets the operator label of a token set; returns `false` for an unknown key.
    pub fn set_query(&mut self, key: &str, query: impl Into<String>) -> bool {
        self.catalog.set_query(key, query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TriploError;
    use crate::token::Token;

    const TABLE: &str = "text\tid\nRed apple\tr1\ncrimson apple pie\tr2\ngreen pear\tr3\n";

    fn session() -> Session {
        let cfg = PipelineConfig::builder()
            .batch_size(2)
            .show_progress(false)
            .build()
            .expect("valid config");
        let mut session = Session::new(cfg).expect("session");
        session.load_tsv(TABLE).expect("load");
        session
    }

    fn word(session: &Session, word: &str) -> WordId {
        session.dictionary().word_id(word).expect("known word")
    }

    #[test]
    fn load_builds_dictionary_and_index() {
        let session = session();
        assert_eq!(session.records().len(), 3);
        assert_eq!(session.dictionary().row_by_word("apple").unwrap().count, 2);
        assert_eq!(session.related_records("apple"), &[0, 1]);
        assert!(session.is_enrichment_stale());
        assert!(session.metrics().last(Stage::Tokenize).is_some());
    }

    #[test]
    fn edits_mark_enrichment_stale() {
        let mut session = session();
        session.enrich();
        assert!(!session.is_enrichment_stale());
        let apple = word(&session, "apple");
        assert!(session.set_primary(apple, true));
        assert!(session.is_enrichment_stale());
        assert!(!session.set_primary(999, true));
    }

    #[test]
    fn generation_reenriches_and_deduplicates() {
        let mut session = session();
        let reds = [word(&session, "red"), word(&session, "crimson")];
        let alias = session.merge_into_alias(&reds, "reds").expect("alias");
        session.set_alias_primary(&alias, true);
        assert_eq!(session.alias_related_records(&alias), vec![0, 1]);

        let catalog = session.generate_training_sets().expect("generate");
        let pair = catalog.get("alias:reds:0|apple").expect("alias and apple");
        assert_eq!(pair.record_refs, vec![0, 1]);
        assert_eq!(pair.redundant_keys, vec![alias.as_str()]);
        assert!(catalog.get(alias.as_str()).is_none());
        assert!(catalog.get("apple").is_none());

        let counters = session.metrics().generation.clone().expect("counters");
        assert_eq!(counters.records_without_primary, 1);
        assert!(counters.redundant_sets > 0);
    }

    #[test]
    fn reload_keeps_aliases_and_flags() {
        let mut session = session();
        let reds = [word(&session, "red"), word(&session, "crimson")];
        let alias = session.merge_into_alias(&reds, "reds").expect("alias");
        let pear = word(&session, "pear");
        session.set_primary(pear, true);

        let report = session
            .load_tsv("text\tid\nred pear\tx1\nplum\tx2\n")
            .expect("reload");
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(
            session.dictionary().alias(&alias).unwrap().words.len(),
            1
        );
        assert!(session.dictionary().row_by_word("pear").unwrap().is_primary);
        assert!(session.catalog().is_empty());
    }

    #[test]
    fn reload_keeps_member_flags_of_disabled_alias() {
        let table = "text\nred apple\ncrimson apple\n";
        let mut session = session();
        session.load_tsv(table).expect("load");
        let reds = [word(&session, "red"), word(&session, "crimson")];
        let alias = session.merge_into_alias(&reds, "reds").expect("alias");
        session.set_alias_enabled(&alias, false);
        let flags = |session: &Session| -> Vec<(String, bool, bool)> {
            session
                .dictionary()
                .rows()
                .iter()
                .map(|row| (row.word.clone(), row.enabled, row.is_primary))
                .collect()
        };
        let before = flags(&session);
        let count = session.dictionary().alias(&alias).unwrap().count;

        session.load_tsv(table).expect("reload");
        assert_eq!(flags(&session), before);
        assert_eq!(session.dictionary().alias(&alias).unwrap().count, count);
        session.enrich();
        let enriched: Vec<String> = session.records()[0]
            .enriched_tokens()
            .iter()
            .filter_map(Token::identifier)
            .map(str::to_owned)
            .collect();
        assert_eq!(enriched, vec!["red", "apple"]);
    }

    #[test]
    fn training_sets_round_trip_through_labels() {
        let mut session = session();
        let apple = word(&session, "apple");
        session.set_primary(apple, true);
        session.generate_training_sets().expect("generate");
        assert!(session.set_query("apple", "fruit"));
        let exported = session.export_training_sets();
        assert_eq!(exported["apple"].records, vec!["r1", "r2"]);

        let json = serde_json::to_string(&exported).expect("serialize");
        let before = session.catalog().clone();
        let report = session.import_training_sets(&json).expect("import");
        assert!(report.unresolved.is_empty() && report.ambiguous.is_empty());
        assert_eq!(session.catalog(), &before);

        let err = session.import_training_sets("{").expect_err("malformed");
        assert!(matches!(err, TriploError::ImportParse(_)));
        assert_eq!(session.catalog(), &before);
    }

    #[test]
    fn cancelled_pass_leaves_session_untouched() {
        let mut session = session();
        let records = record::parse_records("text\nplum\nfig\n", session.ingest_config())
            .expect("parse");
        let mut pass = session.begin_tokenization(records).expect("pass");
        assert!(pass.step().expect("step").is_some());
        pass.cancel();
        assert_eq!(session.records().len(), 3);

        session.reset();
        assert!(session.records().is_empty());
        assert!(session.dictionary().is_empty());
    }
}
