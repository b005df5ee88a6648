//! Subset enumeration over enriched records and deduplication of the resulting catalog.

use std::time::Instant;

use log::{debug, info, warn};
use rayon::prelude::*;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::catalog::{TokenSet, TrainingCatalog, KEY_SEPARATOR};
use crate::config::{PipelineConfig, SubsetLimitPolicy};
use crate::error::{Result, TriploError};
use crate::metrics::{sample_rss_kb, GenerationMetrics};
use crate::record::{Record, RecordId};
use crate::token::Token;

/// Subsets enumerated per parallel chunk before they are folded into the catalog.
///
/// Every pending subset holds its key `String`, so this bounds the transient key count of a
/// chunk. A single record is never split, which means one record at
/// [`crate::config::SUBSET_TOKEN_CEILING`] still holds `2^24` keys on its own.
const FOLD_SUBSET_BUDGET: u64 = 1 << 20;

/// Distinct word and alias tokens of an enriched stream, ordered by identifier.
///
/// Repeats keep their first occurrence. Attributes and numbers never take part.
#[must_use]
pub fn candidate_tokens(enriched: &[Token]) -> Vec<Token> {
    let mut seen = FxHashSet::default();
    let mut candidates: Vec<Token> = enriched
        .iter()
        .filter(|&token| token.identifier().is_some_and(|id| seen.insert(id)))
        .cloned()
        .collect();
    candidates.sort_by(|a, b| a.identifier().cmp(&b.identifier()));
    candidates
}

/// Number of non-empty subsets of `n` candidates.
#[must_use]
pub fn raw_subset_count(n: usize) -> u64 {
    match u32::try_from(n) {
        Ok(n) if n < 64 => (1u64 << n) - 1,
        _ => u64::MAX,
    }
}

/// Bit masks over `candidates` of every non-empty subset holding a primary token.
///
/// Callers keep `candidates.len()` within the configured ceiling.
fn primary_masks(candidates: &[Token]) -> Vec<u32> {
    let primary = candidates
        .iter()
        .enumerate()
        .filter(|(_, token)| token.is_primary())
        .fold(0u32, |mask, (bit, _)| mask | (1 << bit));
    let full = full_mask(candidates.len());
    (1..=full).filter(|mask| mask & primary != 0).collect()
}

/// Splits `eligible` into contiguous chunks whose summed subset counts stay within `budget`.
///
/// A record whose own count exceeds the budget gets a chunk to itself.
fn fold_chunks(
    eligible: &[RecordId],
    subsets_of: impl Fn(RecordId) -> u64,
    budget: u64,
) -> Vec<&[RecordId]> {
    let mut chunks = Vec::new();
    let mut start = 0usize;
    let mut pending = 0u64;
    for (offset, &record) in eligible.iter().enumerate() {
        let subsets = subsets_of(record);
        if offset > start && pending.saturating_add(subsets) > budget {
            chunks.push(&eligible[start..offset]);
            start = offset;
            pending = 0;
        }
        pending = pending.saturating_add(subsets);
    }
    if start < eligible.len() {
        chunks.push(&eligible[start..]);
    }
    chunks
}

fn full_mask(n: usize) -> u32 {
    if n >= 32 {
        u32::MAX
    } else {
        (1u32 << n) - 1
    }
}

fn subset_key(candidates: &[Token], mask: u32) -> String {
    let mut key = String::new();
    for (bit, token) in candidates.iter().enumerate() {
        if mask & (1 << bit) == 0 {
            continue;
        }
        if !key.is_empty() {
            key.push_str(KEY_SEPARATOR);
        }
        key.push_str(token.identifier().unwrap_or_default());
    }
    key
}

fn subset_tokens(candidates: &[Token], mask: u32) -> Vec<Token> {
    candidates
        .iter()
        .enumerate()
        .filter(|(bit, _)| mask & (1 << bit) != 0)
        .map(|(_, token)| token.clone())
        .collect()
}

/// Enumerates the primary-bearing subsets of every enriched record into a fresh catalog.
///
/// Enumeration runs in parallel per record; the catalog is filled in record order, so the
/// output is the same for any thread count. Records without a primary token contribute
/// nothing. Records above `max_subset_tokens` are skipped with a warning or abort the run,
/// depending on the configured [`SubsetLimitPolicy`].
pub fn generate_token_sets(
    records: &[Record],
    cfg: &PipelineConfig,
) -> Result<(TrainingCatalog, GenerationMetrics)> {
    cfg.validate()?;
    let start = Instant::now();
    let mut metrics = GenerationMetrics {
        records: records.len(),
        ..GenerationMetrics::default()
    };

    let candidates: Vec<Vec<Token>> = records
        .par_iter()
        .map(|record| candidate_tokens(record.enriched_tokens()))
        .collect();

    let mut eligible: Vec<RecordId> = Vec::new();
    for (record, tokens) in candidates.iter().enumerate() {
        if !tokens.iter().any(Token::is_primary) {
            metrics.records_without_primary += 1;
            continue;
        }
        if tokens.len() > cfg.max_subset_tokens {
            match cfg.subset_limit_policy {
                SubsetLimitPolicy::Fail => {
                    return Err(TriploError::SubsetLimit {
                        record,
                        tokens: tokens.len(),
                        limit: cfg.max_subset_tokens,
                    });
                }
                SubsetLimitPolicy::Skip => {
                    warn!(
                        "skipping record {record}: {} distinct tokens exceed the limit of {}",
                        tokens.len(),
                        cfg.max_subset_tokens
                    );
                    metrics.records_over_limit += 1;
                    continue;
                }
            }
        }
        eligible.push(record);
    }

    let mut catalog = TrainingCatalog::new();
    let chunks = fold_chunks(
        &eligible,
        |record| raw_subset_count(candidates[record].len()),
        FOLD_SUBSET_BUDGET,
    );
    for chunk in chunks {
        let enumerated: Vec<Vec<(String, u32)>> = chunk
            .par_iter()
            .map(|&record| {
                let tokens = &candidates[record];
                primary_masks(tokens)
                    .into_iter()
                    .map(|mask| (subset_key(tokens, mask), mask))
                    .collect()
            })
            .collect();

        for (&record, subsets) in chunk.iter().zip(enumerated) {
            let tokens = &candidates[record];
            let full = full_mask(tokens.len());
            metrics.candidate_subsets += raw_subset_count(tokens.len());
            metrics.kept_subsets += subsets.len() as u64;
            for (key, mask) in subsets {
                catalog
                    .entry(key)
                    .or_insert_with(|| TokenSet::new(subset_tokens(tokens, mask)))
                    .add_record(record, mask == full);
            }
        }
        debug!("folded subsets of {} records", chunk.len());
    }

    metrics.distinct_sets = catalog.len();
    metrics.rss_kb = sample_rss_kb();
    if cfg.show_progress {
        info!(
            "generated {} token sets from {} of {} records in {:.2?}",
            catalog.len(),
            eligible.len(),
            records.len(),
            start.elapsed()
        );
    }
    Ok((catalog, metrics))
}

/// Keeps one token set per distinct set of contributing records; returns how many were removed.
///
/// Within a group the set with more tokens wins, then a leaf, then the smaller key. The keys
/// of the losers are recorded in the winner's `redundant_keys`.
pub fn deduplicate(catalog: &mut TrainingCatalog) -> usize {
    let mut groups: FxHashMap<Vec<RecordId>, Vec<String>> = FxHashMap::default();
    let mut order: Vec<Vec<RecordId>> = Vec::new();
    for (key, set) in catalog.iter() {
        let members = groups.entry(set.record_refs.clone()).or_insert_with(|| {
            order.push(set.record_refs.clone());
            Vec::new()
        });
        members.push(key.to_owned());
    }

    let mut removed = 0usize;
    for refs in order {
        let Some(keys) = groups.remove(&refs) else {
            continue;
        };
        if keys.len() < 2 {
            continue;
        }
        let Some(winner) = keys
            .iter()
            .filter_map(|key| catalog.get(key).map(|set| (key, set)))
            .max_by(|(a_key, a), (b_key, b)| {
                a.tokens
                    .len()
                    .cmp(&b.tokens.len())
                    .then(a.is_leaf.cmp(&b.is_leaf))
                    .then(b_key.cmp(a_key))
            })
            .map(|(key, _)| key.clone())
        else {
            continue;
        };

        let mut redundant = Vec::with_capacity(keys.len() - 1);
        for key in keys.into_iter().filter(|key| *key != winner) {
            if let Some(loser) = catalog.remove(&key) {
                redundant.extend(loser.redundant_keys);
                redundant.push(key);
                removed += 1;
            }
        }
        if let Some(set) = catalog.get_mut(&winner) {
            set.redundant_keys.extend(redundant);
            set.redundant_keys.sort_unstable();
            set.redundant_keys.dedup();
        }
    }
    debug!("deduplication removed {removed} token sets");
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::AttributeRegistry;
    use crate::dictionary::WordRegistry;
    use crate::enrich::enrich;
    use crate::tokenizer::tokenize;

    fn prepare(texts: &[&str], primaries: &[&str]) -> Vec<Record> {
        let mut attributes = AttributeRegistry::new();
        let mut records: Vec<Record> = texts
            .iter()
            .map(|text| {
                let mut record = Record::new(*text, None, "g", vec![(*text).to_owned()]);
                let out = tokenize(text, &mut attributes).expect("tokenize");
                record.set_tokens(out.tokens, out.words);
                record
            })
            .collect();
        let mut registry = WordRegistry::new();
        registry.recompute_word_counts(&records).expect("recompute");
        for word in primaries {
            let id = registry.word_id(word).expect("known word");
            registry.set_primary(id, true);
        }
        enrich(&mut records, &registry);
        records
    }

    fn quiet() -> PipelineConfig {
        PipelineConfig::builder()
            .show_progress(false)
            .build()
            .expect("valid config")
    }

    #[test]
    fn candidates_are_distinct_and_sorted() {
        let records = prepare(&["pear 3 apple pear [att:c]x[/att]"], &[]);
        let ids: Vec<String> = candidate_tokens(records[0].enriched_tokens())
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(ids, vec!["apple", "pear"]);
    }

    #[test]
    fn three_tokens_enumerate_seven_subsets() {
        let records = prepare(&["apple red fresh"], &["apple"]);
        let (catalog, metrics) = generate_token_sets(&records, &quiet()).expect("generate");
        assert_eq!(metrics.candidate_subsets, 7);
        assert_eq!(metrics.kept_subsets, 4);
        let keys: Vec<&str> = catalog.keys().collect();
        assert_eq!(
            keys,
            vec!["apple", "apple|fresh", "apple|fresh|red", "apple|red"]
        );
        let leaves: Vec<&str> = catalog.leaves().map(|(key, _)| key).collect();
        assert_eq!(leaves, vec!["apple|fresh|red"]);
        let full = catalog.get("apple|fresh|red").unwrap();
        assert_eq!(full.tokens.len(), 3);
        assert_eq!(full.record_refs, vec![0]);
    }

    #[test]
    fn shared_subsets_collect_every_record() {
        let records = prepare(&["apple red", "green apple", "pear"], &["apple"]);
        let (catalog, metrics) = generate_token_sets(&records, &quiet()).expect("generate");
        assert_eq!(metrics.records_without_primary, 1);
        let apple = catalog.get("apple").unwrap();
        assert_eq!(apple.record_refs, vec![0, 1]);
        assert_eq!(apple.count, 2);
        assert!(!apple.is_leaf);
        assert!(catalog.get("apple|green").unwrap().is_leaf);
    }

    #[test]
    fn no_primary_yields_empty_catalog() {
        let records = prepare(&["apple red", "pear"], &[]);
        let (catalog, metrics) = generate_token_sets(&records, &quiet()).expect("generate");
        assert!(catalog.is_empty());
        assert_eq!(metrics.records_without_primary, 2);
        assert_eq!(metrics.candidate_subsets, 0);
    }

    #[test]
    fn cap_policy_skips_or_fails() {
        let records = prepare(&["apple red fresh", "apple pear"], &["apple"]);
        let skip = PipelineConfig::builder()
            .max_subset_tokens(2)
            .show_progress(false)
            .build()
            .unwrap();
        let (catalog, metrics) = generate_token_sets(&records, &skip).expect("generate");
        assert_eq!(metrics.records_over_limit, 1);
        assert_eq!(catalog.get("apple").unwrap().record_refs, vec![1]);

        let fail = PipelineConfig {
            subset_limit_policy: SubsetLimitPolicy::Fail,
            ..skip
        };
        let err = generate_token_sets(&records, &fail).expect_err("over limit");
        assert!(matches!(
            err,
            TriploError::SubsetLimit {
                record: 0,
                tokens: 3,
                limit: 2
            }
        ));
    }

    #[test]
    fn deduplicate_keeps_largest_set_per_record_group() {
        let records = prepare(&["apple red", "apple green"], &["apple"]);
        let (mut catalog, _) = generate_token_sets(&records, &quiet()).expect("generate");
        assert_eq!(deduplicate(&mut catalog), 0);

        let records = prepare(&["apple red"], &["apple"]);
        let (mut catalog, _) = generate_token_sets(&records, &quiet()).expect("generate");
        assert_eq!(deduplicate(&mut catalog), 1);
        let keys: Vec<&str> = catalog.keys().collect();
        assert_eq!(keys, vec!["apple|red"]);
        let winner = catalog.get("apple|red").unwrap();
        assert_eq!(winner.redundant_keys, vec!["apple"]);
        assert!(winner.is_leaf);
    }

    #[test]
    fn deduplicate_breaks_ties_by_leaf_then_key() {
        let mut catalog = TrainingCatalog::new();
        for (key, leaf) in [("b", false), ("c", true), ("a", false)] {
            let records = prepare(&[key], &[key]);
            let tokens = candidate_tokens(records[0].enriched_tokens());
            catalog
                .entry(key.into())
                .or_insert_with(|| TokenSet::new(tokens))
                .add_record(0, leaf);
        }
        deduplicate(&mut catalog);
        let keys: Vec<&str> = catalog.keys().collect();
        assert_eq!(keys, vec!["c"]);
        assert_eq!(catalog.get("c").unwrap().redundant_keys, vec!["a", "b"]);

        let mut catalog = TrainingCatalog::new();
        for key in ["b", "a"] {
            let records = prepare(&[key], &[key]);
            let tokens = candidate_tokens(records[0].enriched_tokens());
            catalog
                .entry(key.into())
                .or_insert_with(|| TokenSet::new(tokens))
                .add_record(0, false);
        }
        deduplicate(&mut catalog);
        assert_eq!(catalog.keys().collect::<Vec<_>>(), vec!["a"]);
    }

    #[test]
    fn fold_chunks_stay_within_subset_budget() {
        let sizes = [3u64, 3, 7, 1, 15, 1, 1];
        let eligible: Vec<RecordId> = (0..sizes.len()).collect();
        let chunks = fold_chunks(&eligible, |record| sizes[record], 8);
        let expected: Vec<&[RecordId]> = vec![&[0, 1], &[2, 3], &[4], &[5, 6]];
        assert_eq!(chunks, expected);
        assert_eq!(chunks.concat(), eligible);

        let ceiling = raw_subset_count(crate::config::SUBSET_TOKEN_CEILING);
        let chunks = fold_chunks(&eligible, |_| ceiling, FOLD_SUBSET_BUDGET);
        assert!(chunks.iter().all(|chunk| chunk.len() == 1));
        assert!(fold_chunks(&[], |_| 1, 8).is_empty());
    }

    #[test]
    fn generation_is_deterministic() {
        let texts = ["apple red", "apple green red", "pear apple", "red pear"];
        let records = prepare(&texts, &["apple", "red"]);
        let (first, _) = generate_token_sets(&records, &quiet()).expect("generate");
        let (second, _) = generate_token_sets(&records, &quiet()).expect("generate");
        assert_eq!(first, second);
    }
}
