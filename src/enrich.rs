//! Word mapping and alias substitution over tokenized records.

use std::sync::Arc;

use rayon::prelude::*;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::dictionary::WordRegistry;
use crate::record::Record;
use crate::token::{AliasId, AliasToken, RawToken, ResolvedId, Token, WordToken};

/// Counters gathered by [`enrich`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnrichStats {
    /// Records processed.
    pub records: usize,
    /// Word tokens emitted.
    pub words: usize,
    /// Alias tokens emitted.
    pub aliases: usize,
    /// Words dropped because they are disabled.
    pub dropped: usize,
}

impl EnrichStats {
    fn merge(mut self, other: Self) -> Self {
        self.records += other.records;
        self.words += other.words;
        self.aliases += other.aliases;
        self.dropped += other.dropped;
        self
    }
}

/// Maps bare words onto the registry; attributes and numbers pass through.
///
/// Unknown words keep a zero count and no resolved id.
#[must_use]
pub fn map_words(tokens: &[RawToken], registry: &WordRegistry) -> Vec<Token> {
    tokens
        .iter()
        .map(|token| match token {
            RawToken::Attribute(att) => Token::Attribute(att.clone()),
            RawToken::Number(num) => Token::Number(num.clone()),
            RawToken::Word(word) => {
                let row = registry.row_by_word(word);
                Token::Word(WordToken {
                    word: word.clone(),
                    resolved_id: registry.resolve(word),
                    count: row.map_or(0, |row| row.count),
                    is_primary: row.is_some_and(|row| row.is_primary),
                })
            }
        })
        .collect()
}

/// Shared alias tokens for every enabled alias group.
#[must_use]
pub fn alias_tokens(registry: &WordRegistry) -> FxHashMap<AliasId, Arc<AliasToken>> {
    registry
        .aliases()
        .filter(|info| info.enabled)
        .map(|info| (info.alias_id.clone(), Arc::new(AliasToken::from(info))))
        .collect()
}

fn substitute(
    mapped: &[Token],
    registry: &WordRegistry,
    aliases: &FxHashMap<AliasId, Arc<AliasToken>>,
) -> (Vec<Token>, EnrichStats) {
    let mut stats = EnrichStats {
        records: 1,
        ..EnrichStats::default()
    };
    let mut emitted: FxHashSet<&AliasId> = FxHashSet::default();
    let mut out = Vec::with_capacity(mapped.len());
    for token in mapped {
        let Token::Word(word) = token else {
            out.push(token.clone());
            continue;
        };
        if registry
            .row_by_word(&word.word)
            .is_some_and(|row| !row.enabled)
        {
            stats.dropped += 1;
            continue;
        }
        if let Some(ResolvedId::Alias(alias_id)) = &word.resolved_id {
            if let Some(alias) = aliases.get(alias_id) {
                if emitted.insert(&alias.alias_id) {
                    out.push(Token::Alias(Arc::clone(alias)));
                    stats.aliases += 1;
                }
                continue;
            }
        }
        out.push(token.clone());
        stats.words += 1;
    }
    (out, stats)
}

/// Re-maps every record against the current registry and substitutes alias groups.
///
/// Disabled words are dropped, the first member of an enabled alias in a record is replaced
/// by the alias token and later members are dropped, and the alias tokens are shared across
/// records. Running twice on an unchanged registry produces identical streams.
pub fn enrich(records: &mut [Record], registry: &WordRegistry) -> EnrichStats {
    let aliases = alias_tokens(registry);
    records
        .par_iter_mut()
        .map(|record| {
            let mapped = map_words(record.tokens(), registry);
            let (enriched, stats) = substitute(&mapped, registry, &aliases);
            record.set_enriched(mapped, enriched);
            stats
        })
        .reduce(EnrichStats::default, EnrichStats::merge)
}
