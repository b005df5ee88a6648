//! Batched tokenization pass over a full record set.

use log::debug;
use rustc_hash::FxHashMap;

use crate::attributes::AttributeRegistry;
use crate::error::{Result, TriploError};
use crate::record::{Record, RecordId};

use super::tokenize;

/// Word to records lookup built while tokenizing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WordIndex {
    records: FxHashMap<String, Vec<RecordId>>,
}

impl WordIndex {
    /// Registers `record` as containing `word`; records must arrive in ascending order.
    pub fn insert(&mut self, word: &str, record: RecordId) {
        let owners = self.records.entry(word.to_owned()).or_default();
        if owners.last() != Some(&record) {
            owners.push(record);
        }
    }

    /// Records containing `word`, ascending.
    #[must_use]
    pub fn records_for(&self, word: &str) -> &[RecordId] {
        self.records.get(word).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Number of distinct indexed words.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns `true` when no word has been indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Snapshot reported after each batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassProgress {
    /// Records tokenized so far.
    pub processed: usize,
    /// Records in the pass.
    pub total: usize,
}

impl PassProgress {
    /// Whether every record has been tokenized.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.processed >= self.total
    }
}

/// Everything a completed pass produced.
#[derive(Debug, Clone, Default)]
pub struct TokenizedCorpus {
    /// Records with their raw token streams attached, in input order.
    pub records: Vec<Record>,
    /// Attribute ids assigned during the pass.
    pub attributes: AttributeRegistry,
    /// Word to records lookup.
    pub index: WordIndex,
}

/// Tokenizes records in contiguous batches, yielding to the caller between batches.
///
/// The pass owns its registries, so dropping it before completion discards every partial
/// result. Iterating the pass drives one batch per step; the outcome is the same for any
/// batch size. A failed step leaves the pass unusable, so drop it.
#[derive(Debug)]
pub struct TokenizationPass {
    records: Vec<Record>,
    next: usize,
    batch_size: usize,
    attributes: AttributeRegistry,
    index: WordIndex,
}

impl TokenizationPass {
    /// Prepares a pass over `records`.
    pub fn new(records: Vec<Record>, batch_size: usize) -> Result<Self> {
        if batch_size == 0 {
            return Err(TriploError::InvalidConfig(
                "batch_size must be greater than zero".into(),
            ));
        }
        Ok(Self {
            records,
            next: 0,
            batch_size,
            attributes: AttributeRegistry::new(),
            index: WordIndex::default(),
        })
    }

    /// Current progress without advancing.
    #[must_use]
    pub fn progress(&self) -> PassProgress {
        PassProgress {
            processed: self.next,
            total: self.records.len(),
        }
    }

    /// Tokenizes the next batch; returns `None` once every record is done.
    pub fn step(&mut self) -> Result<Option<PassProgress>> {
        if self.next >= self.records.len() {
            return Ok(None);
        }
        let end = (self.next + self.batch_size).min(self.records.len());
        for id in self.next..end {
            let record = &mut self.records[id];
            let out = tokenize(record.text(), &mut self.attributes)?;
            for word in &out.words {
                self.index.insert(word, id);
            }
            record.set_tokens(out.tokens, out.words);
        }
        debug!("tokenized records {}..{} of {}", self.next, end, self.records.len());
        self.next = end;
        Ok(Some(self.progress()))
    }

    /// Runs any remaining batches and hands over the results.
    pub fn finish(mut self) -> Result<TokenizedCorpus> {
        while self.step()?.is_some() {}
        Ok(TokenizedCorpus {
            records: self.records,
            attributes: self.attributes,
            index: self.index,
        })
    }

    /// Abandons the pass, discarding every partial result.
    pub fn cancel(self) {
        debug!(
            "tokenization cancelled after {} of {} records",
            self.next,
            self.records.len()
        );
    }
}

impl Iterator for TokenizationPass {
    type Item = Result<PassProgress>;

    fn next(&mut self) -> Option<Self::Item> {
        self.step().transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn records(texts: &[&str]) -> Vec<Record> {
        texts
            .iter()
            .map(|text| Record::new(*text, None, "g", vec![(*text).to_owned()]))
            .collect()
    }

    #[test]
    fn steps_through_contiguous_batches() {
        let mut pass = TokenizationPass::new(records(&["a", "b", "c", "d", "e"]), 2).unwrap();
        let steps: Vec<usize> = pass
            .by_ref()
            .map(|progress| progress.unwrap().processed)
            .collect();
        assert_eq!(steps, vec![2, 4, 5]);
        assert!(pass.progress().is_complete());
        assert_eq!(pass.step().unwrap(), None);
    }

    #[test]
    fn batch_size_does_not_change_output() {
        let texts = [
            "red [att:c]x[/att] apple",
            "green apple [att:c]y[/att]",
            "red pear [att:c]x[/att]",
        ];
        let single = TokenizationPass::new(records(&texts), 100)
            .unwrap()
            .finish()
            .unwrap();
        let batched = TokenizationPass::new(records(&texts), 1)
            .unwrap()
            .finish()
            .unwrap();
        assert_eq!(single.records, batched.records);
        assert_eq!(single.attributes, batched.attributes);
        assert_eq!(single.index, batched.index);
    }

    #[test]
    fn index_lists_each_record_once() {
        let corpus = TokenizationPass::new(records(&["apple apple", "pear", "apple"]), 2)
            .unwrap()
            .finish()
            .unwrap();
        assert_eq!(corpus.index.records_for("apple"), &[0, 2]);
        assert_eq!(corpus.index.records_for("pear"), &[1]);
        assert!(corpus.index.records_for("plum").is_empty());
        assert_eq!(corpus.index.len(), 2);
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let err = TokenizationPass::new(records(&["a"]), 0).expect_err("invalid batch");
        assert!(matches!(err, TriploError::InvalidConfig(_)));
    }
}
