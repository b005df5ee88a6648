//! Metrics describing pipeline stages and subset generation.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Pipeline stage a timing belongs to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Tokenization pass over all records.
    Tokenize,
    /// Dictionary rebuild from record words.
    CountWords,
    /// Alias substitution into token streams.
    Enrich,
    /// Subset enumeration.
    Generate,
    /// Canonicalisation of subsets spanning identical records.
    Deduplicate,
}

/// Timing captured for one stage run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StageMetrics {
    /// Stage that ran.
    pub stage: Stage,
    /// Items the stage processed (records, words, or token sets).
    pub items: usize,
    /// Wall-clock duration.
    pub elapsed: Duration,
}

/// Counters produced by subset generation and deduplication.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GenerationMetrics {
    /// Records inspected.
    pub records: usize,
    /// Records without a primary token; they contribute nothing.
    pub records_without_primary: usize,
    /// Records left out because they exceed the subset token cap.
    pub records_over_limit: usize,
    /// Raw subsets enumerated, `2^n - 1` per contributing record.
    pub candidate_subsets: u64,
    /// Subsets containing at least one primary token.
    pub kept_subsets: u64,
    /// Distinct token sets before deduplication.
    pub distinct_sets: usize,
    /// Token sets folded into another by deduplication.
    pub redundant_sets: usize,
    /// Resident set size sample captured from `/proc/self/status` on Linux.
    pub rss_kb: Option<usize>,
}

/// Metrics accumulated by a session.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PipelineMetrics {
    /// Stage timings in execution order.
    pub stages: Vec<StageMetrics>,
    /// Counters of the latest generation run.
    pub generation: Option<GenerationMetrics>,
}

impl PipelineMetrics {
    /// Appends a stage timing.
    pub fn record(&mut self, stage: Stage, items: usize, elapsed: Duration) {
        self.stages.push(StageMetrics {
            stage,
            items,
            elapsed,
        });
    }

    /// Most recent timing of `stage`.
    #[must_use]
    pub fn last(&self, stage: Stage) -> Option<&StageMetrics> {
        self.stages.iter().rev().find(|entry| entry.stage == stage)
    }

    /// Total time spent across all recorded stages.
    #[must_use]
    pub fn total(&self) -> Duration {
        self.stages.iter().map(|entry| entry.elapsed).sum()
    }
}

#[cfg(target_os = "linux")]
fn current_rss_kb() -> Option<usize> {
    use std::fs::File;
    use std::io::{BufRead, BufReader};

    let file = File::open("/proc/self/status").ok()?;
    for line in BufReader::new(file).lines().map_while(Result::ok) {
        if let Some(rest) = line.strip_prefix("VmRSS:") {
            let value = rest
                .split_whitespace()
                .find_map(|part| part.parse::<usize>().ok());
            return value;
        }
    }
    None
}

#[cfg(not(target_os = "linux"))]
fn current_rss_kb() -> Option<usize> {
    None
}

/// Samples the current resident set size (RSS) on supported platforms.
pub fn sample_rss_kb() -> Option<usize> {
    current_rss_kb()
}
