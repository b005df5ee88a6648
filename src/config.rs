//! Configuration builders controlling record ingest and the token-set pipeline.

use crate::error::{Result, TriploError};
use serde::{Deserialize, Serialize};

/// Group assigned to records whose table carries no `group` column.
pub const DEFAULT_GROUP: &str = "default_group";

/// Hard ceiling for [`PipelineConfig::max_subset_tokens`]; `2^24` subsets per record.
///
/// Generation keeps every subset key of a record in memory until it is folded into the
/// catalog, so a record at the ceiling transiently holds about 16.7M key strings. Smaller
/// records are batched up to about a million pending keys per parallel chunk.
pub const SUBSET_TOKEN_CEILING: usize = 24;

/// What subset generation does with a record above [`PipelineConfig::max_subset_tokens`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SubsetLimitPolicy {
    /// Leave the record out of the catalog and log a warning.
    #[default]
    Skip,
    /// Abort generation with [`TriploError::SubsetLimit`].
    Fail,
}

/// Configuration for tokenization batching and subset generation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PipelineConfig {
    /// Number of records tokenized per batch before control returns to the caller.
    pub batch_size: usize,
    /// Maximum number of distinct word/alias tokens enumerated for a single record.
    pub max_subset_tokens: usize,
    /// Handling of records above `max_subset_tokens`.
    pub subset_limit_policy: SubsetLimitPolicy,
    /// Enables per-stage logging through the `log` facade.
    pub show_progress: bool,
}

impl PipelineConfig {
    /// Returns a builder initialised with [`PipelineConfig::default`].
    #[must_use]
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::default()
    }

    /// Validates the invariants required by the pipeline.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(TriploError::InvalidConfig(
                "batch_size must be greater than zero".into(),
            ));
        }
        if self.max_subset_tokens == 0 {
            return Err(TriploError::InvalidConfig(
                "max_subset_tokens must be greater than zero".into(),
            ));
        }
        if self.max_subset_tokens > SUBSET_TOKEN_CEILING {
            return Err(TriploError::InvalidConfig(format!(
                "max_subset_tokens ({}) exceeds {SUBSET_TOKEN_CEILING}",
                self.max_subset_tokens
            )));
        }
        Ok(())
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: 256,
            max_subset_tokens: 16,
            subset_limit_policy: SubsetLimitPolicy::Skip,
            show_progress: true,
        }
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug, Default, Clone)]
pub struct PipelineBuilder {
    cfg: PipelineConfig,
}

impl PipelineBuilder {
    /// Creates a builder with [`PipelineConfig::default`] settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the tokenization batch size.
    #[must_use]
    pub fn batch_size(mut self, value: usize) -> Self {
        self.cfg.batch_size = value;
        self
    }

    /// Sets the per-record subset token cap.
    #[must_use]
    pub fn max_subset_tokens(mut self, value: usize) -> Self {
        self.cfg.max_subset_tokens = value;
        self
    }

    /// Chooses how records above the cap are handled.
    #[must_use]
    pub fn subset_limit_policy(mut self, policy: SubsetLimitPolicy) -> Self {
        self.cfg.subset_limit_policy = policy;
        self
    }

    /// Enables or disables per-stage logging.
    #[must_use]
    pub fn show_progress(mut self, enabled: bool) -> Self {
        self.cfg.show_progress = enabled;
        self
    }

    /// Finalises the builder, returning a validated [`PipelineConfig`].
    pub fn build(self) -> Result<PipelineConfig> {
        self.cfg.validate()?;
        Ok(self.cfg)
    }
}

/// Configuration controlling how tab-separated tables become records.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IngestConfig {
    /// Header name of the optional row identifier column.
    pub id_column: String,
    /// Header name of the optional group column.
    pub group_column: String,
    /// Group used when the table has no group column.
    pub default_group: String,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            id_column: "id".into(),
            group_column: "group".into(),
            default_group: DEFAULT_GROUP.into(),
        }
    }
}

impl IngestConfig {
    /// Returns a builder initialised with [`IngestConfig::default`].
    #[must_use]
    pub fn builder() -> IngestBuilder {
        IngestBuilder::default()
    }
}

/// Builder for [`IngestConfig`].
#[derive(Debug, Default, Clone)]
pub struct IngestBuilder {
    cfg: IngestConfig,
}

impl IngestBuilder {
    /// Creates a new builder with [`IngestConfig::default`] settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the header name of the row identifier column.
    #[must_use]
    pub fn id_column(mut self, name: impl Into<String>) -> Self {
        self.cfg.id_column = name.into();
        self
    }

    /// Overrides the header name of the group column.
    #[must_use]
    pub fn group_column(mut self, name: impl Into<String>) -> Self {
        self.cfg.group_column = name.into();
        self
    }

    /// Overrides the group assigned when no group column exists.
    #[must_use]
    pub fn default_group(mut self, group: impl Into<String>) -> Self {
        self.cfg.default_group = group.into();
        self
    }

    /// Finalises the builder, returning the [`IngestConfig`].
    pub fn build(self) -> IngestConfig {
        self.cfg
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_applies_overrides() {
        let cfg = PipelineConfig::builder()
            .batch_size(8)
            .max_subset_tokens(5)
            .subset_limit_policy(SubsetLimitPolicy::Fail)
            .show_progress(false)
            .build()
            .expect("config should be valid");
        assert_eq!(cfg.batch_size, 8);
        assert_eq!(cfg.max_subset_tokens, 5);
        assert_eq!(cfg.subset_limit_policy, SubsetLimitPolicy::Fail);
        assert!(!cfg.show_progress);
    }

    #[test]
    fn validate_rejects_zero_batch() {
        let cfg = PipelineConfig {
            batch_size: 0,
            ..PipelineConfig::default()
        };
        let err = cfg.validate().expect_err("validation should fail");
        assert!(matches!(
            err,
            TriploError::InvalidConfig(message) if message.contains("batch_size")
        ));
    }

    #[test]
    fn validate_rejects_cap_above_ceiling() {
        let err = PipelineConfig::builder()
            .max_subset_tokens(SUBSET_TOKEN_CEILING + 1)
            .build()
            .expect_err("cap above ceiling");
        assert!(matches!(err, TriploError::InvalidConfig(_)));
    }

    #[test]
    fn ingest_builder_overrides_defaults() {
        let cfg = IngestConfig::builder()
            .id_column("row")
            .group_column("label")
            .default_group("misc")
            .build();
        assert_eq!(cfg.id_column, "row");
        assert_eq!(cfg.group_column, "label");
        assert_eq!(cfg.default_group, "misc");
        assert_eq!(IngestConfig::default().default_group, DEFAULT_GROUP);
    }
}
