//! Token-set training catalogs built from short tab-separated records.
//!
//! The crate exposes both a library API and a `triplo` command line interface. A working set
//! of records is tokenized into words, numbers, and attribute spans; words are counted into a
//! dictionary where an operator groups synonyms into aliases and flags primary words; every
//! record is then enriched with its aliases, and all primary-bearing subsets of its tokens are
//! enumerated into a deduplicated training catalog.
//!
//! ```no_run
//! use triplo::{PipelineConfig, Session};
//!
//! # fn main() -> triplo::Result<()> {
//! let cfg = PipelineConfig::builder()
//!     .batch_size(512)
//!     .show_progress(false)
//!     .build()?;
//! let mut session = Session::new(cfg)?;
//! session.load_path("records.tsv")?;
//! if let Some(id) = session.dictionary().word_id("apple") {
//!     session.set_primary(id, true);
//! }
//! session.generate_training_sets()?;
//! triplo::save_catalog_snapshot(&session.export_training_sets(), "catalog.json", true)?;
//! # Ok(())
//! # }
//! ```
//!
//! The CLI is enabled by default through the `cli` feature. Users targeting the library
//! portion only can disable default features to avoid the CLI dependencies:
//! `triplo = { version = "...", default-features = false }`.

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    clippy::all,
    rust_2018_idioms,
    future_incompatible,
    unused_lifetimes,
    unreachable_pub
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_panics_doc,
    clippy::missing_errors_doc,
    clippy::doc_markdown,
    clippy::multiple_crate_versions
)]

pub mod attributes;
pub mod catalog;
pub mod config;
pub mod dictionary;
pub mod enrich;
pub mod error;
pub mod metrics;
pub mod record;
pub mod serialization;
pub mod session;
pub mod subsets;
pub mod token;
pub mod tokenizer;

pub use attributes::AttributeRegistry;
pub use catalog::{canonical_key, Negatives, TokenSet, TrainingCatalog};
pub use config::{IngestConfig, PipelineBuilder, PipelineConfig, SubsetLimitPolicy};
pub use dictionary::{AliasInfo, ImportReport, RegistryWarning, WordRegistry, WordRow};
pub use enrich::EnrichStats;
pub use error::{Result, TriploError};
pub use metrics::{GenerationMetrics, PipelineMetrics, Stage};
pub use record::{Record, RecordId};
pub use serialization::{
    load_alias_snapshot, load_catalog_snapshot, save_alias_snapshot, save_catalog_snapshot,
    AliasSnapshot, CatalogSnapshot,
};
pub use session::Session;
pub use token::{AliasId, AliasToken, RawToken, ResolvedId, Token, WordId};
pub use tokenizer::{tokenize, TokenizationPass};
