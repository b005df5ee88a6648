//! JSON exchange payloads for alias tables and training-set catalogs.

pub mod aliases;
pub mod catalog;

pub use aliases::{
    alias_snapshot_json, load_alias_snapshot, parse_alias_snapshot, save_alias_snapshot,
    AliasEntry, AliasSnapshot,
};
pub use catalog::{
    catalog_snapshot_json, load_catalog_snapshot, parse_catalog_snapshot, save_catalog_snapshot,
    CatalogSnapshot, TokenSetEntry,
};
