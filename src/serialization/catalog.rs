//! Training-set payload: canonical key → token set, with records referenced by row label.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::catalog::Negatives;
use crate::error::{Result, TriploError};
use crate::token::Token;

/// Training-set catalog keyed by canonical subset key.
pub type CatalogSnapshot = BTreeMap<String, TokenSetEntry>;

/// One token set in the exchange format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenSetEntry {
    /// Member tokens in canonical order.
    pub tokens: Vec<Token>,
    /// Operator label.
    #[serde(default)]
    pub query: String,
    /// Number of contributing records.
    pub count: usize,
    /// Whether the set equals the full token set of a contributing record.
    pub is_leaf: bool,
    /// Keys folded into this set by deduplication.
    #[serde(default)]
    pub redundant_keys: Vec<String>,
    /// Reserved negative-example slots.
    #[serde(default)]
    pub negatives: Negatives,
    /// Row ids of contributing records, or `#<position>` when a row has no id.
    #[serde(default)]
    pub records: Vec<String>,
}

/// Serialises a catalog to JSON.
pub fn catalog_snapshot_json(snapshot: &CatalogSnapshot, pretty: bool) -> Result<String> {
    let json = if pretty {
        serde_json::to_string_pretty(snapshot)?
    } else {
        serde_json::to_string(snapshot)?
    };
    Ok(json)
}

/// Parses a catalog, reporting malformed payloads as [`TriploError::ImportParse`].
pub fn parse_catalog_snapshot(json: &str) -> Result<CatalogSnapshot> {
    serde_json::from_str(json).map_err(TriploError::import)
}

/// Writes a catalog to `path`.
pub fn save_catalog_snapshot<P: AsRef<Path>>(
    snapshot: &CatalogSnapshot,
    path: P,
    pretty: bool,
) -> Result<()> {
    let json = catalog_snapshot_json(snapshot, pretty)?;
    fs::write(path.as_ref(), json)
        .map_err(|err| TriploError::io(err, Some(path.as_ref().to_path_buf())))
}

/// Reads a catalog from `path`.
pub fn load_catalog_snapshot<P: AsRef<Path>>(path: P) -> Result<CatalogSnapshot> {
    let json = fs::read_to_string(path.as_ref())
        .map_err(|err| TriploError::io(err, Some(path.as_ref().to_path_buf())))?;
    parse_catalog_snapshot(&json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::{ResolvedId, WordToken};
    use serde_json::Value;

    #[test]
    fn entry_serializes_tagged_tokens() {
        let entry = TokenSetEntry {
            tokens: vec![Token::Word(WordToken {
                word: "apple".into(),
                resolved_id: Some(ResolvedId::Word(2)),
                count: 5,
                is_primary: true,
            })],
            query: String::new(),
            count: 1,
            is_leaf: true,
            redundant_keys: vec!["apple|red".into()],
            negatives: Negatives::default(),
            records: vec!["r1".into()],
        };
        let snapshot = CatalogSnapshot::from([("apple".to_owned(), entry)]);
        let json = catalog_snapshot_json(&snapshot, false).expect("serialize");
        let value: Value = serde_json::from_str(&json).expect("valid json");
        let token = &value["apple"]["tokens"][0];
        assert_eq!(token["type"], "word");
        assert_eq!(token["resolvedId"], 2);
        assert_eq!(value["apple"]["isLeaf"], true);
        assert_eq!(value["apple"]["negatives"]["easy"], Value::Array(Vec::new()));
        assert_eq!(parse_catalog_snapshot(&json).expect("parse"), snapshot);
    }

    #[test]
    fn malformed_catalog_is_import_error() {
        let err = parse_catalog_snapshot(r#"{"k": {"tokens": "nope"}}"#).expect_err("malformed");
        assert!(matches!(err, TriploError::ImportParse(_)));
    }
}
