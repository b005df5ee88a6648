//! Alias table payload: `aliasId → { aliasId, words, count, enabled, isPrimary }`.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TriploError};
use crate::token::AliasId;

/// Alias table keyed by alias id.
pub type AliasSnapshot = BTreeMap<String, AliasEntry>;

/// One alias group in the exchange format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AliasEntry {
    /// Alias identifier; the map key takes precedence on import.
    pub alias_id: AliasId,
    /// Member words.
    pub words: Vec<String>,
    /// Summed occurrences of enabled members; recomputed on import.
    #[serde(default)]
    pub count: usize,
    /// Whether the alias is enabled.
    pub enabled: bool,
    /// Whether the alias is flagged as primary.
    pub is_primary: bool,
}

/// Serialises an alias table to JSON.
pub fn alias_snapshot_json(snapshot: &AliasSnapshot, pretty: bool) -> Result<String> {
    let json = if pretty {
        serde_json::to_string_pretty(snapshot)?
    } else {
        serde_json::to_string(snapshot)?
    };
    Ok(json)
}

/// Parses an alias table, reporting malformed payloads as [`TriploError::ImportParse`].
pub fn parse_alias_snapshot(json: &str) -> Result<AliasSnapshot> {
    serde_json::from_str(json).map_err(TriploError::import)
}

/// Writes an alias table to `path`.
pub fn save_alias_snapshot<P: AsRef<Path>>(
    snapshot: &AliasSnapshot,
    path: P,
    pretty: bool,
) -> Result<()> {
    let json = alias_snapshot_json(snapshot, pretty)?;
    fs::write(path.as_ref(), json)
        .map_err(|err| TriploError::io(err, Some(path.as_ref().to_path_buf())))
}

/// Reads an alias table from `path`.
pub fn load_alias_snapshot<P: AsRef<Path>>(path: P) -> Result<AliasSnapshot> {
    let json = fs::read_to_string(path.as_ref())
        .map_err(|err| TriploError::io(err, Some(path.as_ref().to_path_buf())))?;
    parse_alias_snapshot(&json)
}
