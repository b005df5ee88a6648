//! Records and the tab-separated table ingest that produces them.

use std::fs;
use std::path::Path;

use crate::config::IngestConfig;
use crate::error::{Result, TriploError};
use crate::token::{RawToken, Token};

/// Position of a record in the input table, starting at zero with the first data row.
pub type RecordId = usize;

/// One input row together with the token streams derived from its text.
///
/// The source fields never change after ingest; only the derived streams are attached by the
/// tokenizer and the enrichment stage.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    text: String,
    row_id: Option<String>,
    group: String,
    raw_columns: Vec<String>,
    tokens: Vec<RawToken>,
    words: Vec<String>,
    word_tokens: Vec<Token>,
    enriched_tokens: Vec<Token>,
}

impl Record {
    /// Creates a record with no derived token streams.
    pub fn new(
        text: impl Into<String>,
        row_id: Option<String>,
        group: impl Into<String>,
        raw_columns: Vec<String>,
    ) -> Self {
        Self {
            text: text.into(),
            row_id,
            group: group.into(),
            raw_columns,
            tokens: Vec::new(),
            words: Vec::new(),
            word_tokens: Vec::new(),
            enriched_tokens: Vec::new(),
        }
    }

    /// Free text taken from the first column.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Value of the `id` column, if the table has one and the cell is non-empty.
    #[must_use]
    pub fn row_id(&self) -> Option<&str> {
        self.row_id.as_deref()
    }

    /// Value of the `group` column or the configured default group.
    #[must_use]
    pub fn group(&self) -> &str {
        &self.group
    }

    /// Every cell of the source row in column order.
    #[must_use]
    pub fn raw_columns(&self) -> &[String] {
        &self.raw_columns
    }

    /// Token stream produced by the tokenizer, with words still bare strings.
    #[must_use]
    pub fn tokens(&self) -> &[RawToken] {
        &self.tokens
    }

    /// Lowercase words in order of appearance, duplicates included.
    #[must_use]
    pub fn words(&self) -> &[String] {
        &self.words
    }

    /// Token stream with words mapped against the registry snapshot taken at enrichment.
    #[must_use]
    pub fn word_tokens(&self) -> &[Token] {
        &self.word_tokens
    }

    /// Token stream after alias substitution; empty until the enrichment stage ran.
    #[must_use]
    pub fn enriched_tokens(&self) -> &[Token] {
        &self.enriched_tokens
    }

    /// Portable reference used in training-set payloads: the row id, or `#<position>` when
    /// the row has none.
    #[must_use]
    pub fn label(&self, id: RecordId) -> String {
        match &self.row_id {
            Some(row_id) => row_id.clone(),
            None => format!("#{id}"),
        }
    }

    pub(crate) fn set_tokens(&mut self, tokens: Vec<RawToken>, words: Vec<String>) {
        self.tokens = tokens;
        self.words = words;
    }

    pub(crate) fn set_enriched(&mut self, word_tokens: Vec<Token>, enriched: Vec<Token>) {
        self.word_tokens = word_tokens;
        self.enriched_tokens = enriched;
    }
}

/// Reads a tab-separated table from disk and parses it with [`parse_records`].
pub fn load_records<P: AsRef<Path>>(path: P, cfg: &IngestConfig) -> Result<Vec<Record>> {
    let path = path.as_ref();
    let bytes = fs::read(path).map_err(|err| TriploError::io(err, Some(path.to_path_buf())))?;
    parse_records_bytes(&bytes, cfg)
}

/// Parses raw bytes, rejecting payloads that are not UTF-8 text.
pub fn parse_records_bytes(bytes: &[u8], cfg: &IngestConfig) -> Result<Vec<Record>> {
    let text = std::str::from_utf8(bytes).map_err(|err| {
        TriploError::InputType(format!(
            "expected UTF-8 text, invalid byte at offset {}",
            err.valid_up_to()
        ))
    })?;
    parse_records(text, cfg)
}

/// Parses a tab-separated table whose first line is the header.
///
/// Column 0 is always the free text. Header cells matching [`IngestConfig::id_column`] and
/// [`IngestConfig::group_column`] (case-insensitive) populate the row id and group.
pub fn parse_records(text: &str, cfg: &IngestConfig) -> Result<Vec<Record>> {
    let lines = text.lines().filter(|line| !line.trim().is_empty()).count();
    if lines < 2 {
        return Err(TriploError::InputShape(format!(
            "expected a header and at least one data row, found {lines} line(s)"
        )));
    }

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .quoting(false)
        .flexible(true)
        .has_headers(true)
        .from_reader(text.as_bytes());

    let headers = reader.headers()?.clone();
    let find_column = |name: &str| {
        headers
            .iter()
            .position(|header| header.trim().eq_ignore_ascii_case(name.trim()))
    };
    let id_column = find_column(&cfg.id_column).filter(|&idx| idx > 0);
    let group_column = find_column(&cfg.group_column).filter(|&idx| idx > 0);

    let mut records = Vec::new();
    for row in reader.records() {
        let row = row?;
        let raw_columns: Vec<String> = row.iter().map(str::to_owned).collect();
        let text = raw_columns.first().cloned().unwrap_or_default();
        let row_id = id_column
            .and_then(|idx| row.get(idx))
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_owned);
        let group = group_column
            .and_then(|idx| row.get(idx))
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .unwrap_or(&cfg.default_group)
            .to_owned();
        records.push(Record::new(text, row_id, group, raw_columns));
    }

    if records.is_empty() {
        return Err(TriploError::InputShape(
            "input table has a header but no data rows".into(),
        ));
    }
    Ok(records)
}
