//! Token types flowing between the tokenizer, enrichment, and subset generation.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Dictionary identifier of a distinct lowercase word, assigned in first-seen order.
pub type WordId = u32;
/// Identifier of an attribute value, unique within its attribute name.
pub type AttributeId = u32;

/// Opaque identifier of an alias group, rendered as `alias:<label>:<counter>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AliasId(String);

impl AliasId {
    const PREFIX: &'static str = "alias";

    /// Builds the identifier for an alias created from `label` at counter value `counter`.
    ///
    /// The label is reduced to the characters a word may contain so the identifier can never
    /// collide with a word or contain the canonical key separator.
    #[must_use]
    pub fn from_label(label: &str, counter: usize) -> Self {
        let slug: String = label
            .trim()
            .to_lowercase()
            .chars()
            .map(|ch| if ch.is_alphanumeric() { ch } else { '_' })
            .collect();
        let slug = if slug.is_empty() { "group".into() } else { slug };
        Self(format!("{}:{slug}:{counter}", Self::PREFIX))
    }

    /// Wraps an identifier taken verbatim from an imported payload.
    #[must_use]
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parses the trailing run of ASCII digits, if any.
    #[must_use]
    pub fn numeric_suffix(&self) -> Option<usize> {
        let digits = self
            .0
            .bytes()
            .rev()
            .take_while(u8::is_ascii_digit)
            .count();
        if digits == 0 {
            return None;
        }
        self.0[self.0.len() - digits..].parse().ok()
    }
}

impl fmt::Display for AliasId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What a word resolves to in the registry at mapping time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResolvedId {
    /// The word belongs to an enabled alias.
    Alias(AliasId),
    /// The word's own dictionary id.
    Word(WordId),
}

/// Attribute span `[att:NAME]VALUE[/att]` extracted from record text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeToken {
    /// Trimmed attribute name.
    pub name: String,
    /// Trimmed attribute value; `None` when a placeholder could not be resolved.
    pub value: Option<String>,
    /// Identifier unique within `name`.
    pub id: AttributeId,
}

/// Integer or decimal kept in its source form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NumberToken {
    /// Source text of the number.
    pub value: String,
}

/// A single lowercase word.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WordToken {
    /// Lowercase word.
    pub word: String,
    /// Alias id, own dictionary id, or `None` when the word is unknown to the registry.
    pub resolved_id: Option<ResolvedId>,
    /// Occurrences of the word across all records.
    #[serde(default)]
    pub count: usize,
    /// Whether the word is flagged as primary.
    #[serde(default)]
    pub is_primary: bool,
}

/// Snapshot of an alias group substituted into enriched token streams.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AliasToken {
    /// Alias identifier.
    pub alias_id: AliasId,
    /// Member words.
    pub words: BTreeSet<String>,
    /// Summed occurrences of the enabled member words.
    pub count: usize,
    /// Whether the alias is enabled.
    pub enabled: bool,
    /// Whether the alias is flagged as primary.
    pub is_primary: bool,
}

/// Token of a mapped or enriched stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Token {
    /// Attribute span.
    Attribute(AttributeToken),
    /// Numeric literal.
    Number(NumberToken),
    /// Dictionary word.
    Word(WordToken),
    /// Alias group, shared by every record that contains it.
    Alias(Arc<AliasToken>),
}

impl Token {
    /// Identifier used in canonical subset keys: the word, or the alias id.
    ///
    /// Attributes and numbers never take part in subsets and return `None`.
    #[must_use]
    pub fn identifier(&self) -> Option<&str> {
        match self {
            Token::Word(word) => Some(&word.word),
            Token::Alias(alias) => Some(alias.alias_id.as_str()),
            Token::Attribute(_) | Token::Number(_) => None,
        }
    }

    /// Whether the token carries the primary flag.
    #[must_use]
    pub fn is_primary(&self) -> bool {
        match self {
            Token::Word(word) => word.is_primary,
            Token::Alias(alias) => alias.is_primary,
            Token::Attribute(_) | Token::Number(_) => false,
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Attribute(att) => match &att.value {
                Some(value) => write!(f, "[{}={}#{}]", att.name, value, att.id),
                None => write!(f, "[{}=?#{}]", att.name, att.id),
            },
            Token::Number(num) => f.write_str(&num.value),
            Token::Word(word) => f.write_str(&word.word),
            Token::Alias(alias) => {
                let words: Vec<&str> = alias.words.iter().map(String::as_str).collect();
                write!(f, "{}{{{}}}", alias.alias_id, words.join(","))
            }
        }
    }
}

/// Token produced by the tokenizer before words are mapped against the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "token", rename_all = "snake_case")]
pub enum RawToken {
    /// Attribute span.
    Attribute(AttributeToken),
    /// Numeric literal.
    Number(NumberToken),
    /// Bare lowercase word.
    Word(String),
}
