//! Deterministic tokenization of record text into typed token streams.
//!
//! The pipeline runs five stages over one record's text: attribute extraction, tag
//! segmentation, normalization, classification, and word extraction. Mapping words onto the
//! registry happens later, in [`crate::enrich`], because it depends on alias state.

use std::borrow::Cow;

use crate::attributes::AttributeRegistry;
use crate::error::Result;
use crate::token::{AttributeId, AttributeToken, NumberToken, RawToken};

pub mod pass;
mod scanner;

pub use pass::{PassProgress, TokenizationPass, TokenizedCorpus, WordIndex};

/// Output of [`tokenize`] for a single text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenizedText {
    /// Ordered token stream; words are still bare strings.
    pub tokens: Vec<RawToken>,
    /// Every word of `tokens` in order, duplicates included.
    pub words: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Span<'a> {
    Text(Cow<'a, str>),
    Tag(&'a str),
    Placeholder { name: String, id: AttributeId },
}

/// Tokenizes one record's text.
///
/// The only state touched is `attributes`, which hands out ids for newly seen attribute
/// values. Given the same registry state the output is identical for identical input. The
/// only failure is an attribute name running out of ids.
pub fn tokenize(text: &str, attributes: &mut AttributeRegistry) -> Result<TokenizedText> {
    let lowered = text.to_lowercase();
    let mut extracted = Vec::new();

    let spans = extract_attributes(&lowered, attributes, &mut extracted)?;
    let spans = segment_tags(spans);
    let spans = normalize_text(spans);
    let tokens = classify(spans, &extracted);
    let words = extract_words(&tokens);
    Ok(TokenizedText { tokens, words })
}

fn extract_attributes<'a>(
    text: &'a str,
    registry: &mut AttributeRegistry,
    extracted: &mut Vec<AttributeToken>,
) -> Result<Vec<Span<'a>>> {
    scanner::split_attributes(text)
        .into_iter()
        .map(|piece| match piece {
            scanner::Piece::Text(text) => Ok(Span::Text(Cow::Borrowed(text))),
            scanner::Piece::Attribute { name, value } => {
                let name = name.trim();
                let value = value.trim();
                let id = registry.intern(name, value)?;
                extracted.push(AttributeToken {
                    name: name.to_owned(),
                    value: Some(value.to_owned()),
                    id,
                });
                Ok(Span::Placeholder {
                    name: name.to_owned(),
                    id,
                })
            }
        })
        .collect()
}

fn segment_tags(spans: Vec<Span<'_>>) -> Vec<Span<'_>> {
    let mut out = Vec::with_capacity(spans.len());
    for span in spans {
        match span {
            Span::Text(Cow::Borrowed(text)) => {
                out.extend(scanner::split_tags(text).into_iter().map(|segment| match segment {
                    scanner::Segment::Text(text) => Span::Text(Cow::Borrowed(text)),
                    scanner::Segment::Tag(tag) => Span::Tag(tag),
                }));
            }
            other => out.push(other),
        }
    }
    out
}

fn normalize_text(spans: Vec<Span<'_>>) -> Vec<Span<'_>> {
    spans
        .into_iter()
        .filter_map(|span| match span {
            Span::Text(text) => scanner::normalize(&text).map(|text| Span::Text(Cow::Owned(text))),
            other => Some(other),
        })
        .collect()
}

fn classify(spans: Vec<Span<'_>>, extracted: &[AttributeToken]) -> Vec<RawToken> {
    let mut tokens = Vec::new();
    for span in spans {
        match span {
            Span::Placeholder { name, id } => {
                let resolved = extracted
                    .iter()
                    .find(|att| att.name == name && att.id == id)
                    .cloned()
                    .unwrap_or(AttributeToken {
                        name,
                        value: None,
                        id,
                    });
                tokens.push(RawToken::Attribute(resolved));
            }
            Span::Tag(tag) => tokens.push(RawToken::Word(tag.to_owned())),
            Span::Text(text) => {
                for piece in text.split_whitespace() {
                    if scanner::is_number(piece) {
                        tokens.push(RawToken::Number(NumberToken {
                            value: piece.to_owned(),
                        }));
                    } else {
                        tokens.push(RawToken::Word(piece.to_owned()));
                    }
                }
            }
        }
    }
    tokens
}

fn extract_words(tokens: &[RawToken]) -> Vec<String> {
    tokens
        .iter()
        .filter_map(|token| match token {
            RawToken::Word(word) => Some(word.to_lowercase()),
            RawToken::Attribute(_) | RawToken::Number(_) => None,
        })
        .collect()
}
