//! Attribute registry assigning stable ids to `(name, value)` pairs.

use rustc_hash::FxHashMap;

use crate::error::{Result, TriploError};
use crate::token::AttributeId;

/// Assigns ids per attribute name, starting at zero, in first-seen order of values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttributeRegistry {
    names: FxHashMap<String, FxHashMap<String, AttributeId>>,
}

impl AttributeRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the id of `(name, value)`, assigning the next id for `name` on first occurrence.
    ///
    /// Fails with [`TriploError::Internal`] once a name has used up the id space.
    pub fn intern(&mut self, name: &str, value: &str) -> Result<AttributeId> {
        let values = self.names.entry(name.to_owned()).or_default();
        if let Some(&id) = values.get(value) {
            return Ok(id);
        }
        let id = next_id(name, values.len())?;
        values.insert(value.to_owned(), id);
        Ok(id)
    }

    /// Looks up an id without assigning one.
    #[must_use]
    pub fn get(&self, name: &str, value: &str) -> Option<AttributeId> {
        self.names.get(name)?.get(value).copied()
    }

    /// Number of distinct values registered under `name`.
    #[must_use]
    pub fn value_count(&self, name: &str) -> usize {
        self.names.get(name).map_or(0, |values| values.len())
    }

    /// Number of distinct attribute names.
    #[must_use]
    pub fn name_count(&self) -> usize {
        self.names.len()
    }
}

fn next_id(name: &str, assigned: usize) -> Result<AttributeId> {
    AttributeId::try_from(assigned).map_err(|_| {
        TriploError::Internal(format!("attribute {name:?} exceeds u32::MAX distinct values"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_scoped_per_name() {
        let mut registry = AttributeRegistry::new();
        assert_eq!(registry.intern("color", "red").unwrap(), 0);
        assert_eq!(registry.intern("color", "blue").unwrap(), 1);
        assert_eq!(registry.intern("size", "xl").unwrap(), 0);
        assert_eq!(registry.intern("color", "red").unwrap(), 0);
        assert_eq!(registry.get("color", "blue"), Some(1));
        assert_eq!(registry.get("size", "s"), None);
        assert_eq!(registry.value_count("color"), 2);
        assert_eq!(registry.name_count(), 2);
    }

    #[test]
    fn exhausted_id_space_is_an_error() {
        assert_eq!(next_id("color", 7).unwrap(), 7);
        assert_eq!(next_id("color", u32::MAX as usize).unwrap(), u32::MAX);
        if let Some(past) = (u32::MAX as usize).checked_add(1) {
            let err = next_id("color", past).expect_err("id space exhausted");
            assert!(matches!(err, TriploError::Internal(message) if message.contains("color")));
        }
    }
}
