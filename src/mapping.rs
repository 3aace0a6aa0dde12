//! Field mappings per `(index, type)`

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Field names longer than this are never picked up for highlighting.
const MAX_FIELD_LENGTH: usize = 50;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FieldMapping {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub field_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<String>,
    #[serde(default, alias = "analyze", skip_serializing_if = "Option::is_none")]
    pub analyzer: Option<String>,
    #[serde(default)]
    pub store: bool,
}

/// How the reconciler treats a field's value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldClass {
    /// Whole value compared against the highlighted set.
    NotAnalyzed,
    /// Tokenized and encoded token by token.
    Analyzed,
    /// Passed through untouched.
    Unchanged,
}

impl FieldMapping {
    pub fn is_text(&self) -> bool {
        matches!(self.field_type.as_deref(), Some("string") | Some("text"))
    }

    pub fn class(&self) -> FieldClass {
        if self.index.as_deref() == Some("not_analyzed") {
            FieldClass::NotAnalyzed
        } else if self.is_text() {
            FieldClass::Analyzed
        } else {
            FieldClass::Unchanged
        }
    }

    pub fn is_tokenized(&self) -> bool {
        self.class() == FieldClass::Analyzed
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TypeMapping {
    #[serde(default)]
    pub properties: BTreeMap<String, FieldMapping>,
}

impl TypeMapping {
    pub fn field(&self, name: &str) -> Option<&FieldMapping> {
        self.properties.get(name)
    }

    /// Text fields with short, plain names (letters, digits, `_`, `-`).
    pub fn highlightable_fields(&self) -> Vec<String> {
        self.properties
            .iter()
            .filter(|(name, mapping)| {
                mapping.is_text()
                    && name.chars().count() <= MAX_FIELD_LENGTH
                    && is_plain_field_name(name)
            })
            .map(|(name, _)| name.clone())
            .collect()
    }
}

fn is_plain_field_name(name: &str) -> bool {
    name.chars()
        .all(|c| c.is_alphanumeric() || c == '_' || c == '-')
}

/// Mappings of every known `(index, type)` pair.
#[derive(Debug, Clone, Default)]
pub struct MappingRegistry {
    types: HashMap<(String, String), TypeMapping>,
}

impl MappingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a registry from `{index: {type: mapping}}`.
    pub fn from_nested(nested: HashMap<String, HashMap<String, TypeMapping>>) -> Self {
        let mut registry = Self::new();
        for (index, types) in nested {
            for (doc_type, mapping) in types {
                registry.put(&index, &doc_type, mapping);
            }
        }
        registry
    }

    pub fn put(&mut self, index: &str, doc_type: &str, mapping: TypeMapping) -> Option<TypeMapping> {
        self.types
            .insert((index.to_string(), doc_type.to_string()), mapping)
    }

    pub fn get(&self, index: &str, doc_type: &str) -> Option<&TypeMapping> {
        self.types.get(&(index.to_string(), doc_type.to_string()))
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}
