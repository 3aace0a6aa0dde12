//! Error types for highlight-split

use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum HighlightError {
    #[error("Invalid size value: {0}")]
    InvalidSize(String),

    #[error("No analyzer [{name}] found for field [{field}]")]
    UnknownAnalyzer { field: String, name: String },

    #[error("Token stream error: {0}")]
    TokenStream(String),

    #[error("No mapping for [{index}/{doc_type}]")]
    MissingMapping { index: String, doc_type: String },

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Failed to highlight field [{field}]: {source}")]
    Field {
        field: String,
        #[source]
        source: Box<HighlightError>,
    },

    #[error("{0}")]
    Other(String),
}

impl HighlightError {
    /// Wraps this error as a failure of one field's highlight.
    pub fn for_field(self, field: &str) -> Self {
        match self {
            HighlightError::Field { .. } => self,
            other => HighlightError::Field {
                field: field.to_string(),
                source: Box::new(other),
            },
        }
    }

    /// Configuration errors abort the field; token stream errors only degrade it.
    pub fn is_config(&self) -> bool {
        match self {
            HighlightError::InvalidSize(_)
            | HighlightError::UnknownAnalyzer { .. }
            | HighlightError::InvalidQuery(_)
            | HighlightError::Config(_) => true,
            HighlightError::Field { source, .. } => source.is_config(),
            _ => false,
        }
    }
}

impl Serialize for HighlightError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

pub type Result<T> = std::result::Result<T, HighlightError>;

/// A field whose highlight failed while the rest of the document went through.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FieldFailure {
    pub id: String,
    pub field: String,
    pub reason: String,
}

impl FieldFailure {
    pub fn new(id: &str, field: &str, error: &HighlightError) -> Self {
        Self {
            id: id.to_string(),
            field: field.to_string(),
            reason: error.to_string(),
        }
    }
}
