//! highlight-split - size-bounded highlighting and full-value tag reconciliation
//!
//! The first pass turns field values into fragments with every token tagged
//! and emission cut at a size budget. The second pass reads the highlighted
//! spans back out of those fragments and re-encodes the complete values.

// Entity and term primitives come first; the encoder builds on both
pub mod entity;
pub mod terms;
pub mod encoder;
pub mod tokens;
pub mod size;
pub mod query;
pub mod mapping;
pub mod cache;
pub mod reconcile;
pub mod highlight;
pub mod error;
pub mod config;
pub mod state;
pub mod routes;

pub use error::{FieldFailure, HighlightError};
pub use config::Config;
pub use state::AppState;
pub use routes::router;
pub use entity::{escape, unescape};
pub use terms::{TermDictionary, TermDictionaryBuilder, TermMatcher};
pub use encoder::{select_fragments, FragmentEncoder, SizeBudget, TagPair};
pub use tokens::{Analyzers, Token};
pub use size::parse_size_budget;
pub use query::{HighlightQuery, SpanTermExtractor};
pub use mapping::{FieldClass, FieldMapping, MappingRegistry, TypeMapping};
pub use cache::{CacheKey, ResultCache};
pub use reconcile::{convert, drill, spans_from_fragment, HighlightedSpans, Reconciler, SearchHit};
pub use highlight::{Document, DocumentHighlight, FieldOptions, Highlighter};
