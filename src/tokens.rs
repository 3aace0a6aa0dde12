//! Token spans and the analyzer registry that produces them

use crate::error::{HighlightError, Result};
use serde::{Deserialize, Serialize};
use tantivy::tokenizer::{TextAnalyzer, TokenStream, TokenizerManager};

/// Analyzer used when a field mapping names none.
pub const DEFAULT_ANALYZER: &str = "default";

/// A half-open byte span `[start, end)` over the decoded field text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub start: usize,
    pub end: usize,
    pub position: usize,
}

impl Token {
    pub fn new(start: usize, end: usize, position: usize) -> Self {
        Self {
            start,
            end,
            position,
        }
    }

    pub fn surface<'a>(&self, text: &'a str) -> Option<&'a str> {
        text.get(self.start..self.end)
    }
}

/// Named analyzers backed by tantivy's tokenizer manager.
///
/// Ships with tantivy's built-ins (`default`, `raw`, `whitespace`,
/// `en_stem`) plus `standard` as an alias of `default`.
pub struct Analyzers {
    manager: TokenizerManager,
}

impl Default for Analyzers {
    fn default() -> Self {
        Self::new()
    }
}

impl Analyzers {
    pub fn new() -> Self {
        let manager = TokenizerManager::default();
        if let Some(standard) = manager.get(DEFAULT_ANALYZER) {
            manager.register("standard", standard);
        }
        Self { manager }
    }

    pub fn register<T>(&self, name: &str, analyzer: T)
    where
        TextAnalyzer: From<T>,
    {
        self.manager.register(name, analyzer);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.manager.get(name).is_some()
    }

    /// Looks up `name`, or the default analyzer when the mapping names none.
    pub fn resolve(&self, field: &str, name: Option<&str>) -> Result<TextAnalyzer> {
        let name = name.filter(|n| !n.is_empty()).unwrap_or(DEFAULT_ANALYZER);
        self.manager
            .get(name)
            .ok_or_else(|| HighlightError::UnknownAnalyzer {
                field: field.to_string(),
                name: name.to_string(),
            })
    }
}

/// Analyzed term of a value, in stream order.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalyzedToken {
    pub span: Token,
    pub term: String,
}

/// Runs `analyzer` over `text` and validates the resulting offsets.
pub fn analyze(analyzer: &mut TextAnalyzer, text: &str) -> Result<Vec<AnalyzedToken>> {
    let mut analyzed = Vec::new();
    let mut stream = analyzer.token_stream(text);
    while stream.advance() {
        let token = stream.token();
        analyzed.push(AnalyzedToken {
            span: Token::new(token.offset_from, token.offset_to, token.position),
            term: token.text.clone(),
        });
    }
    let spans: Vec<Token> = analyzed.iter().map(|t| t.span).collect();
    validate(text, &spans)?;
    Ok(analyzed)
}

/// Token spans of `text`, validated for the fragment encoder.
pub fn tokenize(analyzer: &mut TextAnalyzer, text: &str) -> Result<Vec<Token>> {
    Ok(analyze(analyzer, text)?
        .into_iter()
        .map(|t| t.span)
        .collect())
}

/// Spans must sit on char boundaries inside `text`, ascending and non-overlapping.
pub fn validate(text: &str, tokens: &[Token]) -> Result<()> {
    let mut cursor = 0;
    for token in tokens {
        if token.start > token.end || token.end > text.len() {
            return Err(HighlightError::TokenStream(format!(
                "token [{}, {}) outside text of length {}",
                token.start,
                token.end,
                text.len()
            )));
        }
        if !text.is_char_boundary(token.start) || !text.is_char_boundary(token.end) {
            return Err(HighlightError::TokenStream(format!(
                "token [{}, {}) splits a character",
                token.start, token.end
            )));
        }
        if token.start < cursor {
            return Err(HighlightError::TokenStream(format!(
                "token [{}, {}) overlaps the previous token ending at {}",
                token.start, token.end, cursor
            )));
        }
        cursor = token.end;
    }
    Ok(())
}
