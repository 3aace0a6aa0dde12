//! Highlight queries and weighted span-term extraction

use crate::error::{HighlightError, Result};
use crate::tokens::AnalyzedToken;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tantivy::tokenizer::{TextAnalyzer, TokenStream};

fn default_boost() -> f32 {
    1.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HighlightQuery {
    Term {
        field: String,
        value: String,
        #[serde(default = "default_boost")]
        boost: f32,
    },
    Match {
        field: String,
        query: String,
        #[serde(default = "default_boost")]
        boost: f32,
    },
    Phrase {
        field: String,
        query: String,
        #[serde(default = "default_boost")]
        boost: f32,
    },
    QueryString {
        query: String,
        #[serde(default)]
        fields: Vec<String>,
        #[serde(default = "default_boost")]
        boost: f32,
    },
    Bool {
        #[serde(default)]
        must: Vec<HighlightQuery>,
        #[serde(default)]
        should: Vec<HighlightQuery>,
        #[serde(default)]
        must_not: Vec<HighlightQuery>,
        #[serde(default)]
        filter: Vec<HighlightQuery>,
        #[serde(default = "default_boost")]
        boost: f32,
    },
    FunctionScore {
        query: Box<HighlightQuery>,
        #[serde(default = "default_boost")]
        boost: f32,
    },
    Filtered {
        query: Box<HighlightQuery>,
        #[serde(default)]
        filter: Option<Box<HighlightQuery>>,
    },
    MatchAll {},
}

/// One clause of a `query_string` expression.
#[derive(Debug, Clone, PartialEq)]
enum Clause {
    Word { field: Option<String>, text: String, prohibited: bool },
    Phrase { field: Option<String>, text: String, prohibited: bool },
}

/// Splits a query string into clauses: `field:term`, `+term`, `-term`,
/// `"quoted phrases"`, with `AND`/`OR` dropped and `NOT` negating the next clause.
fn parse_query_string(query: &str) -> Result<Vec<Clause>> {
    let mut clauses = Vec::new();
    let mut chars = query.chars().peekable();
    let mut negate_next = false;

    loop {
        while chars.next_if(|c| c.is_whitespace()).is_some() {}
        let Some(&first) = chars.peek() else {
            break;
        };

        let mut prohibited = negate_next;
        negate_next = false;
        if first == '+' || first == '-' {
            prohibited |= first == '-';
            chars.next();
        }

        let mut field = None;
        let mut word = String::new();
        loop {
            match chars.peek() {
                None => break,
                Some(c) if c.is_whitespace() => break,
                Some('"') => break,
                Some(':') if field.is_none() && !word.is_empty() => {
                    chars.next();
                    field = Some(std::mem::take(&mut word));
                }
                Some(&c) => {
                    word.push(c);
                    chars.next();
                }
            }
        }

        if word.is_empty() && chars.peek() == Some(&'"') {
            chars.next();
            let mut phrase = String::new();
            let mut closed = false;
            for c in chars.by_ref() {
                if c == '"' {
                    closed = true;
                    break;
                }
                phrase.push(c);
            }
            if !closed {
                return Err(HighlightError::InvalidQuery(format!(
                    "unterminated phrase in [{query}]"
                )));
            }
            clauses.push(Clause::Phrase { field, text: phrase, prohibited });
            continue;
        }

        match word.as_str() {
            "" => {}
            "AND" | "OR" if field.is_none() => {}
            "NOT" if field.is_none() => negate_next = true,
            _ => clauses.push(Clause::Word { field, text: word, prohibited }),
        }
    }

    Ok(clauses)
}

/// Collects the terms of a query that apply to one field value, with weights.
///
/// Wrappers (`function_score`, `filtered`) are unwrapped to their inner query.
/// Prohibited and filter clauses contribute nothing. Phrase clauses only
/// contribute when the phrase occurs in the value's analyzed tokens.
pub struct SpanTermExtractor<'a> {
    field: &'a str,
    analyzer: TextAnalyzer,
    value_terms: Vec<&'a str>,
}

impl<'a> SpanTermExtractor<'a> {
    pub fn new(field: &'a str, analyzer: TextAnalyzer, value_tokens: &'a [AnalyzedToken]) -> Self {
        Self {
            field,
            analyzer,
            value_terms: value_tokens.iter().map(|t| t.term.as_str()).collect(),
        }
    }

    pub fn extract(&mut self, query: &HighlightQuery) -> Result<HashMap<String, f32>> {
        let mut terms = HashMap::new();
        self.walk(query, 1.0, &mut terms)?;
        Ok(terms)
    }

    fn walk(&mut self, query: &HighlightQuery, weight: f32, terms: &mut HashMap<String, f32>) -> Result<()> {
        match query {
            HighlightQuery::Term { field, value, boost } => {
                if field == self.field {
                    insert(terms, value.clone(), weight * boost);
                }
            }
            HighlightQuery::Match { field, query, boost } => {
                if field == self.field {
                    for term in self.analyze(query) {
                        insert(terms, term, weight * boost);
                    }
                }
            }
            HighlightQuery::Phrase { field, query, boost } => {
                if field == self.field {
                    self.add_phrase(query, weight * boost, terms);
                }
            }
            HighlightQuery::QueryString { query, fields, boost } => {
                let applies = fields.is_empty() || fields.iter().any(|f| f == self.field);
                for clause in parse_query_string(query)? {
                    self.add_clause(&clause, applies, weight * boost, terms);
                }
            }
            HighlightQuery::Bool { must, should, boost, .. } => {
                for clause in must.iter().chain(should) {
                    self.walk(clause, weight * boost, terms)?;
                }
            }
            HighlightQuery::FunctionScore { query, boost } => {
                self.walk(query, weight * boost, terms)?;
            }
            HighlightQuery::Filtered { query, .. } => {
                self.walk(query, weight, terms)?;
            }
            HighlightQuery::MatchAll {} => {}
        }
        Ok(())
    }

    fn add_clause(&mut self, clause: &Clause, applies: bool, weight: f32, terms: &mut HashMap<String, f32>) {
        let (field, text, prohibited, phrase) = match clause {
            Clause::Word { field, text, prohibited } => (field, text, *prohibited, false),
            Clause::Phrase { field, text, prohibited } => (field, text, *prohibited, true),
        };
        if prohibited {
            return;
        }
        let targeted = match field {
            Some(f) => f == self.field,
            None => applies,
        };
        if !targeted {
            return;
        }
        if phrase {
            self.add_phrase(text, weight, terms);
        } else {
            for term in self.analyze(text) {
                insert(terms, term, weight);
            }
        }
    }

    fn add_phrase(&mut self, text: &str, weight: f32, terms: &mut HashMap<String, f32>) {
        let phrase = self.analyze(text);
        if phrase.is_empty() || !self.contains_phrase(&phrase) {
            return;
        }
        for term in phrase {
            insert(terms, term, weight);
        }
    }

    fn contains_phrase(&self, phrase: &[String]) -> bool {
        if phrase.len() > self.value_terms.len() {
            return false;
        }
        self.value_terms
            .windows(phrase.len())
            .any(|window| window.iter().zip(phrase).all(|(a, b)| *a == b.as_str()))
    }

    fn analyze(&mut self, text: &str) -> Vec<String> {
        let mut out = Vec::new();
        let mut stream = self.analyzer.token_stream(text);
        while stream.advance() {
            out.push(stream.token().text.clone());
        }
        out
    }
}

fn insert(terms: &mut HashMap<String, f32>, term: String, weight: f32) {
    let entry = terms.entry(term).or_insert(weight);
    if weight > *entry {
        *entry = weight;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokens::{analyze, Analyzers};

    fn extract(query: serde_json::Value, field: &str, value: &str) -> HashMap<String, f32> {
        let query: HighlightQuery = serde_json::from_value(query).unwrap();
        let analyzers = Analyzers::new();
        let mut analyzer = analyzers.resolve(field, None).unwrap();
        let tokens = analyze(&mut analyzer, value).unwrap();
        let mut extractor = SpanTermExtractor::new(field, analyzer, &tokens);
        extractor.extract(&query).unwrap()
    }

    fn keys(terms: &HashMap<String, f32>) -> Vec<&str> {
        let mut keys: Vec<&str> = terms.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }

    #[test]
    fn match_query_is_analyzed() {
        let terms = extract(
            serde_json::json!({"match": {"field": "body", "query": "Quick FOX"}}),
            "body",
            "anything",
        );
        assert_eq!(keys(&terms), vec!["fox", "quick"]);
    }

    #[test]
    fn other_fields_are_ignored() {
        let terms = extract(
            serde_json::json!({"term": {"field": "host", "value": "fox"}}),
            "body",
            "fox",
        );
        assert!(terms.is_empty());
    }

    #[test]
    fn wrappers_are_unwrapped_and_boosts_multiply() {
        let terms = extract(
            serde_json::json!({
                "function_score": {
                    "boost": 2.0,
                    "query": {"filtered": {
                        "query": {"term": {"field": "body", "value": "error", "boost": 1.5}},
                        "filter": {"term": {"field": "body", "value": "ignored"}}
                    }}
                }
            }),
            "body",
            "error",
        );
        assert_eq!(keys(&terms), vec!["error"]);
        assert_eq!(terms["error"], 3.0);
    }

    #[test]
    fn bool_skips_prohibited_and_filter_clauses() {
        let terms = extract(
            serde_json::json!({"bool": {
                "must": [{"term": {"field": "body", "value": "a"}}],
                "should": [{"term": {"field": "body", "value": "b", "boost": 4.0}},
                           {"term": {"field": "body", "value": "a", "boost": 2.0}}],
                "must_not": [{"term": {"field": "body", "value": "c"}}],
                "filter": [{"term": {"field": "body", "value": "d"}}]
            }}),
            "body",
            "",
        );
        assert_eq!(keys(&terms), vec!["a", "b"]);
        assert_eq!(terms["a"], 2.0);
    }

    #[test]
    fn phrases_need_to_occur_in_the_value() {
        let phrase = serde_json::json!({"phrase": {"field": "body", "query": "connection refused"}});
        let hit = extract(phrase.clone(), "body", "error: Connection refused by peer");
        assert_eq!(keys(&hit), vec!["connection", "refused"]);
        let miss = extract(phrase, "body", "refused connection");
        assert!(miss.is_empty());
    }

    #[test]
    fn query_string_clauses() {
        let terms = extract(
            serde_json::json!({"query_string": {
                "query": "timeout AND host:web1 -debug NOT trace +\"disk full\" body:Panic"
            }}),
            "body",
            "the disk full panic",
        );
        assert_eq!(keys(&terms), vec!["disk", "full", "panic", "timeout"]);
    }

    #[test]
    fn query_string_respects_field_list() {
        let terms = extract(
            serde_json::json!({"query_string": {"query": "fox body:dog", "fields": ["host"]}}),
            "body",
            "",
        );
        assert_eq!(keys(&terms), vec!["dog"]);
    }

    #[test]
    fn unterminated_phrase_is_invalid() {
        assert!(matches!(
            parse_query_string("\"open phrase"),
            Err(HighlightError::InvalidQuery(_))
        ));
    }

    #[test]
    fn match_all_extracts_nothing() {
        assert!(extract(serde_json::json!({"match_all": {}}), "body", "x").is_empty());
    }
}
