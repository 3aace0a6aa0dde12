//! Sorted term dictionary used to classify tokens as highlighted

use std::borrow::Cow;
use std::collections::HashMap;

/// Decides whether a token's surface form gets the caller's highlight tag.
pub trait TermMatcher {
    fn is_match(&self, surface: &str) -> bool;
}

#[derive(Debug, Default)]
pub struct TermDictionaryBuilder {
    terms: Vec<String>,
    case_sensitive: bool,
}

impl TermDictionaryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Terms are kept and looked up as given, without lowercasing.
    pub fn exact() -> Self {
        Self {
            terms: Vec::new(),
            case_sensitive: true,
        }
    }

    pub fn insert(&mut self, term: &str) -> &mut Self {
        if self.case_sensitive {
            self.terms.push(term.to_string());
        } else {
            self.terms.push(term.to_lowercase());
        }
        self
    }

    pub fn extend<I, S>(&mut self, terms: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for term in terms {
            self.insert(term.as_ref());
        }
        self
    }

    /// Sorts and dedups once; lookups afterwards are binary searches.
    pub fn build(mut self) -> TermDictionary {
        self.terms.sort_unstable();
        self.terms.dedup();

        let mut min_len = usize::MAX;
        let mut max_len = 0;
        for term in &self.terms {
            let len = term.chars().count();
            min_len = min_len.min(len);
            max_len = max_len.max(len);
        }

        TermDictionary {
            terms: self.terms,
            min_len,
            max_len,
            case_sensitive: self.case_sensitive,
        }
    }
}

/// Immutable, sorted set of query-significant terms. Lowercase unless
/// built with [`TermDictionaryBuilder::exact`].
#[derive(Debug, Clone)]
pub struct TermDictionary {
    terms: Vec<String>,
    min_len: usize,
    max_len: usize,
    case_sensitive: bool,
}

impl TermDictionary {
    pub fn new<I, S>(terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut builder = TermDictionaryBuilder::new();
        builder.extend(terms);
        builder.build()
    }

    pub fn from_weighted(weighted: &HashMap<String, f32>) -> Self {
        Self::new(weighted.keys())
    }

    pub fn empty() -> Self {
        TermDictionaryBuilder::new().build()
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Shortest term length in characters, `usize::MAX` when empty.
    pub fn min_len(&self) -> usize {
        self.min_len
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }

    pub fn terms(&self) -> impl Iterator<Item = &str> {
        self.terms.iter().map(String::as_str)
    }

    pub fn contains(&self, term: &str) -> bool {
        let needle: Cow<'_, str> = if self.case_sensitive {
            Cow::Borrowed(term)
        } else {
            Cow::Owned(term.to_lowercase())
        };
        self.terms
            .binary_search_by(|t| t.as_str().cmp(&needle))
            .is_ok()
    }
}

impl TermMatcher for TermDictionary {
    fn is_match(&self, surface: &str) -> bool {
        let len = surface.chars().count();
        if len < self.min_len || len > self.max_len {
            return false;
        }
        self.contains(surface)
    }
}
