//! Second pass: recover highlighted spans from tagged fragments and re-encode
//! the complete field value with them.

use crate::cache::{CacheKey, ResultCache};
use crate::encoder::{FragmentEncoder, SizeBudget, TagPair};
use crate::entity::{escape, push_escaped, unescape};
use crate::error::{FieldFailure, HighlightError, Result};
use crate::mapping::{FieldClass, MappingRegistry, TypeMapping};
use crate::terms::TermMatcher;
use crate::tokens::{tokenize, Analyzers};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::borrow::Cow;
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, warn};

/// Distinct substrings that were highlighted in an already-tagged string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HighlightedSpans {
    spans: HashSet<String>,
}

impl HighlightedSpans {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, span: impl Into<String>) -> bool {
        self.spans.insert(span.into())
    }

    pub fn contains(&self, span: &str) -> bool {
        self.spans.contains(span)
    }

    pub fn len(&self) -> usize {
        self.spans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.spans.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for HighlightedSpans {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            spans: iter.into_iter().map(Into::into).collect(),
        }
    }
}

/// Exact, case-sensitive membership.
impl TermMatcher for HighlightedSpans {
    fn is_match(&self, surface: &str) -> bool {
        self.spans.contains(surface)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DrillState {
    Idle,
    Highlighted { start: usize },
}

/// Extracts the text between each configured opening tag and the next `<`
/// (or the configured closing tag).
///
/// Only the exact opening tag starts a capture, so the sentinel marker and
/// any other markup are skipped. Empty spans are dropped. Unterminated tags
/// simply end the scan.
pub fn drill(text: &str, tags: &TagPair) -> HighlightedSpans {
    let (open, close) = (tags.pre.as_str(), tags.post.as_str());
    let mut spans = HighlightedSpans::new();
    let mut state = DrillState::Idle;
    let mut idx = 0;

    while let Some(c) = text[idx..].chars().next() {
        let rest = &text[idx..];
        if let DrillState::Highlighted { start } = state {
            if c == '<' || (!close.is_empty() && rest.starts_with(close)) {
                if start < idx {
                    spans.insert(&text[start..idx]);
                }
                state = DrillState::Idle;
            }
        }
        if !open.is_empty() && rest.starts_with(open) {
            idx += open.len();
            state = DrillState::Highlighted { start: idx };
            continue;
        }
        idx += c.len_utf8();
    }

    spans
}

/// Re-aligns a tagged string against the untagged original.
///
/// Two cursors advance together while characters agree, copying the
/// original through the escaper. A disagreeing tagged character is taken
/// as markup and copied verbatim. Once the original runs out, the rest of
/// the tagged text is appended; if the tagged text runs out first, the
/// result stops there. Only sound when the strings differ by inserted tag
/// characters and `<`/`>` escaping.
pub fn convert(tagged: &str, original: &str) -> String {
    let mut out = String::with_capacity(tagged.len() + original.len() / 8);
    let mut rest = tagged.chars();

    for o in original.chars() {
        loop {
            match rest.next() {
                Some(t) if t == o => {
                    push_escaped(&mut out, o);
                    break;
                }
                Some(t) => out.push(t),
                None => return out,
            }
        }
    }

    out.push_str(rest.as_str());
    out
}

/// Character length of `text` once the highlight tags are removed.
pub fn untagged_len(text: &str, tags: &TagPair) -> usize {
    let mut stripped = Cow::Borrowed(text);
    for tag in [&tags.pre, &tags.post] {
        if !tag.is_empty() && stripped.contains(tag.as_str()) {
            stripped = Cow::Owned(stripped.replace(tag.as_str(), ""));
        }
    }
    stripped.chars().count()
}

/// Spans highlighted in `fragment`, realigned first when the fragment has
/// fewer characters than the original value.
pub fn spans_from_fragment(fragment: &str, original: &str, tags: &TagPair) -> HighlightedSpans {
    let text = unescape(fragment);
    if untagged_len(&text, tags) < original.chars().count() {
        drill(&convert(&text, original), tags)
    } else {
        drill(&text, tags)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    #[serde(rename = "_index", default, skip_serializing_if = "Option::is_none")]
    pub index: Option<String>,
    #[serde(rename = "_type", default, skip_serializing_if = "Option::is_none")]
    pub doc_type: Option<String>,
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_source", default, skip_serializing_if = "Option::is_none")]
    pub source: Option<Map<String, Value>>,
    #[serde(default)]
    pub highlight: BTreeMap<String, Vec<String>>,
}

/// Text of a source value; `null` has none.
pub fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

pub struct Reconciler<'a> {
    analyzers: &'a Analyzers,
    mappings: &'a MappingRegistry,
    system_fields: &'a HashSet<String>,
    retained_source_fields: &'a HashSet<String>,
    budget: SizeBudget,
    tags: TagPair,
}

impl<'a> Reconciler<'a> {
    pub fn new(
        analyzers: &'a Analyzers,
        mappings: &'a MappingRegistry,
        system_fields: &'a HashSet<String>,
        retained_source_fields: &'a HashSet<String>,
    ) -> Self {
        Self {
            analyzers,
            mappings,
            system_fields,
            retained_source_fields,
            budget: SizeBudget::Unbounded,
            tags: TagPair::default(),
        }
    }

    /// Budget applied to system fields only.
    pub fn with_budget(mut self, budget: SizeBudget) -> Self {
        self.budget = budget;
        self
    }

    pub fn with_tags(mut self, tags: TagPair) -> Self {
        self.tags = tags;
        self
    }

    /// Rewrites the hit's fragments into full-value highlights and renders
    /// its remaining source fields. Failures are per field.
    pub fn reconcile_hit(&self, hit: &mut SearchHit, cache: &mut ResultCache) -> Vec<FieldFailure> {
        let SearchHit {
            index,
            doc_type,
            id,
            source,
            highlight,
        } = hit;
        let index = index.as_deref().unwrap_or_default();
        let doc_type = doc_type.as_deref().unwrap_or_default();
        let mut failures = Vec::new();

        let Some(mapping) = self.mappings.get(index, doc_type) else {
            let err = HighlightError::MissingMapping {
                index: index.to_string(),
                doc_type: doc_type.to_string(),
            };
            warn!(id = %id, error = %err, "skipping hit");
            failures.push(FieldFailure::new(id, "*", &err));
            return failures;
        };
        let Some(source) = source.as_mut() else {
            debug!(id = %id, "hit carries no source, fragments left as is");
            return failures;
        };

        for (field, fragments) in highlight.iter_mut() {
            let Some(original) = source.get(field).and_then(value_text) else {
                debug!(id = %id, field = %field, "no source value for highlighted field");
                continue;
            };
            for fragment in fragments.iter_mut() {
                let spans = spans_from_fragment(fragment, &original, &self.tags);
                let key = CacheKey::new(index, doc_type, field, &original).with_spans(spans.iter());
                let encoded = cache.get_or_try_insert(key, || {
                    self.encode_value(mapping, field, &original, &spans)
                });
                match encoded {
                    Ok(encoded) => *fragment = encoded,
                    Err(err) => {
                        let err = err.for_field(field);
                        warn!(id = %id, error = %err, "reconcile failed");
                        failures.push(FieldFailure::new(id, field, &err));
                        break;
                    }
                }
            }
        }

        let no_spans = HighlightedSpans::new();
        for (field, value) in source.iter_mut() {
            if highlight.contains_key(field) {
                if !self.retained_source_fields.contains(field) {
                    *value = Value::String(String::new());
                }
                continue;
            }
            let renders = mapping
                .field(field)
                .is_some_and(|m| m.class() != FieldClass::Unchanged);
            if !renders {
                continue;
            }
            let Some(text) = value_text(value) else {
                continue;
            };
            let key = CacheKey::new(index, doc_type, field, &text);
            match cache.get_or_try_insert(key, || self.encode_value(mapping, field, &text, &no_spans)) {
                Ok(encoded) => *value = Value::String(encoded),
                Err(err) => {
                    let err = err.for_field(field);
                    warn!(id = %id, error = %err, "rendering plain field failed");
                    failures.push(FieldFailure::new(id, field, &err));
                }
            }
        }

        failures
    }

    /// Encodes one complete value of `field` against `spans`.
    pub fn encode_value(
        &self,
        mapping: &TypeMapping,
        field: &str,
        text: &str,
        spans: &HighlightedSpans,
    ) -> Result<String> {
        let Some(field_mapping) = mapping.field(field) else {
            return Ok(text.to_string());
        };

        match field_mapping.class() {
            FieldClass::Unchanged => Ok(text.to_string()),
            FieldClass::NotAnalyzed => {
                Ok(FragmentEncoder::new(spans, &self.tags, SizeBudget::Unbounded).encode_whole(text))
            }
            FieldClass::Analyzed => {
                let budget = if self.system_fields.contains(field) {
                    self.budget
                } else {
                    SizeBudget::Unbounded
                };
                let mut analyzer = self
                    .analyzers
                    .resolve(field, field_mapping.analyzer.as_deref())?;
                let decoded = unescape(text);
                match tokenize(&mut analyzer, &decoded) {
                    Ok(tokens) => Ok(FragmentEncoder::new(spans, &self.tags, budget).encode(&decoded, &tokens)),
                    Err(err) => {
                        warn!(field, error = %err, "token stream failed, value left unhighlighted");
                        Ok(escape(&decoded).into_owned())
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sorted(spans: &HighlightedSpans) -> Vec<&str> {
        let mut v: Vec<&str> = spans.iter().collect();
        v.sort_unstable();
        v
    }

    #[test]
    fn drill_collects_distinct_em_spans() {
        let tags = TagPair::default();
        let spans = drill("a <em>fox</em> and <em>dog</em>, <em>fox</em>", &tags);
        assert_eq!(sorted(&spans), vec!["dog", "fox"]);
    }

    #[test]
    fn drill_ignores_sentinel_and_other_tags() {
        let tags = TagPair::default();
        let spans = drill("<i>the</i> <b>bold</b> <em>hit</em>", &tags);
        assert_eq!(sorted(&spans), vec!["hit"]);
    }

    #[test]
    fn drill_tolerates_unterminated_input() {
        let tags = TagPair::default();
        assert!(drill("<em>open", &tags).is_empty());
        assert!(drill("<e", &tags).is_empty());
        assert_eq!(sorted(&drill("<em>a</em> <em", &tags)), vec!["a"]);
        assert!(drill("<em></em>", &tags).is_empty());
    }

    #[test]
    fn drill_follows_configured_tag() {
        let tags = TagPair::new("<mark>", "</mark>");
        let spans = drill("<mark>disk</mark> <em>nope</em>", &tags);
        assert_eq!(sorted(&spans), vec!["disk"]);
    }

    #[test]
    fn drill_matches_the_whole_open_tag() {
        let tags = TagPair::new("<highlight>", "</highlight>");
        let spans = drill("<i>trail</i> <highlight>audit</highlight>", &tags);
        assert_eq!(sorted(&spans), vec!["audit"]);
        let spans = drill("<mm>x</mm> <e>y</e> <em>z</em>", &TagPair::default());
        assert_eq!(sorted(&spans), vec!["z"]);
    }

    #[test]
    fn drill_closes_on_non_markup_tags() {
        let tags = TagPair::new("[[", "]]");
        let spans = drill("a [[disk]] b [[full]]", &tags);
        assert_eq!(sorted(&spans), vec!["disk", "full"]);
    }

    #[test]
    fn drill_keeps_multibyte_spans() {
        let spans = drill("<em>café</em> ünï", &TagPair::default());
        assert_eq!(sorted(&spans), vec!["café"]);
    }

    #[test]
    fn convert_reinserts_escaping() {
        let original = "a<b fox";
        let tagged = "a<b <em>fox</em>";
        assert_eq!(convert(tagged, original), "a&lt;b <em>fox</em>");
    }

    #[test]
    fn convert_stops_when_tagged_runs_out() {
        assert_eq!(convert("<em>ab", "abcdef"), "<em>ab");
        assert_eq!(convert("", "abc"), "");
    }

    #[test]
    fn untagged_length_counts_characters() {
        let tags = TagPair::default();
        assert_eq!(untagged_len("<em>fox</em> é", &tags), 5);
    }

    #[test]
    fn fragment_spans_realign_short_fragments() {
        let tags = TagPair::default();
        // the decoded fragment carries a raw '<' and is shorter than the original
        let spans = spans_from_fragment("<em>a&#60;b</em>", "a<b c", &tags);
        assert_eq!(sorted(&spans), vec!["a&lt;b"]);
        let spans = spans_from_fragment("x <em>fox</em> y", "x fox y", &tags);
        assert_eq!(sorted(&spans), vec!["fox"]);
    }

    fn mapping() -> TypeMapping {
        serde_json::from_value(serde_json::json!({
            "properties": {
                "body": {"type": "string"},
                "message": {"type": "string"},
                "host": {"type": "string", "index": "not_analyzed"},
                "logTime": {"type": "long"},
                "broken": {"type": "string", "analyzer": "missing"}
            }
        }))
        .unwrap()
    }

    struct Fixture {
        analyzers: Analyzers,
        registry: MappingRegistry,
        system: HashSet<String>,
        retained: HashSet<String>,
    }

    impl Fixture {
        fn new() -> Self {
            let mut registry = MappingRegistry::new();
            registry.put("logs", "event", mapping());
            Self {
                analyzers: Analyzers::new(),
                registry,
                system: HashSet::from(["body".to_string()]),
                retained: HashSet::from(["logType".to_string()]),
            }
        }

        fn reconciler(&self) -> Reconciler<'_> {
            Reconciler::new(&self.analyzers, &self.registry, &self.system, &self.retained)
        }
    }

    #[test]
    fn encode_value_by_field_class() {
        let fx = Fixture::new();
        let rc = fx.reconciler();
        let m = mapping();
        let spans: HighlightedSpans = ["fox", "web-1"].into_iter().collect();
        assert_eq!(
            rc.encode_value(&m, "message", "the fox <x>", &spans).unwrap(),
            "<i>the</i> <em>fox</em> &lt;<i>x</i>&gt;"
        );
        assert_eq!(rc.encode_value(&m, "host", "web-1", &spans).unwrap(), "<em>web-1</em>");
        assert_eq!(rc.encode_value(&m, "host", "web-2", &spans).unwrap(), "<i>web-2</i>");
        assert_eq!(rc.encode_value(&m, "logTime", "123", &spans).unwrap(), "123");
        assert_eq!(rc.encode_value(&m, "unmapped", "a<b", &spans).unwrap(), "a<b");
        let err = rc.encode_value(&m, "broken", "x", &spans).unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn only_system_fields_are_bounded() {
        let fx = Fixture::new();
        let rc = fx.reconciler().with_budget(SizeBudget::Limit(2));
        let m = mapping();
        let spans = HighlightedSpans::new();
        assert_eq!(rc.encode_value(&m, "body", "hello world", &spans).unwrap(), "hell");
        assert_eq!(
            rc.encode_value(&m, "message", "hello world", &spans).unwrap(),
            "<i>hello</i> <i>world</i>"
        );
    }

    #[test]
    fn reconcile_hit_rewrites_fragments_and_source() {
        let fx = Fixture::new();
        let rc = fx.reconciler();
        let mut hit: SearchHit = serde_json::from_value(serde_json::json!({
            "_index": "logs",
            "_type": "event",
            "_id": "1",
            "_source": {
                "message": "disk full on web-1, disk replaced",
                "host": "web-1",
                "logType": "error",
                "logTime": 1700000000
            },
            "highlight": {
                "message": ["<em>disk</em> full on"],
                "logType": ["<em>error</em>"]
            }
        }))
        .unwrap();

        let mut cache = ResultCache::new(16);
        let failures = rc.reconcile_hit(&mut hit, &mut cache);
        assert!(failures.is_empty());
        assert_eq!(
            hit.highlight["message"],
            vec!["<em>disk</em> <i>full</i> <i>on</i> <i>web</i>-<i>1</i>, <em>disk</em> <i>replaced</i>"]
        );
        let source = hit.source.as_ref().unwrap();
        assert_eq!(source["message"], "");
        assert_eq!(source["host"], "<i>web-1</i>");
        assert_eq!(source["logType"], "error");
        assert_eq!(source["logTime"], 1700000000);
    }

    #[test]
    fn repeated_values_hit_the_cache() {
        let fx = Fixture::new();
        let rc = fx.reconciler();
        let mut cache = ResultCache::new(16);
        for id in ["1", "2"] {
            let mut hit: SearchHit = serde_json::from_value(serde_json::json!({
                "_index": "logs", "_type": "event", "_id": id,
                "_source": {"message": "same text"},
                "highlight": {"message": ["<em>same</em> text"]}
            }))
            .unwrap();
            assert!(rc.reconcile_hit(&mut hit, &mut cache).is_empty());
            assert_eq!(hit.highlight["message"], vec!["<em>same</em> <i>text</i>"]);
        }
        let (hits, misses, _, _) = cache.stats();
        assert_eq!((hits, misses), (1, 1));
    }

    #[test]
    fn each_fragment_keeps_its_own_spans() {
        let fx = Fixture::new();
        let rc = fx.reconciler();
        let mut hit: SearchHit = serde_json::from_value(serde_json::json!({
            "_index": "logs", "_type": "event", "_id": "4",
            "_source": {"message": "disk full web down"},
            "highlight": {"message": ["<em>disk</em> full", "web <em>down</em>"]}
        }))
        .unwrap();
        let mut cache = ResultCache::new(16);
        assert!(rc.reconcile_hit(&mut hit, &mut cache).is_empty());
        assert_eq!(
            hit.highlight["message"],
            vec![
                "<em>disk</em> <i>full</i> <i>web</i> <i>down</i>",
                "<i>disk</i> <i>full</i> <i>web</i> <em>down</em>",
            ]
        );
        let (hits, misses, _, _) = cache.stats();
        assert_eq!((hits, misses), (0, 2));
    }

    #[test]
    fn missing_mapping_is_reported_once() {
        let fx = Fixture::new();
        let rc = fx.reconciler();
        let mut hit: SearchHit = serde_json::from_value(serde_json::json!({
            "_index": "other", "_type": "event", "_id": "9",
            "_source": {"message": "x"},
            "highlight": {"message": ["<em>x</em>"]}
        }))
        .unwrap();
        let failures = rc.reconcile_hit(&mut hit, &mut ResultCache::default());
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].field, "*");
        assert_eq!(hit.highlight["message"], vec!["<em>x</em>"]);
    }

    #[test]
    fn field_failures_do_not_stop_other_fields() {
        let fx = Fixture::new();
        let rc = fx.reconciler();
        let mut hit: SearchHit = serde_json::from_value(serde_json::json!({
            "_index": "logs", "_type": "event", "_id": "3",
            "_source": {"broken": "a b", "message": "a b"},
            "highlight": {"broken": ["<em>a</em> b"], "message": ["<em>a</em> b"]}
        }))
        .unwrap();
        let failures = rc.reconcile_hit(&mut hit, &mut ResultCache::default());
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].field, "broken");
        assert_eq!(hit.highlight["broken"], vec!["<em>a</em> b"]);
        assert_eq!(hit.highlight["message"], vec!["<em>a</em> <i>b</i>"]);
    }
}
