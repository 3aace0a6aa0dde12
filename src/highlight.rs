//! First pass: size-bounded fragments for each requested field of a document

use crate::encoder::{select_fragments, FragmentEncoder, TagPair};
use crate::entity::unescape;
use crate::error::{FieldFailure, HighlightError, Result};
use crate::mapping::{FieldMapping, TypeMapping};
use crate::query::{HighlightQuery, SpanTermExtractor};
use crate::reconcile::value_text;
use crate::size::parse_optional_budget;
use crate::terms::TermDictionaryBuilder;
use crate::tokens::{analyze, Analyzers, AnalyzedToken};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Analyzer used to pull query terms out of untokenized values.
const KEYWORD_ANALYZER: &str = "raw";

fn default_number_of_fragments() -> usize {
    5
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldOptions {
    #[serde(default)]
    pub pre_tags: Option<Vec<String>>,
    #[serde(default)]
    pub post_tags: Option<Vec<String>>,
    #[serde(default = "default_number_of_fragments")]
    pub number_of_fragments: usize,
    #[serde(default)]
    pub options: Map<String, Value>,
}

impl Default for FieldOptions {
    fn default() -> Self {
        Self {
            pre_tags: None,
            post_tags: None,
            number_of_fragments: default_number_of_fragments(),
            options: Map::new(),
        }
    }
}

impl FieldOptions {
    pub fn tags(&self) -> TagPair {
        TagPair::from_options(self.pre_tags.as_deref(), self.post_tags.as_deref())
    }

    /// `string_size` as given, numbers included.
    pub fn string_size(&self) -> Option<String> {
        self.options.get("string_size").and_then(value_text)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    #[serde(default)]
    pub source: Map<String, Value>,
    #[serde(default)]
    pub stored: Map<String, Value>,
}

impl Document {
    /// Values of `field`: stored fields when the mapping stores it, the
    /// source otherwise. Arrays are multi-valued; nulls are skipped.
    pub fn field_values(&self, field: &str, mapping: &FieldMapping) -> Vec<String> {
        let values = if mapping.store { &self.stored } else { &self.source };
        match values.get(field) {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items.iter().filter_map(value_text).collect(),
            Some(value) => value_text(value).into_iter().collect(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DocumentHighlight {
    pub id: String,
    pub highlight: BTreeMap<String, Vec<String>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<FieldFailure>,
}

pub struct Highlighter<'a> {
    analyzers: &'a Analyzers,
    mapping: &'a TypeMapping,
    query: &'a HighlightQuery,
}

impl<'a> Highlighter<'a> {
    pub fn new(analyzers: &'a Analyzers, mapping: &'a TypeMapping, query: &'a HighlightQuery) -> Self {
        Self {
            analyzers,
            mapping,
            query,
        }
    }

    /// Highlights `fields`, or every highlightable mapped field when empty.
    pub fn highlight_document(
        &self,
        doc: &Document,
        fields: &BTreeMap<String, FieldOptions>,
    ) -> DocumentHighlight {
        let discovered;
        let fields = if fields.is_empty() {
            discovered = self
                .mapping
                .highlightable_fields()
                .into_iter()
                .map(|name| (name, FieldOptions::default()))
                .collect::<BTreeMap<_, _>>();
            &discovered
        } else {
            fields
        };

        let mut result = DocumentHighlight {
            id: doc.id.clone(),
            ..Default::default()
        };
        for (field, options) in fields {
            match self.highlight_field(doc, field, options) {
                Ok(Some(fragments)) => {
                    result.highlight.insert(field.clone(), fragments);
                }
                Ok(None) => {}
                Err(err) => {
                    let err = err.for_field(field);
                    warn!(id = %doc.id, error = %err, "highlight failed");
                    result.failures.push(FieldFailure::new(&doc.id, field, &err));
                }
            }
        }
        result
    }

    /// Fragments for one field, `None` when there is nothing to highlight.
    pub fn highlight_field(
        &self,
        doc: &Document,
        field: &str,
        options: &FieldOptions,
    ) -> Result<Option<Vec<String>>> {
        let Some(mapping) = self.mapping.field(field) else {
            debug!(id = %doc.id, field, "field not mapped");
            return Ok(None);
        };

        let tags = options.tags();
        let budget = parse_optional_budget(options.string_size().as_deref())?;
        let values = doc.field_values(field, mapping);
        if values.is_empty() {
            return Ok(None);
        }

        let tokenized = mapping.is_tokenized();
        let analyzer_name = if tokenized {
            mapping.analyzer.as_deref()
        } else {
            Some(KEYWORD_ANALYZER)
        };
        let analyzer = self.analyzers.resolve(field, analyzer_name)?;

        let decoded: Vec<String> = values.iter().map(|v| unescape(v).into_owned()).collect();
        let mut analyzed: Vec<Vec<AnalyzedToken>> = Vec::with_capacity(decoded.len());
        for text in &decoded {
            match analyze(&mut analyzer.clone(), text) {
                Ok(tokens) => analyzed.push(tokens),
                Err(err @ HighlightError::TokenStream(_)) => {
                    warn!(id = %doc.id, field, error = %err, "token stream failed, field left unhighlighted");
                    return Ok(None);
                }
                Err(err) => return Err(err),
            }
        }

        // Whole values only match a query term spelled exactly the same
        let mut builder = if tokenized {
            TermDictionaryBuilder::new()
        } else {
            TermDictionaryBuilder::exact()
        };
        for tokens in &analyzed {
            let mut extractor = SpanTermExtractor::new(field, analyzer.clone(), tokens);
            builder.extend(extractor.extract(self.query)?.keys());
        }
        let dictionary = builder.build();
        debug!(
            id = %doc.id,
            field,
            values = decoded.len(),
            terms = dictionary.len(),
            "highlighting field"
        );

        let encoder = FragmentEncoder::new(&dictionary, &tags, budget);
        let fragments: Vec<String> = if tokenized {
            decoded
                .iter()
                .zip(&analyzed)
                .map(|(text, tokens)| {
                    let spans: Vec<_> = tokens.iter().map(|t| t.span).collect();
                    encoder.encode(text, &spans)
                })
                .collect()
        } else {
            decoded.iter().map(|text| encoder.encode_whole(text)).collect()
        };

        let fragments = select_fragments(fragments, options.number_of_fragments, values.len());
        Ok((!fragments.is_empty()).then_some(fragments))
    }
}
