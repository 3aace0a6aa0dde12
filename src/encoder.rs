//! Token-driven, size-bounded fragment encoder
//!
//! Walks a decoded field value alongside its token spans, copying untokenized
//! text through the entity escaper, wrapping matched tokens in the caller's
//! tag pair and every other token in the sentinel marker. Emission stops at
//! the size budget without ever leaving an open tag behind.

use crate::entity::push_escaped;
use crate::terms::TermMatcher;
use crate::tokens::Token;
use serde::{Deserialize, Serialize};

/// Marker wrapped around tokenized text that did not match.
pub const SENTINEL_PRE: &str = "<i>";
pub const SENTINEL_POST: &str = "</i>";

pub const DEFAULT_PRE_TAG: &str = "<em>";
pub const DEFAULT_POST_TAG: &str = "</em>";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagPair {
    pub pre: String,
    pub post: String,
}

impl Default for TagPair {
    fn default() -> Self {
        Self::new(DEFAULT_PRE_TAG, DEFAULT_POST_TAG)
    }
}

impl TagPair {
    pub fn new(pre: impl Into<String>, post: impl Into<String>) -> Self {
        Self {
            pre: pre.into(),
            post: post.into(),
        }
    }

    /// First element of each list wins; an empty or missing list falls back to `<em>`/`</em>`.
    pub fn from_options(pre_tags: Option<&[String]>, post_tags: Option<&[String]>) -> Self {
        let pre = pre_tags
            .and_then(|tags| tags.first())
            .map(String::as_str)
            .unwrap_or(DEFAULT_PRE_TAG);
        let post = post_tags
            .and_then(|tags| tags.first())
            .map(String::as_str)
            .unwrap_or(DEFAULT_POST_TAG);
        Self::new(pre, post)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SizeBudget {
    #[default]
    Unbounded,
    Limit(usize),
}

impl SizeBudget {
    /// True once the character at `index` (counted in characters from the
    /// start of the value) lies past the budget.
    #[inline]
    pub fn exceeded_at(&self, index: usize) -> bool {
        match self {
            SizeBudget::Unbounded => false,
            SizeBudget::Limit(limit) => index > *limit,
        }
    }
}

enum Flow {
    /// Carries the character index reached.
    Continue(usize),
    Stop,
}

pub struct FragmentEncoder<'a, M: TermMatcher + ?Sized> {
    matcher: &'a M,
    tags: &'a TagPair,
    budget: SizeBudget,
}

impl<'a, M: TermMatcher + ?Sized> FragmentEncoder<'a, M> {
    pub fn new(matcher: &'a M, tags: &'a TagPair, budget: SizeBudget) -> Self {
        Self {
            matcher,
            tags,
            budget,
        }
    }

    /// Encodes one value. `tokens` must be ascending, non-overlapping byte
    /// spans over `text` (see [`crate::tokens::validate`]); a span that does
    /// not fit is copied as plain gap text instead.
    pub fn encode(&self, text: &str, tokens: &[Token]) -> String {
        let mut out = String::with_capacity(text.len() + tokens.len() * 8);
        let mut offset = 0;
        let mut index = 0;

        for token in tokens {
            if token.start < offset {
                continue;
            }
            let Some(surface) = text.get(token.start..token.end) else {
                continue;
            };

            match self.copy_gap(&mut out, text, offset, token.start, index) {
                Flow::Continue(next) => index = next,
                Flow::Stop => return out,
            }

            let (pre, post) = if self.matcher.is_match(surface) {
                (self.tags.pre.as_str(), self.tags.post.as_str())
            } else {
                (SENTINEL_PRE, SENTINEL_POST)
            };

            let open_at = out.len();
            out.push_str(pre);
            let mut chars = surface.chars().peekable();
            while let Some(c) = chars.next() {
                push_escaped(&mut out, c);
                if self.budget.exceeded_at(index) {
                    if chars.peek().is_none() {
                        out.push_str(post);
                    } else {
                        // an open tag without its close would be malformed markup
                        out.replace_range(open_at..open_at + pre.len(), "");
                    }
                    return out;
                }
                index += 1;
            }
            out.push_str(post);
            offset = token.end;
        }

        self.copy_gap(&mut out, text, offset, text.len(), index);
        out
    }

    /// Encodes an untokenized value as a single unit.
    pub fn encode_whole(&self, text: &str) -> String {
        let (pre, post) = if self.matcher.is_match(text) {
            (self.tags.pre.as_str(), self.tags.post.as_str())
        } else {
            (SENTINEL_PRE, SENTINEL_POST)
        };
        let mut out = String::with_capacity(text.len() + pre.len() + post.len());
        out.push_str(pre);
        for c in text.chars() {
            push_escaped(&mut out, c);
        }
        out.push_str(post);
        out
    }

    fn copy_gap(&self, out: &mut String, text: &str, from: usize, to: usize, mut index: usize) -> Flow {
        let Some(gap) = text.get(from..to) else {
            return Flow::Continue(index);
        };
        for c in gap.chars() {
            push_escaped(out, c);
            if self.budget.exceeded_at(index) {
                return Flow::Stop;
            }
            index += 1;
        }
        Flow::Continue(index)
    }
}

/// Picks the fragments returned for one field.
///
/// `number_of_fragments == 0` on a multi-valued field returns every fragment;
/// otherwise at most `max(number_of_fragments, 1)` are kept, never padded.
pub fn select_fragments(
    mut fragments: Vec<String>,
    number_of_fragments: usize,
    value_count: usize,
) -> Vec<String> {
    if number_of_fragments == 0 && value_count > 1 {
        return fragments;
    }
    fragments.truncate(number_of_fragments.max(1));
    fragments
}
