use highlight_split::encoder::{SENTINEL_POST, SENTINEL_PRE};
use highlight_split::tokens::tokenize;
use highlight_split::{
    drill, Analyzers, FragmentEncoder, SizeBudget, TagPair, TermDictionary, TermMatcher,
};
use proptest::collection::vec as prop_vec;
use proptest::prelude::*;

const TAGS: [&str; 4] = ["<em>", "</em>", SENTINEL_PRE, SENTINEL_POST];

fn encode(text: &str, terms: &[String], analyzer: &str, budget: SizeBudget) -> String {
    let analyzers = Analyzers::new();
    let mut analyzer = analyzers.resolve("body", Some(analyzer)).unwrap();
    let tokens = tokenize(&mut analyzer, text).unwrap();
    let dict = TermDictionary::new(terms);
    let tags = TagPair::default();
    FragmentEncoder::new(&dict, &tags, budget).encode(text, &tokens)
}

/// Tags in emission order; panics on a `<` that starts no known tag.
fn tag_sequence(out: &str) -> Vec<&'static str> {
    let mut tags = Vec::new();
    let mut rest = out;
    while let Some(at) = rest.find('<') {
        rest = &rest[at..];
        let tag = TAGS
            .iter()
            .find(|tag| rest.starts_with(**tag))
            .unwrap_or_else(|| panic!("unescaped '<' in {out:?}"));
        tags.push(*tag);
        rest = &rest[tag.len()..];
    }
    tags
}

fn strip(out: &str) -> String {
    let mut text = out.to_string();
    for tag in TAGS {
        text = text.replace(tag, "");
    }
    text.replace("&lt;", "<").replace("&gt;", ">")
}

// Property: source text only ever reaches the output escaped
proptest! {
    #[test]
    fn prop_escaping_is_total(
        text in "[a-zA-Z0-9 <>.,/é]{0,40}",
        terms in prop_vec("[a-z]{1,4}", 0..4)
    ) {
        let out = encode(&text, &terms, "default", SizeBudget::Unbounded);
        tag_sequence(&out);
        prop_assert_eq!(strip(&out), text);
    }
}

// Property: truncation never leaves a tag open and only cuts the tail
proptest! {
    #[test]
    fn prop_tags_balanced_under_any_budget(
        text in "[a-zA-Z <>.é]{0,40}",
        terms in prop_vec("[a-z]{1,3}", 0..4),
        limit in 0usize..48
    ) {
        let out = encode(&text, &terms, "default", SizeBudget::Limit(limit));

        let mut open: Option<&str> = None;
        for tag in tag_sequence(&out) {
            match (open, tag) {
                (None, "<em>") => open = Some("</em>"),
                (None, "<i>") => open = Some("</i>"),
                (Some(close), tag) if close == tag => open = None,
                (state, tag) => prop_assert!(false, "tag {} after {:?} in {:?}", tag, state, out),
            }
        }
        prop_assert!(open.is_none(), "unclosed tag in {:?}", out);

        let copied = strip(&out);
        prop_assert!(text.starts_with(&copied));
        prop_assert!(copied.chars().count() <= limit + 2);
    }
}

// Property: inserted terms match in any case
proptest! {
    #[test]
    fn prop_dictionary_round_trip(words in prop_vec("[a-zA-Zé]{1,8}", 1..10)) {
        let dict = TermDictionary::new(&words);
        for word in &words {
            prop_assert!(dict.is_match(word));
            prop_assert!(dict.is_match(&word.to_uppercase()));
            prop_assert!(dict.is_match(&word.to_lowercase()));
        }
    }
}

// Property: spans drilled from a fragment re-highlight every occurrence
proptest! {
    #[test]
    fn prop_drill_then_reencode_marks_every_occurrence(
        words in prop_vec("[a-z]{1,5}", 1..12),
        pick in any::<prop::sample::Index>()
    ) {
        let target = words[pick.index(words.len())].clone();
        let text = words.join(" ");

        let fragment = encode(&text, std::slice::from_ref(&target), "whitespace", SizeBudget::Unbounded);
        let spans = drill(&fragment, &TagPair::default());
        prop_assert!(spans.contains(&target));

        let analyzers = Analyzers::new();
        let mut analyzer = analyzers.resolve("body", Some("whitespace")).unwrap();
        let tokens = tokenize(&mut analyzer, &text).unwrap();
        let tags = TagPair::default();
        let full = FragmentEncoder::new(&spans, &tags, SizeBudget::Unbounded).encode(&text, &tokens);

        let expected = words.iter().filter(|w| **w == target).count();
        prop_assert_eq!(full.matches(&format!("<em>{target}</em>")).count(), expected);
    }
}
