//! Property tests for token substitution, envelope parsing and URL joining

#![allow(clippy::unwrap_used, clippy::expect_used)]

use proptest::prelude::*;
use volley::codec::{self, parse_envelope};
use volley::{extract_placeholders, join_paths, Token, TokenDictionary, VolleyError};

fn token() -> impl Strategy<Value = Token> {
    prop::sample::select(Token::ALL.to_vec())
}

/// Text that cannot contain a placeholder on its own
fn filler() -> impl Strategy<Value = String> {
    "[a-z0-9 /=&?.:-]{0,12}"
}

fn value() -> impl Strategy<Value = String> {
    // Replacement syntax like `$1` must be inserted literally
    "[a-zA-Z0-9$_\\\\]{0,16}"
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn prop_substitution_replaces_every_bound_placeholder(
        parts in prop::collection::vec((filler(), token()), 1..6),
        tail in filler(),
        val in value(),
    ) {
        let mut dict = TokenDictionary::new();
        let mut template = String::new();
        let mut expected = String::new();
        for (text, token) in &parts {
            dict.set(*token, val.clone());
            template.push_str(&format!("{text}${{{}}}", token.name()));
            expected.push_str(text);
            expected.push_str(&val);
        }
        template.push_str(&tail);
        expected.push_str(&tail);

        prop_assert_eq!(dict.substitute(&template).unwrap(), expected);
    }

    #[test]
    fn prop_text_without_placeholders_is_unchanged(text in filler()) {
        let dict = TokenDictionary::new();
        prop_assert_eq!(dict.substitute(&text).unwrap(), text);
    }

    #[test]
    fn prop_extract_finds_each_name_once(tokens in prop::collection::vec(token(), 0..8)) {
        let text: String = tokens
            .iter()
            .map(|t| format!("x${{{}}}y", t.name()))
            .collect();
        let names = extract_placeholders(&text);
        let mut unique: Vec<&str> = tokens.iter().map(|t| t.name()).collect();
        unique.sort_unstable();
        unique.dedup();
        prop_assert_eq!(names.iter().map(String::as_str).collect::<Vec<_>>(), unique);
    }

    #[test]
    fn prop_unknown_names_are_illegal(name in "[A-Z]{3,10}") {
        prop_assume!(name.parse::<Token>().is_err());
        let dict = TokenDictionary::new();
        let err = dict.substitute(&format!("${{{name}}}")).unwrap_err();
        let is_illegal = matches!(err, VolleyError::IllegalToken { .. });
        prop_assert!(is_illegal);
    }

    #[test]
    fn prop_envelope_ignores_message_id(id in "[0-9A-F]{1,6}", key in "[a-z]{1,8}", n in 0u32..1000) {
        let inner = format!("0|m|{{\"{key}\":{n}}}");
        let bare = format!("a[{}]", serde_json::to_string(&inner).unwrap());
        let prefixed = format!("a[{}]", serde_json::to_string(&format!("{id}#{inner}")).unwrap());

        let a = parse_envelope(&bare).unwrap().unwrap();
        let b = parse_envelope(&prefixed).unwrap().unwrap();
        prop_assert_eq!(&a, &b);
        prop_assert!(codec::messages_match(&bare, &prefixed).unwrap());
    }

    #[test]
    fn prop_join_paths_has_single_separator(
        base in "[a-z]{1,8}/?",
        path in "/?[a-z]{1,8}",
    ) {
        let joined = join_paths(&base, &path);
        prop_assert!(!joined.contains("//"));
        prop_assert_eq!(
            joined.replace('/', ""),
            format!("{}{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
        );
    }
}
