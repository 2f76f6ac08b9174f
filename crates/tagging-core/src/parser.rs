//! Tag input parsing, rendering and name validation.
//!
//! Tag input is a single free-form string. The grammar:
//!
//! 1. Text between a matched pair of double quotes is one tag, verbatim
//!    apart from surrounding whitespace, and may contain commas.
//! 2. If any comma appears outside quotes, the remaining text is split on
//!    commas only, so unquoted tags may contain spaces.
//! 3. Otherwise the remaining text is split on whitespace.
//! 4. An unterminated quote is ignored: its text is treated as unquoted.
//! 5. Duplicates collapse to their first occurrence.
//!
//! # Examples
//!
//! ```
//! use tagging_core::parser::{parse_tag_input, render_tags};
//!
//! assert_eq!(parse_tag_input(Some("one two three")), vec!["one", "two", "three"]);
//! assert_eq!(
//!     parse_tag_input(Some("a-one, a-two and a-three")),
//!     vec!["a-one", "a-two and a-three"]
//! );
//! assert_eq!(render_tags(&["plain", "com,ma"]), r#"plain, "com,ma""#);
//! ```

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::defaults::RENDER_SEPARATOR;

/// Message for names containing characters outside the tag grammar.
pub const INVALID_CHARACTERS_MESSAGE: &str =
    "Tag names must contain only unicode alphanumeric characters, numbers, underscores or hyphens.";

/// A single tag: word characters and hyphens only.
static SINGLE_TAG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[-\w]+$").expect("single tag pattern is valid"));

/// A tag produced by the list grammar: words joined by the separators that
/// quoting or comma mode leave inside a name.
static TAG_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[-\w]+(?:[\s,]+[-\w]+)*$").expect("tag name pattern is valid"));

/// Message for names exceeding the configured length.
pub fn too_long_message(max_length: usize) -> String {
    format!("Tag names must be no longer than {} characters.", max_length)
}

#[derive(Debug)]
enum Segment {
    Quoted(String),
    Loose(String),
}

/// Parse tag input with the default separator rules.
///
/// `None` and empty input yield no names.
pub fn parse_tag_input(input: Option<&str>) -> Vec<String> {
    parse_tag_input_with(input, None)
}

/// Parse tag input, splitting unquoted text only on `delimiter` when one
/// is forced.
pub fn parse_tag_input_with(input: Option<&str>, delimiter: Option<char>) -> Vec<String> {
    let input = match input {
        Some(s) if !s.is_empty() => s,
        _ => return Vec::new(),
    };

    let mut segments = Vec::new();
    let mut buffer = String::new();
    let mut saw_loose_comma = false;
    let mut chars = input.chars();

    while let Some(c) = chars.next() {
        if c != '"' {
            if c == ',' {
                saw_loose_comma = true;
            }
            buffer.push(c);
            continue;
        }

        if !buffer.is_empty() {
            segments.push(Segment::Loose(std::mem::take(&mut buffer)));
        }

        let mut quoted = String::new();
        let mut closed = false;
        for q in chars.by_ref() {
            if q == '"' {
                closed = true;
                break;
            }
            quoted.push(q);
        }

        if closed {
            let word = quoted.trim();
            if !word.is_empty() {
                segments.push(Segment::Quoted(word.to_string()));
            }
        } else if !quoted.is_empty() {
            if quoted.contains(',') {
                saw_loose_comma = true;
            }
            segments.push(Segment::Loose(quoted));
        }
    }
    if !buffer.is_empty() {
        segments.push(Segment::Loose(buffer));
    }

    let split_on = match delimiter {
        Some(d) => Some(d),
        None if saw_loose_comma => Some(','),
        None => None,
    };

    let mut words = Vec::new();
    for segment in segments {
        match segment {
            Segment::Quoted(word) => words.push(word),
            Segment::Loose(chunk) => match split_on {
                Some(d) => words.extend(
                    chunk
                        .split(d)
                        .map(str::trim)
                        .filter(|w| !w.is_empty())
                        .map(String::from),
                ),
                None => words.extend(chunk.split_whitespace().map(String::from)),
            },
        }
    }

    dedupe(words)
}

/// Render names as a single string that parses back to the same names.
pub fn render_tags<S: AsRef<str>>(names: &[S]) -> String {
    render_tags_with(names, None)
}

/// Render names, joining with a forced delimiter when one is configured.
pub fn render_tags_with<S: AsRef<str>>(names: &[S], delimiter: Option<char>) -> String {
    let (split_char, glue) = match delimiter {
        Some(d) => (d, format!("{} ", d)),
        None => (',', RENDER_SEPARATOR.to_string()),
    };
    // A lone multi-word name has no comma to switch the parser out of
    // whitespace mode.
    let lone = names.len() == 1 && delimiter.is_none();

    names
        .iter()
        .map(|name| {
            let name = name.as_ref();
            if name.contains(split_char) || (lone && name.contains(char::is_whitespace)) {
                format!("\"{}\"", name)
            } else {
                name.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(&glue)
}

/// Lowercase (when asked) and drop repeated names, keeping first occurrences.
pub fn normalize_names(names: Vec<String>, force_lowercase: bool) -> Vec<String> {
    if force_lowercase {
        dedupe(names.into_iter().map(|n| n.to_lowercase()).collect())
    } else {
        dedupe(names)
    }
}

fn dedupe(words: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    words
        .into_iter()
        .filter(|w| seen.insert(w.clone()))
        .collect()
}

/// Validate a name produced by the list grammar.
///
/// Rules:
/// - 1 to `max_length` characters
/// - words of unicode alphanumerics, underscores and hyphens
/// - words may be separated by whitespace or commas (quoted tags)
pub fn validate_tag_name(name: &str, max_length: usize) -> std::result::Result<(), String> {
    if !TAG_NAME_RE.is_match(name) {
        return Err(INVALID_CHARACTERS_MESSAGE.to_string());
    }
    check_length(name, max_length)
}

/// Validate a single tag: no separators of any kind.
pub fn validate_single_tag(name: &str, max_length: usize) -> std::result::Result<(), String> {
    if !SINGLE_TAG_RE.is_match(name) {
        return Err(INVALID_CHARACTERS_MESSAGE.to_string());
    }
    check_length(name, max_length)
}

fn check_length(name: &str, max_length: usize) -> std::result::Result<(), String> {
    if name.chars().count() > max_length {
        return Err(too_long_message(max_length));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(input: &str) -> Vec<String> {
        parse_tag_input(Some(input))
    }

    #[test]
    fn test_simple_space_delimited_tags() {
        assert_eq!(parse("one"), vec!["one"]);
        assert_eq!(parse("one two"), vec!["one", "two"]);
        assert_eq!(parse("one two three"), vec!["one", "two", "three"]);
        assert_eq!(parse("one one two two"), vec!["one", "two"]);
    }

    #[test]
    fn test_any_whitespace_separates() {
        assert_eq!(parse("one\ttwo\n  three"), vec!["one", "two", "three"]);
    }

    #[test]
    fn test_comma_delimited_multiple_words() {
        assert_eq!(parse(",one"), vec!["one"]);
        assert_eq!(parse(",one two"), vec!["one two"]);
        assert_eq!(parse(",one two three"), vec!["one two three"]);
        assert_eq!(
            parse("a-one, a-two and a-three"),
            vec!["a-one", "a-two and a-three"]
        );
    }

    #[test]
    fn test_comma_mode_trims_pieces() {
        assert_eq!(parse(",  , foo   ,   bar ,  ,baz, , ,"), vec!["foo", "bar", "baz"]);
        assert_eq!(parse("foo,bar"), vec!["foo", "bar"]);
    }

    #[test]
    fn test_double_quoted_multiple_words() {
        assert_eq!(parse("\"one"), vec!["one"]);
        assert_eq!(parse("\"one two"), vec!["one", "two"]);
        assert_eq!(parse("\"one two three"), vec!["one", "two", "three"]);
        assert_eq!(parse("\"one two\""), vec!["one two"]);
        assert_eq!(
            parse("a-one \"a-two and a-three\""),
            vec!["a-one", "a-two and a-three"]
        );
    }

    #[test]
    fn test_no_loose_commas_split_on_spaces() {
        assert_eq!(parse("one two \"thr,ee\""), vec!["one", "two", "thr,ee"]);
    }

    #[test]
    fn test_loose_commas_split_on_commas() {
        assert_eq!(parse("\"one\", two three"), vec!["one", "two three"]);
    }

    #[test]
    fn test_double_quotes_can_contain_commas() {
        assert_eq!(
            parse("a-one \"a-two, and a-three\""),
            vec!["a-one", "a-two, and a-three"]
        );
        assert_eq!(parse("\"two\", one, one, two, \"one\""), vec!["two", "one"]);
    }

    #[test]
    fn test_degenerate_input() {
        assert!(parse_tag_input(None).is_empty());
        assert!(parse("").is_empty());
        assert!(parse("\"").is_empty());
        assert!(parse("\"\"").is_empty());
        assert!(parse(&"\"".repeat(7)).is_empty());
        assert!(parse(",,,,,,").is_empty());
        assert!(parse("   ").is_empty());
        assert_eq!(parse("\",\",\",\",\",\",\",\""), vec![","]);
    }

    #[test]
    fn test_unterminated_quote_is_unquoted() {
        assert_eq!(
            parse("a-one \"a-two\" and \"a-three"),
            vec!["a-one", "a-two", "and", "a-three"]
        );
    }

    #[test]
    fn test_unterminated_quote_with_comma_switches_mode() {
        assert_eq!(parse("one two \"three, four five"), vec!["one two", "three", "four five"]);
    }

    #[test]
    fn test_unicode_names_survive() {
        assert_eq!(parse("foo,ŠĐĆŽćžšđ"), vec!["foo", "ŠĐĆŽćžšđ"]);
    }

    #[test]
    fn test_forced_delimiter() {
        assert_eq!(
            parse_tag_input_with(Some("one two; three, four ;\"fi;ve\""), Some(';')),
            vec!["one two", "three, four", "fi;ve"]
        );
    }

    #[test]
    fn test_render_plain_names() {
        assert_eq!(render_tags(&["plain"]), "plain");
        assert_eq!(render_tags(&["plain", "spa ces"]), "plain, spa ces");
        assert_eq!(render_tags::<&str>(&[]), "");
    }

    #[test]
    fn test_render_quotes_commas() {
        assert_eq!(
            render_tags(&["plain", "spa ces", "com,ma"]),
            "plain, spa ces, \"com,ma\""
        );
        assert_eq!(render_tags(&["com,ma", "spa ces"]), "\"com,ma\", spa ces");
    }

    #[test]
    fn test_render_lone_multi_word_name() {
        assert_eq!(render_tags(&["spa ces"]), "\"spa ces\"");
        assert_eq!(parse(&render_tags(&["spa ces"])), vec!["spa ces"]);
    }

    #[test]
    fn test_render_parse_round_trip() {
        let cases: Vec<Vec<&str>> = vec![
            vec!["one"],
            vec!["one", "two", "three"],
            vec!["plain", "com,ma"],
            vec!["com,ma", "plain"],
            vec!["a-one", "a-two and a-three"],
            vec!["x, y", "z"],
        ];
        for names in cases {
            let rendered = render_tags(&names);
            assert_eq!(parse(&rendered), names, "round trip of {:?}", rendered);
        }
    }

    #[test]
    fn test_render_with_forced_delimiter() {
        let names = ["one two", "fi;ve"];
        let rendered = render_tags_with(&names, Some(';'));
        assert_eq!(rendered, "one two; \"fi;ve\"");
        assert_eq!(parse_tag_input_with(Some(&rendered), Some(';')), names);
    }

    #[test]
    fn test_normalize_lowercases_and_dedupes() {
        let names = vec!["foO".to_string(), "FOO".to_string(), "bAr".to_string()];
        assert_eq!(normalize_names(names.clone(), true), vec!["foo", "bar"]);
        assert_eq!(normalize_names(names, false), vec!["foO", "FOO", "bAr"]);
    }

    #[test]
    fn test_validate_single_tag() {
        assert!(validate_single_tag("f-o_1o", 50).is_ok());
        assert!(validate_single_tag("ŠĐĆŽćžšđ", 50).is_ok());
        assert_eq!(
            validate_single_tag("f o o", 50).unwrap_err(),
            INVALID_CHARACTERS_MESSAGE
        );
        assert!(validate_single_tag("    ", 50).is_err());
        assert!(validate_single_tag("one,two", 50).is_err());
        assert!(validate_single_tag("", 50).is_err());
    }

    #[test]
    fn test_validate_tag_name_accepts_multi_word() {
        assert!(validate_tag_name("a-two and a-three", 50).is_ok());
        assert!(validate_tag_name("a-two, and a-three", 50).is_ok());
        assert!(validate_tag_name("cheese", 50).is_ok());
    }

    #[test]
    fn test_validate_tag_name_rejects_bad_characters() {
        for name in ["", ",", "semi;colon", "dot.ted", "quo\"te", " lead", "trail "] {
            assert_eq!(
                validate_tag_name(name, 50).unwrap_err(),
                INVALID_CHARACTERS_MESSAGE,
                "{:?}",
                name
            );
        }
    }

    #[test]
    fn test_length_limit_is_in_characters() {
        let ok = "qwertyuiopasdfghjklzxcvbnmqwertyuiopasdfghjklzxcvb";
        assert_eq!(ok.chars().count(), 50);
        assert!(validate_tag_name(ok, 50).is_ok());

        let long = format!("{}n", ok);
        assert_eq!(
            validate_tag_name(&long, 50).unwrap_err(),
            "Tag names must be no longer than 50 characters."
        );

        let wide = "ž".repeat(50);
        assert!(validate_single_tag(&wide, 50).is_ok());
    }
}
