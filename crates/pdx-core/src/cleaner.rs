//! Line-level normalization of script text
//!
//! These helpers work on single lines and never look at nesting. They are
//! used to compare statements regardless of spacing and to pull simple
//! `key = value` pairs out of a line without running the full parser.

use once_cell::sync::Lazy;
use regex::Regex;

/// Key/value separator of the script language
pub const VARIABLE_SEPARATOR: char = '=';
/// Opening bracket of a block
pub const OPENING_BRACKET: char = '{';
/// Closing bracket of a block
pub const CLOSING_BRACKET: char = '}';

static QUOTES_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new("\".*?\"").expect("quote pattern is valid"));

/// Spaces dropped around structural tokens, applied in order
const CLEANER_CONVERSIONS: &[(&str, &str)] = &[
    (" =", "="),
    ("= ", "="),
    (" {", "{"),
    ("{ ", "{"),
    (" }", "}"),
    ("} ", "}"),
];

/// Padding restored around structural tokens, applied in order
const PRETTIFY_CONVERSIONS: &[(&str, &str)] = &[("=", " = "), ("{", " { "), ("}", " } ")];

fn collapse_spaces(text: &str) -> String {
    text.trim()
        .replace('\t', " ")
        .split(' ')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn is_bracket(c: char) -> bool {
    c == OPENING_BRACKET || c == CLOSING_BRACKET
}

/// Collapse whitespace and remove the spaces adjacent to `=`, `{` and `}`
///
/// `x = y`, `x =y` and `x    =    y` all clean to `x=y`.
pub fn clean_whitespace(line: &str) -> String {
    if line.is_empty() {
        return String::new();
    }
    let mut cleaned = collapse_spaces(line);
    for (from, to) in CLEANER_CONVERSIONS {
        cleaned = cleaned.replace(from, to);
    }
    cleaned
}

/// Inverse of [`clean_whitespace`]: one space on both sides of every
/// structural token. Applying it twice gives the same output as once.
pub fn prettify_line(line: &str) -> String {
    let mut cleaned = clean_whitespace(line);
    for (from, to) in PRETTIFY_CONVERSIONS {
        cleaned = cleaned.replace(from, to);
    }
    collapse_spaces(&cleaned)
}

/// Take the leading run of `text` up to the first whitespace or bracket
pub fn clean_parsed_text(text: &str) -> String {
    text.chars()
        .take_while(|c| !c.is_whitespace() && !is_bracket(*c))
        .collect()
}

/// Remove every space and tab, used to compare code fragments
pub fn strip_whitespace(text: &str) -> String {
    text.replace([' ', '\t'], "").trim().to_string()
}

/// Extract the text on the left of `token`
///
/// The first occurrence of `token` that starts the line or directly follows a
/// non-whitespace character is used, earlier rejected occurrences are
/// skipped. Returns an empty string when no such occurrence exists.
pub fn extract_key(line: &str, token: &str) -> String {
    let cleaned = clean_whitespace(line);
    let guard = |prev: Option<char>| prev.map_or(true, |c| !c.is_whitespace());
    let Some(index) = find_token(&cleaned, token, guard) else {
        return String::new();
    };
    extract_text(&cleaned[..index])
}

/// Extract the text on the right of `token`
///
/// Tokens that begin with an identifier character must start the line or
/// follow whitespace or a bracket, so `id=` does not match inside `my_id=`.
/// Structural tokens such as `=` may touch anything.
pub fn extract_value(line: &str, token: &str) -> String {
    let cleaned = clean_whitespace(line);
    let guarded = token
        .chars()
        .next()
        .is_some_and(|c| c.is_alphanumeric() || c == '_' || c == '@');
    let guard = |prev: Option<char>| {
        !guarded || prev.map_or(true, |c| c.is_whitespace() || is_bracket(c))
    };
    let Some(index) = find_token(&cleaned, token, guard) else {
        return String::new();
    };
    split_ignore_case(&cleaned[index..], token)
        .first()
        .map(|part| extract_text(part))
        .unwrap_or_default()
}

fn extract_text(part: &str) -> String {
    let part = part.trim();
    if part.starts_with('"') {
        QUOTES_REGEX
            .find(part)
            .map(|m| m.as_str().replace('"', ""))
            .unwrap_or_default()
    } else {
        clean_parsed_text(&part.replace('"', ""))
    }
}

/// Byte offset of the first case-insensitive match of `token` whose
/// preceding character satisfies `guard`
fn find_token(text: &str, token: &str, guard: impl Fn(Option<char>) -> bool) -> Option<usize> {
    if token.is_empty() {
        return None;
    }
    let haystack = text.to_ascii_lowercase();
    let needle = token.to_ascii_lowercase();
    haystack
        .match_indices(&needle)
        .map(|(index, _)| index)
        .find(|&index| guard(text[..index].chars().next_back()))
}

/// Split on every case-insensitive occurrence of `token`, dropping empty parts
fn split_ignore_case<'a>(text: &'a str, token: &str) -> Vec<&'a str> {
    let haystack = text.to_ascii_lowercase();
    let needle = token.to_ascii_lowercase();
    let mut parts = Vec::new();
    let mut start = 0;
    for (index, _) in haystack.match_indices(&needle) {
        parts.push(&text[start..index]);
        start = index + needle.len();
    }
    parts.push(&text[start..]);
    parts.into_iter().filter(|p| !p.is_empty()).collect()
}
