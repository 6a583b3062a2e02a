//! Company name normalization
//!
//! Turns a raw company name into a comparable token form. The output is a
//! fixed point: `normalize(normalize(x)) == normalize(x)`.

use regex::Regex;
use std::sync::LazyLock;

/// Legal-form and holding-structure tokens removed from the end of a name
pub const LEGAL_SUFFIXES: &[&str] = &[
    "inc", "incorporated", "corp", "corporation", "ltd", "limited", "llc", "llp", "lp", "plc",
    "sa", "sas", "sarl", "ag", "gmbh", "bv", "nv", "spa", "srl", "co", "company", "asa", "ab",
    "oyj", "se", "pte", "pty", "kk", "group", "holding", "holdings",
];

// Removed outright so that "S.A." and "Inc." collapse to single tokens
static DROPPED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[.'’`]").expect("static pattern"));
static PUNCTUATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w\s&-]|-{2,}").expect("static pattern"));

/// Normalize a company name for matching.
///
/// Lowercases, drops dots and apostrophes, turns remaining punctuation into
/// spaces (internal hyphens and `&` survive), collapses whitespace and strips
/// trailing legal suffixes. The last remaining token is never stripped, so a
/// name made only of a suffix ("Holding") still normalizes to itself.
/// Blank input yields an empty string.
pub fn normalize(name: &str) -> String {
    tokens(name).join(" ")
}

/// Normalized name split into words
pub fn tokens(name: &str) -> Vec<String> {
    let lowered = name.to_lowercase();
    let dropped = DROPPED.replace_all(&lowered, "");
    let spaced = PUNCTUATION.replace_all(&dropped, " ");

    let mut words: Vec<String> = spaced
        .split_whitespace()
        .map(|w| w.trim_matches('-'))
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect();

    while words.len() > 1 && words.last().is_some_and(|w| is_legal_suffix(w)) {
        words.pop();
    }

    words
}

pub fn is_legal_suffix(word: &str) -> bool {
    LEGAL_SUFFIXES.contains(&word)
}
