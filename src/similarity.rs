//! String similarity backends for fuzzy name matching

/// Similarity between two normalized names.
///
/// Implementations return a value in `[0, 1]`, are symmetric, return `1.0`
/// only for identical inputs and never increase as the edit distance grows.
pub trait Similarity: Send + Sync {
    fn similarity(&self, a: &str, b: &str) -> f64;

    fn name(&self) -> &'static str;
}

/// Normalized Levenshtein ratio. The default backend.
#[derive(Debug, Clone, Copy, Default)]
pub struct LevenshteinSimilarity;

impl Similarity for LevenshteinSimilarity {
    fn similarity(&self, a: &str, b: &str) -> f64 {
        strsim::normalized_levenshtein(a, b).clamp(0.0, 1.0)
    }

    fn name(&self) -> &'static str {
        "levenshtein"
    }
}

/// Jaro-Winkler similarity; favours names sharing a prefix
#[derive(Debug, Clone, Copy, Default)]
pub struct JaroWinklerSimilarity;

impl Similarity for JaroWinklerSimilarity {
    fn similarity(&self, a: &str, b: &str) -> f64 {
        if a == b {
            return 1.0;
        }
        // jaro_winkler can round up to 1.0 for long near-identical strings
        strsim::jaro_winkler(a, b).clamp(0.0, 1.0).min(1.0 - f64::EPSILON)
    }

    fn name(&self) -> &'static str {
        "jaro_winkler"
    }
}

/// Levenshtein ratio over the names with their words sorted.
///
/// Word order is ignored: "dutch royal shell" and "royal dutch shell" score
/// `1.0`, so identity here means "same multiset of words".
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenSortSimilarity;

impl Similarity for TokenSortSimilarity {
    fn similarity(&self, a: &str, b: &str) -> f64 {
        strsim::normalized_levenshtein(&sorted_tokens(a), &sorted_tokens(b)).clamp(0.0, 1.0)
    }

    fn name(&self) -> &'static str {
        "token_sort"
    }
}

fn sorted_tokens(s: &str) -> String {
    let mut words: Vec<&str> = s.split_whitespace().collect();
    words.sort_unstable();
    words.join(" ")
}
