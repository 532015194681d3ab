//! Token heuristics used by the fallback paths.

use once_cell::sync::Lazy;
use std::collections::BTreeSet;
use std::collections::HashSet;

/// Tokens shorter than this are ignored.
pub const MIN_TOKEN_LEN: usize = 3;

static STOPWORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "the", "and", "for", "are", "but", "not", "you", "all", "any", "can", "had", "her",
        "was", "one", "our", "out", "has", "have", "his", "how", "its", "may", "new", "now",
        "old", "see", "two", "way", "who", "did", "get", "got", "let", "say", "she", "too",
        "use", "this", "that", "with", "from", "they", "will", "would", "there", "their",
        "what", "when", "where", "which", "while", "into", "than", "then", "them", "been",
        "being", "were", "also", "should", "could", "does", "just", "like", "some", "such",
        "only", "other", "very", "after", "before", "about", "because", "these", "those",
        "here", "each", "issue", "please", "thanks",
    ]
    .into_iter()
    .collect()
});

/// Lowercase alphanumeric runs of at least [`MIN_TOKEN_LEN`] characters,
/// stop-words removed.
pub fn significant_tokens(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() >= MIN_TOKEN_LEN)
        .map(str::to_lowercase)
        .filter(|t| !STOPWORDS.contains(t.as_str()))
        .collect()
}

/// `|a ∩ b| / |a ∪ b|`, 0 when both sets are empty.
pub fn jaccard<T: Ord>(a: &BTreeSet<T>, b: &BTreeSet<T>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

/// Up to `limit` shared tokens in lexical order.
pub fn shared_terms(a: &BTreeSet<String>, b: &BTreeSet<String>, limit: usize) -> Vec<String> {
    a.intersection(b).take(limit).cloned().collect()
}

/// Quality of a free-text description by length.
pub fn input_quality(body: &str) -> f64 {
    match body.trim().chars().count() {
        0 => 0.2,
        n if n < 50 => 0.4,
        n if n < 200 => 0.7,
        _ => 1.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_significant_tokens_filters_short_and_stopwords() {
        let tokens = significant_tokens("The login page is BROKEN on v2 with SSO");
        let expected: BTreeSet<String> = ["login", "page", "broken", "sso"]
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(tokens, expected);
    }

    #[test]
    fn test_jaccard() {
        let a = significant_tokens("export csv unicode");
        let b = significant_tokens("export csv filenames");
        assert!((jaccard(&a, &b) - 0.5).abs() < 1e-9);
        assert_eq!(jaccard(&BTreeSet::<String>::new(), &BTreeSet::new()), 0.0);
        assert!((jaccard(&a, &a) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_shared_terms_limit() {
        let a = significant_tokens("alpha beta gamma delta");
        let b = significant_tokens("alpha beta gamma delta epsilon");
        assert_eq!(shared_terms(&a, &b, 3), vec!["alpha", "beta", "delta"]);
    }

    #[test]
    fn test_input_quality_bands() {
        assert_eq!(input_quality(""), 0.2);
        assert_eq!(input_quality("   "), 0.2);
        assert_eq!(input_quality("short"), 0.4);
        assert_eq!(input_quality(&"x".repeat(120)), 0.7);
        assert_eq!(input_quality(&"x".repeat(200)), 1.0);
    }
}
