use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashSet;

/// Tokens with this many characters or fewer are dropped ("a", "to", "is").
pub const MIN_TOKEN_CHARS: usize = 3;

lazy_static! {
    static ref WORD: Regex = Regex::new(r"\w+").expect("valid regex");
}

/// Tokenize text into lowercase runs of word characters (letters, digits, underscore).
///
/// Tokens shorter than [`MIN_TOKEN_CHARS`] are discarded. Order of appearance is
/// kept and duplicates are not removed; see [`unique_tokens`] for the set view.
pub fn tokenize(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    WORD.find_iter(&lowered)
        .map(|m| m.as_str())
        .filter(|word| word.chars().count() >= MIN_TOKEN_CHARS)
        .map(str::to_string)
        .collect()
}

/// Distinct tokens of `text`, in order of first appearance.
pub fn unique_tokens(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    tokenize(text)
        .into_iter()
        .filter(|token| seen.insert(token.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_tokenize() {
        let t = tokenize("Budget review: Q3 numbers, hiring_plan & roadmap!");
        assert_eq!(t, vec!["budget", "review", "numbers", "hiring_plan", "roadmap"]);
    }

    #[test]
    fn unique_keeps_first_appearance() {
        let t = unique_tokens("deploy the deploy pipeline then deploy");
        assert_eq!(t, vec!["deploy", "the", "pipeline", "then"]);
    }

    #[test]
    fn length_counts_characters_not_bytes() {
        // "ça" is two characters but three bytes
        assert!(tokenize("ça va").is_empty());
        assert_eq!(tokenize("ÉTÉ"), vec!["été"]);
    }
}
