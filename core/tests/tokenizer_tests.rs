use notes_core::tokenizer::{tokenize, unique_tokens};

#[test]
fn it_lowercases_and_splits_on_non_word_chars() {
    let toks = tokenize("Q3-Budget: APPROVED; follow_up w/ Finance.");
    assert_eq!(toks, vec!["budget", "approved", "follow_up", "finance"]);
}

#[test]
fn it_drops_short_tokens() {
    assert!(tokenize("a an at is to").is_empty());
    assert_eq!(tokenize("go big or go home"), vec!["big", "home"]);
}

#[test]
fn it_keeps_digits_and_duplicates() {
    let toks = tokenize("Release 2024 then release 2025");
    assert_eq!(toks, vec!["release", "2024", "then", "release", "2025"]);
    assert_eq!(unique_tokens("Release 2024 then release 2025"), vec!["release", "2024", "then", "2025"]);
}

#[test]
fn it_handles_empty_and_whitespace() {
    assert!(tokenize("").is_empty());
    assert!(tokenize("   \n\t ").is_empty());
    assert!(tokenize("!!! ... ???").is_empty());
}

#[test]
fn it_is_idempotent() {
    let text = "Discussed onboarding, hiring plan and the Q4 roadmap.";
    assert_eq!(tokenize(text), tokenize(text));
}
