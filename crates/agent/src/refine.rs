//! Query refinement for "about-entity" questions.
//!
//! "wer ist Mars?" is searched as "Mars", which also lets the assembler
//! match a stored article by name.

use regex_lite::Regex;
use std::sync::LazyLock;

static ENTITY_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)was weißt du über (.+)",
        r"(?i)wer ist (.+)",
        r"(?i)erzähl mir von (.+)",
        r"(?i)tell me about (.+)",
        r"(?i)who is (.+)",
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect()
});

/// Extract the entity a question asks about, or return the trimmed question.
///
/// Patterns are tried in order. The entity is sliced out of the question
/// itself so it keeps its casing; only phrasings that differ from a pattern
/// outside ASCII case fall back to the lowercased question.
pub fn refine_search_query(question: &str) -> String {
    let question = question.trim();
    let lower = question.to_lowercase();

    for pattern in ENTITY_PATTERNS.iter() {
        if let Some(entity) = entity(pattern, question).or_else(|| entity(pattern, &lower)) {
            return entity.to_string();
        }
    }

    question.to_string()
}

fn entity<'a>(pattern: &Regex, text: &'a str) -> Option<&'a str> {
    let captured = pattern.captures(text)?.get(1)?;
    let entity = captured
        .as_str()
        .trim()
        .trim_end_matches(['?', '.', '!'])
        .trim_end();
    (!entity.is_empty()).then_some(entity)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn german_and_english_phrasings() {
        assert_eq!(refine_search_query("wer ist Mars"), "Mars");
        assert_eq!(refine_search_query("Wer ist Albert Einstein?"), "Albert Einstein");
        assert_eq!(refine_search_query("Was weißt du über Ettlingen"), "Ettlingen");
        assert_eq!(refine_search_query("Erzähl mir von Rom!"), "Rom");
        assert_eq!(refine_search_query("Tell me about the Moon."), "the Moon");
        assert_eq!(refine_search_query("who is Ada Lovelace"), "Ada Lovelace");
    }

    #[test]
    fn other_questions_pass_through() {
        assert_eq!(refine_search_query("  How far is Mars?  "), "How far is Mars?");
        assert_eq!(refine_search_query(""), "");
    }

    #[test]
    fn casing_comes_from_the_captured_occurrence() {
        assert_eq!(refine_search_query("mars: wer ist Mars?"), "Mars");
        assert_eq!(refine_search_query("WER IST Ada"), "Ada");
    }

    #[test]
    fn empty_entity_is_not_a_match() {
        assert_eq!(refine_search_query("who is ?"), "who is ?");
    }
}
