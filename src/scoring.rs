//! Transcript scoring.
//!
//! Recognizers return punctuation, casing, and filler the player never
//! said, so matching runs on normalized text. Containment is deliberately
//! forgiving for young speakers; the one hard rejection is a transcript
//! that echoes the prompt itself ("say apple" is the machine, not the kid).

use std::collections::HashSet;

/// Words too common to count as evidence that two phrases share content.
const DEFAULT_EXCLUDED: &[&str] = &["go", "to"];

/// Lowercase, strip punctuation, collapse whitespace.
pub fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last_was_space = true;
    for ch in text.chars() {
        if ch.is_alphanumeric() {
            out.extend(ch.to_lowercase());
            last_was_space = false;
        } else if ch.is_whitespace() && !last_was_space {
            out.push(' ');
            last_was_space = true;
        }
    }
    while out.ends_with(' ') {
        out.pop();
    }
    out
}

/// True when the two phrases share at least one word, ignoring the
/// excluded stop words. `None` uses the default exclusion set. Both sides
/// are normalized first, so casing and punctuation never block a match.
pub fn has_common_word(a: &str, b: &str, exclude: Option<&HashSet<String>>) -> bool {
    let default: HashSet<String> = DEFAULT_EXCLUDED.iter().map(|w| (*w).to_string()).collect();
    let exclude = exclude.unwrap_or(&default);
    let words_a = content_words(a, exclude);
    if words_a.is_empty() {
        return false;
    }
    let words_b = content_words(b, exclude);
    words_a.iter().any(|w| words_b.contains(w))
}

fn content_words(text: &str, exclude: &HashSet<String>) -> HashSet<String> {
    normalize(text)
        .split_whitespace()
        .filter(|w| !exclude.contains(*w))
        .map(str::to_string)
        .collect()
}

/// Does the transcript count as a successful attempt at the prompt?
///
/// The normalized prompt must appear inside the normalized transcript, and
/// the transcript must not contain "say <prompt>", which means the
/// recognizer picked up the synthesized instruction instead of the player.
pub fn is_match(prompt: &str, transcript: &str) -> bool {
    let prompt = normalize(prompt);
    let transcript = normalize(transcript);
    if prompt.is_empty() || transcript.is_empty() {
        return false;
    }
    if !transcript.contains(&prompt) {
        return false;
    }
    !transcript.contains(&format!("say {prompt}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_punctuation_and_case() {
        assert_eq!(normalize("  Apple!  "), "apple");
        assert_eq!(normalize("I like   mangoes."), "i like mangoes");
        assert_eq!(normalize("..."), "");
    }

    #[test]
    fn containment_match() {
        assert!(is_match("apple", "Apple."));
        assert!(is_match("apple", "an apple please"));
        assert!(is_match("I like mangoes", "well, I like mangoes!"));
        assert!(!is_match("apple", "banana"));
        assert!(!is_match("apple", ""));
        assert!(!is_match("", "apple"));
    }

    #[test]
    fn prompt_echo_is_rejected() {
        assert!(!is_match("apple", "please say apple"));
        assert!(!is_match("apple", "Say apple!"));
        // The word after a real attempt still counts.
        assert!(is_match("apple", "apple, I said apple"));
    }

    #[test]
    fn common_words_ignore_stop_words() {
        assert!(has_common_word("go to school", "walk to school", None));
        assert!(!has_common_word("go to", "to go", None));
        assert!(!has_common_word("", "apple", None));
        let exclude: HashSet<String> = ["school".to_string()].into_iter().collect();
        assert!(!has_common_word("go school", "walk school", Some(&exclude)));
    }

    #[test]
    fn common_words_ignore_case_and_punctuation() {
        assert!(has_common_word("Apple pie", "apple tart", None));
        assert!(has_common_word("I like mangoes", "Mangoes!", None));
        assert!(!has_common_word("Apple", "banana", None));
    }
}
