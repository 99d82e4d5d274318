use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;

// Default tokenizer. The index core treats terms as opaque strings; anything
// pure and deterministic can stand in for this module. Tokens are lowercased,
// accent-folded, stripped to letters, cleaned of triple-letter runs and
// filtered against stop words and a 3..=24 length window.

const MIN_TERM_LEN: usize = 3;
const MAX_TERM_LEN: usize = 24;

const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "has", "he", "in", "is", "it",
    "its", "of", "on", "that", "the", "to", "was", "will", "with", "this", "but", "they", "have",
    "had", "what", "when", "where", "who", "which", "why", "how", "all", "each", "every", "both",
    "few", "more", "most", "other", "some", "such", "no", "nor", "not", "only", "own", "same",
    "so", "than", "too", "very", "can", "just", "should", "now",
];

static STOP_WORD_SET: Lazy<HashSet<&'static str>> =
    Lazy::new(|| STOP_WORDS.iter().copied().collect());

static NON_ALPHA: Lazy<Regex> = Lazy::new(|| Regex::new("[^a-z]").unwrap());

fn fold_accent(c: char) -> char {
    match c {
        'á' | 'à' | 'â' | 'ä' | 'å' | 'ã' => 'a',
        'é' | 'è' | 'ê' | 'ë' => 'e',
        'í' | 'ì' | 'î' | 'ï' => 'i',
        'ó' | 'ò' | 'ô' | 'ö' | 'õ' => 'o',
        'ú' | 'ù' | 'û' | 'ü' => 'u',
        'ñ' => 'n',
        _ => c,
    }
}

// Drops runs of three equal consecutive letters from tokens longer than 3
// characters, so acronyms like IEEE shrink instead of flooding the
// vocabulary with repeated-letter noise.
fn remove_consecutive_letters(mut term: String) -> String {
    if term.len() < 4 {
        return term;
    }
    let mut changed = true;
    while changed {
        changed = false;
        let bytes = term.as_bytes();
        let mut i = 0;
        while i + 2 < bytes.len() {
            if bytes[i] == bytes[i + 1] && bytes[i] == bytes[i + 2] {
                term.replace_range(i..i + 3, "");
                changed = true;
                break;
            }
            i += 1;
        }
    }
    term
}

/// Converts a raw token into a term, or `None` when nothing indexable
/// remains. Pure and deterministic.
pub fn normalize(token: &str) -> Option<String> {
    let lowered = token.trim().to_lowercase();
    let folded: String = lowered.chars().map(fold_accent).collect();
    let mut term = NON_ALPHA.replace_all(&folded, "").into_owned();
    // Unescaped HTML entities leave name fragments behind once the
    // punctuation is stripped ("&oacute;" -> "oacute", "&raquo;" -> "raquo").
    if term.contains("acute") {
        term = term.replace("acute", "");
    }
    if term.contains("raquo") {
        term = term.replace("raquo", "");
    }
    let term = remove_consecutive_letters(term);

    if STOP_WORD_SET.contains(term.as_str()) {
        return None;
    }
    if term.len() < MIN_TERM_LEN || term.len() > MAX_TERM_LEN {
        return None;
    }
    Some(term)
}
