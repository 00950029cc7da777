//! Text normalisation helpers shared by the prose analyzers.

use std::collections::BTreeSet;
use std::sync::OnceLock;

use rust_stemmers::{Algorithm, Stemmer};

static STEMMER: OnceLock<Stemmer> = OnceLock::new();

/// Common English function words that carry no subject content.
const STOPWORDS: &[&str] = &[
    "a", "about", "above", "after", "again", "against", "all", "also", "am", "an", "and", "any",
    "are", "as", "at", "be", "because", "been", "before", "being", "below", "between", "both",
    "but", "by", "can", "could", "did", "do", "does", "doing", "down", "during", "each", "few",
    "for", "from", "further", "had", "has", "have", "having", "he", "her", "here", "hers",
    "herself", "him", "himself", "his", "how", "i", "if", "in", "into", "is", "it", "its",
    "itself", "just", "may", "me", "might", "more", "most", "must", "my", "myself", "no", "nor",
    "not", "now", "of", "off", "on", "once", "only", "or", "other", "our", "ours", "ourselves",
    "out", "over", "own", "same", "shall", "she", "should", "so", "some", "such", "than", "that",
    "the", "their", "theirs", "them", "themselves", "then", "there", "these", "they", "this",
    "those", "through", "to", "too", "under", "until", "up", "upon", "us", "very", "was", "we",
    "were", "what", "when", "where", "which", "while", "who", "whom", "why", "will", "with",
    "would", "you", "your", "yours", "yourself", "yourselves",
];

/// Connectives that signal an organised argument.
const DISCOURSE_MARKERS: &[&str] = &[
    "firstly", "secondly", "thirdly", "finally", "therefore", "however", "moreover",
    "furthermore", "consequently", "thus", "hence", "because", "although", "whereas",
    "for example", "for instance", "in addition", "in conclusion", "on the other hand",
    "as a result", "in contrast", "similarly", "first", "second", "then", "next",
];

pub fn is_stopword(word: &str) -> bool {
    STOPWORDS.binary_search(&word).is_ok()
}

/// Lower-cased alphanumeric tokens.
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Content words: tokens that are not stopwords and are either numeric or
/// longer than two characters.
pub fn content_terms(text: &str) -> BTreeSet<String> {
    tokenize(text)
        .into_iter()
        .filter(|t| !is_stopword(t))
        .filter(|t| t.chars().count() > 2 || t.chars().all(|c| c.is_ascii_digit()))
        .map(|t| stem(&t))
        .collect()
}

fn stemmer() -> &'static Stemmer {
    STEMMER.get_or_init(|| Stemmer::create(Algorithm::English))
}

/// Porter stem of a lower-cased word, so "processes" matches "process".
pub fn stem(word: &str) -> String {
    stemmer().stem(word).into_owned()
}

/// Sentences split on terminal punctuation, semicolons and line breaks.
pub fn sentences(text: &str) -> Vec<&str> {
    text.split(['.', '!', '?', ';', '\n'])
        .map(str::trim)
        .filter(|s| s.chars().any(char::is_alphanumeric))
        .collect()
}

/// Paragraphs separated by blank lines.
pub fn paragraphs(text: &str) -> usize {
    let mut count = 0;
    let mut in_paragraph = false;
    for line in text.lines() {
        if line.trim().is_empty() {
            in_paragraph = false;
        } else if !in_paragraph {
            in_paragraph = true;
            count += 1;
        }
    }
    count
}

/// Number of distinct discourse markers in the text.
pub fn discourse_markers(text: &str) -> usize {
    let normalized = format!(" {} ", tokenize(text).join(" "));
    DISCOURSE_MARKERS
        .iter()
        .filter(|m| normalized.contains(&format!(" {m} ")))
        .count()
}

/// True when the text ends with sentence-closing punctuation.
pub fn ends_cleanly(text: &str) -> bool {
    text.trim_end()
        .chars()
        .last()
        .is_some_and(|c| matches!(c, '.' | '!' | '?' | ')' | '"' | '\'' | ']'))
}

/// Collapse whitespace and case for equality checks.
pub fn normalize(text: &str) -> String {
    tokenize(text).join(" ")
}
