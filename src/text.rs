//! Lexical helpers shared by the BM25 index and the extractive reader.

use std::sync::LazyLock;

use regex::Regex;

/// Two or more word characters, matching the usual BM25 tokenisation.
static TOKEN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?u)\b\w\w+\b").unwrap());

/// Any word, including single letters ("I", "a").
static WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?u)\b[\w'-]+\b").unwrap());

/// Sentence terminator followed by whitespace.
static SENTENCE_END: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[.!?]+\s+").unwrap());

/// Function words ignored when matching a question against a passage.
const STOPWORDS: &[&str] = &[
    "a", "about", "an", "and", "are", "as", "at", "be", "by", "did", "do", "does", "for",
    "from", "has", "have", "how", "i", "in", "is", "it", "its", "many", "me", "much", "my",
    "of", "on", "or", "that", "the", "their", "there", "this", "to", "was", "we", "were",
    "what", "when", "where", "which", "who", "whom", "whose", "why", "with", "you", "your",
];

/// Lower-cased BM25 tokens.
pub fn tokenize(text: &str) -> Vec<String> {
    TOKEN
        .find_iter(text)
        .map(|m| m.as_str().to_lowercase())
        .collect()
}

pub fn is_stopword(word: &str) -> bool {
    STOPWORDS.contains(&word.to_lowercase().as_str())
}

/// Light plural/verb-s stemming: "lives" → "live", "cities" → "city".
pub fn stem(word: &str) -> String {
    let w = word.to_lowercase();
    if w.len() > 4 && w.ends_with("ies") {
        return format!("{}y", &w[..w.len() - 3]);
    }
    if w.len() > 3 && w.ends_with('s') && !w.ends_with("ss") {
        return w[..w.len() - 1].to_string();
    }
    w
}

/// Stems of the non-stopword terms in `text`, in order, without duplicates.
pub fn content_terms(text: &str) -> Vec<String> {
    let mut terms: Vec<String> = Vec::new();
    for m in WORD.find_iter(text) {
        if is_stopword(m.as_str()) {
            continue;
        }
        let s = stem(m.as_str());
        if !terms.contains(&s) {
            terms.push(s);
        }
    }
    terms
}

/// A word with its byte range in the source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WordSpan<'a> {
    pub text: &'a str,
    pub start: usize,
    pub end: usize,
}

pub fn words(text: &str) -> Vec<WordSpan<'_>> {
    WORD.find_iter(text)
        .map(|m| WordSpan {
            text: m.as_str(),
            start: m.start(),
            end: m.end(),
        })
        .collect()
}

/// Split into sentences, returning `(byte_start, sentence)` pairs.
pub fn sentences(text: &str) -> Vec<(usize, &str)> {
    let mut out = Vec::new();
    let mut start = 0;
    for m in SENTENCE_END.find_iter(text) {
        let end = m.start() + m.as_str().trim_end().len();
        push_trimmed(text, start, end, &mut out);
        start = m.end();
    }
    push_trimmed(text, start, text.len(), &mut out);
    out
}

fn push_trimmed<'a>(text: &'a str, start: usize, end: usize, out: &mut Vec<(usize, &'a str)>) {
    let raw = &text[start..end];
    let trimmed = raw.trim_start();
    let offset = start + (raw.len() - trimmed.len());
    let trimmed = trimmed.trim_end();
    if !trimmed.is_empty() {
        out.push((offset, trimmed));
    }
}

/// Largest char boundary `<= idx`.
pub fn floor_char_boundary(text: &str, idx: usize) -> usize {
    let mut i = idx.min(text.len());
    while !text.is_char_boundary(i) {
        i -= 1;
    }
    i
}

/// Smallest char boundary `>= idx`.
pub fn ceil_char_boundary(text: &str, idx: usize) -> usize {
    let mut i = idx.min(text.len());
    while !text.is_char_boundary(i) {
        i += 1;
    }
    i
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenize_drops_single_chars_and_lowercases() {
        assert_eq!(
            tokenize("My name is Carla and I live in Berlin."),
            vec!["my", "name", "is", "carla", "and", "live", "in", "berlin"]
        );
    }

    #[test]
    fn content_terms_strip_question_words_and_stem() {
        assert_eq!(content_terms("Who lives in Berlin?"), vec!["live", "berlin"]);
    }

    #[test]
    fn stem_handles_common_suffixes() {
        assert_eq!(stem("cities"), "city");
        assert_eq!(stem("lives"), "live");
        assert_eq!(stem("class"), "class");
        assert_eq!(stem("is"), "is");
    }

    #[test]
    fn sentences_keep_offsets() {
        let text = "First one. Second one!  Third";
        let s = sentences(text);
        assert_eq!(s.len(), 3);
        assert_eq!(s[0], (0, "First one."));
        assert_eq!(&text[s[1].0..s[1].0 + s[1].1.len()], "Second one!");
        assert_eq!(s[2].1, "Third");
    }

    #[test]
    fn char_boundaries_are_respected() {
        let text = "héllo";
        assert_eq!(floor_char_boundary(text, 2), 1);
        assert_eq!(ceil_char_boundary(text, 2), 3);
    }
}
