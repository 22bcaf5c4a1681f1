//! Lexical extractive reader.
//!
//! Picks answer spans (capitalised phrases and numbers) out of the sentences
//! that share the most content terms with the question. Scores mix term
//! overlap, distance to the nearest matched term, and the retriever's rank.

use std::collections::HashSet;

use serde::Deserialize;

use crate::models::{sort_answers, Answer, Document, Span};
use crate::pipeline::types::{parse_overrides, Payload, Stage, StageError, StageParams};
use crate::text::{ceil_char_boundary, content_terms, floor_char_boundary, is_stopword, sentences, stem, words};

const PARAMS: &[&str] = &["top_k", "context_window_size"];

const OVERLAP_WEIGHT: f32 = 0.6;
const PROXIMITY_WEIGHT: f32 = 0.25;
const RETRIEVAL_WEIGHT: f32 = 0.15;

fn default_top_k() -> usize {
    5
}

fn default_context_window() -> usize {
    150
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReaderConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_context_window")]
    pub context_window_size: usize,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            context_window_size: default_context_window(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ReaderOverrides {
    top_k: Option<usize>,
    context_window_size: Option<usize>,
}

pub struct ExtractiveReader {
    config: ReaderConfig,
}

impl ExtractiveReader {
    pub fn new(config: ReaderConfig) -> Self {
        Self { config }
    }
}

impl Stage for ExtractiveReader {
    fn kind(&self) -> &'static str {
        "ExtractiveReader"
    }

    fn accepted_params(&self) -> &'static [&'static str] {
        PARAMS
    }

    fn run(&self, input: Payload, params: &StageParams) -> Result<Payload, StageError> {
        let overrides: ReaderOverrides = parse_overrides(params, PARAMS)?;
        let top_k = overrides.top_k.unwrap_or(self.config.top_k);
        let window = overrides
            .context_window_size
            .unwrap_or(self.config.context_window_size);

        let query = input
            .query
            .as_deref()
            .ok_or_else(|| StageError::Failed("reader requires a query".into()))?;

        let mut answers = extract_answers(query, &input.documents, window);
        answers.truncate(top_k);

        Ok(Payload { answers, ..input })
    }
}

/// Candidate answer words: capitalised or numeric, not a function word,
/// and not one of the question's own terms.
fn is_candidate(word: &str, terms: &[String]) -> bool {
    let first = match word.chars().next() {
        Some(c) => c,
        None => return false,
    };
    (first.is_uppercase() || first.is_ascii_digit())
        && !is_stopword(word)
        && !terms.contains(&stem(word))
}

pub fn extract_answers(query: &str, documents: &[Document], window: usize) -> Vec<Answer> {
    let terms = content_terms(query);
    if terms.is_empty() {
        return Vec::new();
    }

    let max_score = documents
        .iter()
        .filter_map(|d| d.score)
        .fold(0.0f32, f32::max);

    let mut answers: Vec<Answer> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    for doc in documents {
        let retrieval = match doc.score {
            Some(s) if max_score > 0.0 => (s / max_score).clamp(0.0, 1.0),
            _ => 1.0,
        };

        for (offset, sentence) in sentences(&doc.content) {
            let ws = words(sentence);
            let stems: Vec<String> = ws.iter().map(|w| stem(w.text)).collect();

            let matched: Vec<usize> = (0..ws.len()).filter(|&i| terms.contains(&stems[i])).collect();
            let distinct = terms.iter().filter(|t| stems.contains(t)).count();
            if distinct == 0 {
                continue;
            }
            let overlap = distinct as f32 / terms.len() as f32;

            for (first, last) in candidate_runs(sentence, &ws, &terms) {
                let distance = matched
                    .iter()
                    .map(|&p| if p < first { first - p } else { p.saturating_sub(last) })
                    .min()
                    .unwrap_or(usize::MAX);
                let proximity = 1.0 / (1.0 + distance as f32);
                let score = OVERLAP_WEIGHT * overlap
                    + PROXIMITY_WEIGHT * proximity
                    + RETRIEVAL_WEIGHT * retrieval;

                let start = offset + ws[first].start;
                let end = offset + ws[last].end;
                let answer = doc.content[start..end].to_string();

                let ctx_start = floor_char_boundary(&doc.content, start.saturating_sub(window / 2));
                let ctx_end = ceil_char_boundary(&doc.content, end + window / 2);

                let candidate = Answer {
                    answer,
                    score,
                    context: doc.content[ctx_start..ctx_end].to_string(),
                    document_id: doc.id.clone(),
                    offsets_in_context: Span {
                        start: start - ctx_start,
                        end: end - ctx_start,
                    },
                    meta: doc.meta.clone(),
                };

                let key = candidate.answer.to_lowercase();
                if seen.insert(key.clone()) {
                    answers.push(candidate);
                } else if let Some(existing) = answers
                    .iter_mut()
                    .find(|a| a.answer.to_lowercase() == key && a.score < candidate.score)
                {
                    *existing = candidate;
                }
            }
        }
    }

    sort_answers(&mut answers);
    answers
}

/// Consecutive candidate words separated only by whitespace, as
/// inclusive `(first, last)` word indexes.
fn candidate_runs(sentence: &str, ws: &[crate::text::WordSpan<'_>], terms: &[String]) -> Vec<(usize, usize)> {
    let mut runs = Vec::new();
    let mut current: Option<(usize, usize)> = None;

    for (i, w) in ws.iter().enumerate() {
        if !is_candidate(w.text, terms) {
            if let Some(run) = current.take() {
                runs.push(run);
            }
            continue;
        }
        current = match current {
            Some((first, last)) if sentence[ws[last].end..w.start].trim().is_empty() => Some((first, i)),
            Some(run) => {
                runs.push(run);
                Some((i, i))
            }
            None => Some((i, i)),
        };
    }
    if let Some(run) = current {
        runs.push(run);
    }
    runs
}
