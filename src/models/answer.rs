use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Byte span inside an answer's context; `context[start..end]` is the answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

/// An extracted answer, scored in `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub answer: String,
    pub score: f32,
    pub context: String,
    pub document_id: String,
    pub offsets_in_context: Span,
    #[serde(default)]
    pub meta: Map<String, Value>,
}

/// Highest score first; ties keep their original order.
pub fn sort_answers(answers: &mut [Answer]) {
    answers.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
}
