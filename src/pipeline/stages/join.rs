use std::cmp::Ordering;

use serde::Deserialize;

use crate::models::{sort_answers, Document};
use crate::pipeline::types::{parse_overrides, Payload, Stage, StageError, StageParams};

const PARAMS: &[&str] = &["top_k_join"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinMode {
    /// Union of all inputs; duplicates keep their best score.
    #[default]
    Concatenate,
    /// Union of all inputs; duplicate scores are summed.
    Merge,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JoinConfig {
    #[serde(default)]
    pub join_mode: JoinMode,
    #[serde(default)]
    pub top_k_join: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct JoinOverrides {
    top_k_join: Option<usize>,
}

/// Joins the document lists of several upstream branches.
pub struct JoinDocuments {
    config: JoinConfig,
}

impl JoinDocuments {
    pub fn new(config: JoinConfig) -> Self {
        Self { config }
    }
}

impl Stage for JoinDocuments {
    fn kind(&self) -> &'static str {
        "JoinDocuments"
    }

    fn accepted_params(&self) -> &'static [&'static str] {
        PARAMS
    }

    fn combine(&self, inputs: Vec<Payload>) -> Payload {
        if self.config.join_mode == JoinMode::Concatenate {
            return Payload::merge(inputs);
        }

        let mut joined = Payload::default();
        for p in inputs {
            if joined.query.is_none() {
                joined.query = p.query;
            }
            joined.files.extend(p.files);
            joined.answers.extend(p.answers);
            joined.documents_written += p.documents_written;
            for doc in p.documents {
                match joined.documents.iter_mut().find(|d| d.id == doc.id) {
                    Some(existing) => {
                        existing.score = Some(existing.score.unwrap_or(0.0) + doc.score.unwrap_or(0.0));
                    }
                    None => joined.documents.push(doc),
                }
            }
        }
        sort_answers(&mut joined.answers);
        joined
    }

    fn run(&self, mut input: Payload, params: &StageParams) -> Result<Payload, StageError> {
        let overrides: JoinOverrides = parse_overrides(params, PARAMS)?;
        sort_by_score(&mut input.documents);
        if let Some(k) = overrides.top_k_join.or(self.config.top_k_join) {
            input.documents.truncate(k);
        }
        Ok(input)
    }
}

fn sort_by_score(documents: &mut [Document]) {
    documents.sort_by(|a, b| {
        b.score
            .unwrap_or(f32::MIN)
            .partial_cmp(&a.score.unwrap_or(f32::MIN))
            .unwrap_or(Ordering::Equal)
    });
}
