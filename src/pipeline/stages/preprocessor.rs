use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

use crate::models::Document;
use crate::pipeline::types::{parse_overrides, Payload, Stage, StageError, StageParams};
use crate::text::sentences;

const PARAMS: &[&str] = &[
    "clean_whitespace",
    "clean_empty_lines",
    "split_by",
    "split_length",
    "split_overlap",
];

static BLANK_LINES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{3,}").unwrap());
static PASSAGE_BREAK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n\s*\n").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitBy {
    Word,
    Sentence,
    Passage,
    None,
}

fn yes() -> bool {
    true
}

fn default_split_by() -> SplitBy {
    SplitBy::Word
}

fn default_split_length() -> usize {
    200
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PreProcessorConfig {
    #[serde(default = "yes")]
    pub clean_whitespace: bool,
    #[serde(default = "yes")]
    pub clean_empty_lines: bool,
    #[serde(default = "default_split_by")]
    pub split_by: SplitBy,
    #[serde(default = "default_split_length")]
    pub split_length: usize,
    #[serde(default)]
    pub split_overlap: usize,
}

impl Default for PreProcessorConfig {
    fn default() -> Self {
        Self {
            clean_whitespace: true,
            clean_empty_lines: true,
            split_by: default_split_by(),
            split_length: default_split_length(),
            split_overlap: 0,
        }
    }
}

impl PreProcessorConfig {
    pub fn validate(&self) -> Result<(), StageError> {
        if self.split_by != SplitBy::None {
            if self.split_length == 0 {
                return Err(StageError::InvalidParams("split_length must be at least 1".into()));
            }
            if self.split_overlap >= self.split_length {
                return Err(StageError::InvalidParams(format!(
                    "split_overlap ({}) must be smaller than split_length ({})",
                    self.split_overlap, self.split_length
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Default, Deserialize)]
struct PreProcessorOverrides {
    clean_whitespace: Option<bool>,
    clean_empty_lines: Option<bool>,
    split_by: Option<SplitBy>,
    split_length: Option<usize>,
    split_overlap: Option<usize>,
}

/// Cleans document text and splits it into overlapping windows.
pub struct PreProcessor {
    config: PreProcessorConfig,
}

impl PreProcessor {
    pub fn new(config: PreProcessorConfig) -> Self {
        Self { config }
    }
}

impl Stage for PreProcessor {
    fn kind(&self) -> &'static str {
        "PreProcessor"
    }

    fn accepted_params(&self) -> &'static [&'static str] {
        PARAMS
    }

    fn run(&self, input: Payload, params: &StageParams) -> Result<Payload, StageError> {
        let o: PreProcessorOverrides = parse_overrides(params, PARAMS)?;
        let config = PreProcessorConfig {
            clean_whitespace: o.clean_whitespace.unwrap_or(self.config.clean_whitespace),
            clean_empty_lines: o.clean_empty_lines.unwrap_or(self.config.clean_empty_lines),
            split_by: o.split_by.unwrap_or(self.config.split_by),
            split_length: o.split_length.unwrap_or(self.config.split_length),
            split_overlap: o.split_overlap.unwrap_or(self.config.split_overlap),
        };
        config.validate()?;

        let mut documents = Vec::new();
        for doc in &input.documents {
            let text = clean(&doc.content, &config);
            for (split_id, chunk) in split(&text, &config).into_iter().enumerate() {
                let mut meta = doc.meta.clone();
                meta.insert("_split_id".into(), Value::from(split_id));
                documents.push(Document::new(chunk).with_meta(meta));
            }
        }

        Ok(Payload { documents, ..input })
    }
}

fn clean(text: &str, config: &PreProcessorConfig) -> String {
    let mut text = text.to_string();
    if config.clean_whitespace {
        text = text
            .lines()
            .map(|l| l.split_whitespace().collect::<Vec<_>>().join(" "))
            .collect::<Vec<_>>()
            .join("\n");
    }
    if config.clean_empty_lines {
        text = BLANK_LINES.replace_all(&text, "\n\n").into_owned();
    }
    text.trim().to_string()
}

fn split(text: &str, config: &PreProcessorConfig) -> Vec<String> {
    let units: Vec<String> = match config.split_by {
        SplitBy::None => {
            return if text.is_empty() { Vec::new() } else { vec![text.to_string()] };
        }
        SplitBy::Word => text.split_whitespace().map(str::to_string).collect(),
        SplitBy::Sentence => sentences(text).into_iter().map(|(_, s)| s.to_string()).collect(),
        SplitBy::Passage => PASSAGE_BREAK
            .split(text)
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect(),
    };

    let joiner = if config.split_by == SplitBy::Passage { "\n\n" } else { " " };
    let step = config.split_length - config.split_overlap;

    let mut chunks = Vec::new();
    let mut start = 0;
    while start < units.len() {
        let end = (start + config.split_length).min(units.len());
        chunks.push(units[start..end].join(joiner));
        if end == units.len() {
            break;
        }
        start += step;
    }
    chunks
}
