use serde::Deserialize;
use serde_json::Value;

use crate::models::Document;
use crate::pipeline::types::{parse_overrides, Payload, Stage, StageError, StageParams};

const PARAMS: &[&str] = &["valid_extensions"];

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConverterConfig {
    /// Accepted file extensions (without dot). `None` accepts any file.
    #[serde(default)]
    pub valid_extensions: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
struct ConverterOverrides {
    valid_extensions: Option<Vec<String>>,
}

/// Turns UTF-8 text files into documents, one per file.
pub struct TextConverter {
    config: ConverterConfig,
}

impl TextConverter {
    pub fn new(config: ConverterConfig) -> Self {
        Self { config }
    }
}

impl Stage for TextConverter {
    fn kind(&self) -> &'static str {
        "TextConverter"
    }

    fn accepted_params(&self) -> &'static [&'static str] {
        PARAMS
    }

    fn run(&self, input: Payload, params: &StageParams) -> Result<Payload, StageError> {
        let overrides: ConverterOverrides = parse_overrides(params, PARAMS)?;
        let valid = overrides
            .valid_extensions
            .as_ref()
            .or(self.config.valid_extensions.as_ref());

        let mut documents = Vec::with_capacity(input.files.len());
        for file in input.files {
            if let Some(valid) = valid {
                let ext = file.extension().unwrap_or_default();
                if !valid.iter().any(|v| v.eq_ignore_ascii_case(&ext)) {
                    return Err(StageError::InvalidInput(format!(
                        "unsupported file type '{}' (accepted: {})",
                        file.name,
                        valid.join(", ")
                    )));
                }
            }

            let text = String::from_utf8(file.bytes)
                .map_err(|_| StageError::InvalidInput(format!("'{}' is not valid UTF-8 text", file.name)))?;

            let mut meta = file.meta;
            meta.insert("name".into(), Value::String(file.name));
            documents.push(Document::new(text).with_meta(meta));
        }

        Ok(Payload {
            query: input.query,
            files: Vec::new(),
            documents,
            answers: input.answers,
            documents_written: input.documents_written,
        })
    }
}
