//! Schema-constrained model output
//!
//! The shape is appended to the prompt as an example object; the reply is
//! pulled out of any Markdown fencing, parsed, and checked for the keys the
//! caller relies on.

use serde_json::Value;

use crate::error::CompletionError;

/// Expected shape of a structured completion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputSchema {
    pub name: String,
    /// Example JSON object shown to the model
    pub shape: String,
    /// Top-level keys that must be present
    pub required: Vec<String>,
}

impl OutputSchema {
    pub fn new(name: impl Into<String>, shape: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            shape: shape.into(),
            required: Vec::new(),
        }
    }

    pub fn with_required<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required = keys.into_iter().map(Into::into).collect();
        self
    }

    /// Output instructions appended to the user prompt
    pub fn instructions(&self) -> String {
        let mut text = format!(
            "\n\nRespond with a single raw JSON object matching this structure:\n{}\n",
            self.shape.trim()
        );
        if !self.required.is_empty() {
            text.push_str(&format!("Required top-level keys: {}.\n", self.required.join(", ")));
        }
        text.push_str("Do not include explanations or markdown code fences.");
        text
    }

    /// Parse and validate a raw model reply
    pub fn parse(&self, raw: &str) -> Result<Value, CompletionError> {
        let json = extract_json_object(raw).ok_or_else(|| {
            CompletionError::InvalidOutput(format!("no JSON object in reply ({} chars)", raw.len()))
        })?;

        let value: Value = serde_json::from_str(json)
            .map_err(|e| CompletionError::InvalidOutput(e.to_string()))?;

        let object = value.as_object().ok_or_else(|| CompletionError::SchemaViolation {
            schema: self.name.clone(),
            reason: "expected a JSON object".to_string(),
        })?;

        let missing: Vec<&str> = self
            .required
            .iter()
            .filter(|key| !object.contains_key(key.as_str()))
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            return Err(CompletionError::SchemaViolation {
                schema: self.name.clone(),
                reason: format!("missing keys: {}", missing.join(", ")),
            });
        }

        Ok(value)
    }
}

/// Slice from the first `{` to the last `}`, after dropping code fences
pub fn extract_json_object(raw: &str) -> Option<&str> {
    let trimmed = raw.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .map(|rest| rest.trim_end().trim_end_matches("```"))
        .unwrap_or(trimmed);

    let start = body.find('{')?;
    let end = body.rfind('}')?;
    (start < end).then(|| &body[start..=end])
}
