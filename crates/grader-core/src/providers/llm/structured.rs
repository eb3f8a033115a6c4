use super::LlmClient;
use crate::errors::ParseError;
use crate::model::{ChatMessage, LlmResponse};
use jsonschema::JSONSchema;
use regex::Regex;
use serde::de::DeserializeOwned;
use std::sync::OnceLock;

/// Reads model replies as JSON conforming to a fixed schema.
pub struct StructuredOutput {
    schema: serde_json::Value,
    compiled: JSONSchema,
}

impl StructuredOutput {
    pub fn new(schema: serde_json::Value) -> anyhow::Result<Self> {
        let compiled = JSONSchema::options()
            .compile(&schema)
            .map_err(|e| anyhow::anyhow!("schema compile failed: {}", e))?;
        Ok(Self { schema, compiled })
    }

    pub fn schema(&self) -> &serde_json::Value {
        &self.schema
    }

    pub fn parse<T: DeserializeOwned>(&self, raw: &str) -> Result<T, ParseError> {
        let candidate = extract_json(raw).ok_or(ParseError::Empty)?;

        let instance: serde_json::Value = serde_json::from_str(candidate)
            .map_err(|e| ParseError::InvalidJson(e.to_string()))?;

        if let Err(errors) = self.compiled.validate(&instance) {
            return Err(ParseError::Schema(errors.map(|e| e.to_string()).collect()));
        }

        serde_json::from_value(instance).map_err(|e| ParseError::Decode(e.to_string()))
    }
}

/// Calls `client` asking for structured output and returns the raw reply next to the
/// parse result. Only transport failures are errors; a reply that does not parse is not.
pub async fn chat_structured<T: DeserializeOwned>(
    client: &dyn LlmClient,
    system: &str,
    turns: &[ChatMessage],
    output: &StructuredOutput,
) -> anyhow::Result<(LlmResponse, Result<T, ParseError>)> {
    let resp = client.chat(system, turns, Some(output.schema())).await?;
    let parsed = output.parse(&resp.text);
    Ok((resp, parsed))
}

fn fence_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)```(?:json|JSON)?\s*(.*?)\s*```").expect("static regex is valid")
    })
}

/// Picks the JSON payload out of a reply: a fenced block if present, otherwise the span
/// from the first `{` to the last `}`, otherwise the trimmed text.
fn extract_json(raw: &str) -> Option<&str> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Some(c) = fence_re().captures(trimmed).and_then(|c| c.get(1)) {
        return Some(c.as_str());
    }
    match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if start < end => Some(&trimmed[start..=end]),
        _ => Some(trimmed),
    }
}
