use super::LlmClient;
use crate::model::{ChatMessage, LlmResponse};
use async_trait::async_trait;
use serde_json::json;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

pub struct OpenAIClient {
    pub model: String,
    pub api_key: String,
    pub base_url: String,
    pub temperature: f32,
    pub client: reqwest::Client,
}

impl OpenAIClient {
    pub fn new(model: String, api_key: String, base_url: Option<String>, temperature: f32) -> Self {
        let base_url = base_url
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();
        Self {
            model,
            api_key,
            base_url,
            temperature,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl LlmClient for OpenAIClient {
    async fn chat(
        &self,
        system: &str,
        turns: &[ChatMessage],
        format: Option<&serde_json::Value>,
    ) -> anyhow::Result<LlmResponse> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = request_body(&self.model, self.temperature, system, turns, format);

        let resp = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let error_text = resp.text().await.unwrap_or_default();
            anyhow::bail!("OpenAI chat API error ({}): {}", status, error_text);
        }

        let json: serde_json::Value = resp.json().await?;
        parse_reply(&self.model, json)
    }

    fn provider_name(&self) -> &'static str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.model
    }
}

fn request_body(
    model: &str,
    temperature: f32,
    system: &str,
    turns: &[ChatMessage],
    format: Option<&serde_json::Value>,
) -> serde_json::Value {
    let mut body = json!({
        "model": model,
        "messages": super::full_messages(system, turns),
        "temperature": temperature,
    });
    if let Some(schema) = format {
        body["response_format"] = json!({
            "type": "json_schema",
            "json_schema": { "name": "grade_response", "schema": schema }
        });
    }
    body
}

fn parse_reply(model: &str, json: serde_json::Value) -> anyhow::Result<LlmResponse> {
    let text = json
        .pointer("/choices/0/message/content")
        .and_then(|v| v.as_str())
        .ok_or_else(|| anyhow::anyhow!("OpenAI API response missing content"))?
        .to_string();

    Ok(LlmResponse {
        text,
        provider: "openai".to_string(),
        model: json
            .get("model")
            .and_then(|v| v.as_str())
            .unwrap_or(model)
            .to_string(),
        meta: json!({ "usage": json.get("usage") }),
    })
}
