use super::LlmClient;
use crate::model::{ChatMessage, LlmResponse};
use async_trait::async_trait;
use serde_json::json;

pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

pub struct OllamaClient {
    pub model: String,
    pub base_url: String,
    pub temperature: f32,
    pub client: reqwest::Client,
}

impl OllamaClient {
    pub fn new(model: String, base_url: Option<String>, temperature: f32) -> Self {
        let base_url = base_url
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();
        Self {
            model,
            base_url,
            temperature,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl LlmClient for OllamaClient {
    async fn chat(
        &self,
        system: &str,
        turns: &[ChatMessage],
        format: Option<&serde_json::Value>,
    ) -> anyhow::Result<LlmResponse> {
        let url = format!("{}/api/chat", self.base_url);
        let body = request_body(&self.model, self.temperature, system, turns, format);

        let resp = self.client.post(&url).json(&body).send().await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let error_text = resp.text().await.unwrap_or_default();
            anyhow::bail!("Ollama chat API error ({}): {}", status, error_text);
        }

        let json: serde_json::Value = resp.json().await?;
        parse_reply(&self.model, json)
    }

    fn provider_name(&self) -> &'static str {
        "ollama"
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
        "stream": false,
        "options": { "temperature": temperature },
    });
    if let Some(schema) = format {
        body["format"] = schema.clone();
    }
    body
}

fn parse_reply(model: &str, json: serde_json::Value) -> anyhow::Result<LlmResponse> {
    let text = json
        .pointer("/message/content")
        .and_then(|v| v.as_str())
        .ok_or_else(|| anyhow::anyhow!("Ollama API response missing message content"))?
        .to_string();

    let meta = json!({
        "done_reason": json.get("done_reason"),
        "prompt_eval_count": json.get("prompt_eval_count"),
        "eval_count": json.get("eval_count"),
        "total_duration": json.get("total_duration"),
    });

    Ok(LlmResponse {
        text,
        provider: "ollama".to_string(),
        model: json
            .get("model")
            .and_then(|v| v.as_str())
            .unwrap_or(model)
            .to_string(),
        meta,
    })
}
