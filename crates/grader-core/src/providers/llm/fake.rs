use super::LlmClient;
use crate::model::{ChatMessage, LlmResponse};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

pub const DEFAULT_REPLY: &str = r#"{"evaluation": true, "rationale": "fake provider always passes"}"#;

enum Scripted {
    Reply(String),
    Error(String),
}

/// Offline client that plays back scripted replies, then falls back to a fixed one.
pub struct FakeClient {
    model: String,
    default_reply: String,
    script: Mutex<VecDeque<Scripted>>,
    calls: Mutex<Vec<Vec<ChatMessage>>>,
}

impl FakeClient {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            default_reply: DEFAULT_REPLY.to_string(),
            script: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_default_reply(mut self, reply: impl Into<String>) -> Self {
        self.default_reply = reply.into();
        self
    }

    pub fn push_reply(&self, reply: impl Into<String>) -> &Self {
        self.lock_script().push_back(Scripted::Reply(reply.into()));
        self
    }

    pub fn push_error(&self, error: impl Into<String>) -> &Self {
        self.lock_script().push_back(Scripted::Error(error.into()));
        self
    }

    /// Messages of every call so far, system message first.
    pub fn calls(&self) -> Vec<Vec<ChatMessage>> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn lock_script(&self) -> std::sync::MutexGuard<'_, VecDeque<Scripted>> {
        self.script.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl LlmClient for FakeClient {
    async fn chat(
        &self,
        system: &str,
        turns: &[ChatMessage],
        _format: Option<&serde_json::Value>,
    ) -> anyhow::Result<LlmResponse> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(super::full_messages(system, turns));

        let next = self.lock_script().pop_front();
        let text = match next {
            Some(Scripted::Reply(text)) => text,
            Some(Scripted::Error(e)) => anyhow::bail!("{}", e),
            None => self.default_reply.clone(),
        };

        Ok(LlmResponse {
            text,
            provider: "fake".to_string(),
            model: self.model.clone(),
            meta: serde_json::json!({}),
        })
    }

    fn provider_name(&self) -> &'static str {
        "fake"
    }

    fn model(&self) -> &str {
        &self.model
    }
}
