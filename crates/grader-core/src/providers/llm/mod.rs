use crate::model::{ChatMessage, GraderConfig, LlmResponse, ProviderKind};
use async_trait::async_trait;
use std::sync::Arc;

pub mod fake;
pub mod ollama;
pub mod openai;
pub mod structured;

/// Chat-style model capability consumed by the grader.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Sends `system` followed by `turns`. When `format` is set the provider is asked to
    /// constrain its reply to that JSON schema; the raw reply text is returned either way.
    async fn chat(
        &self,
        system: &str,
        turns: &[ChatMessage],
        format: Option<&serde_json::Value>,
    ) -> anyhow::Result<LlmResponse>;
    fn provider_name(&self) -> &'static str;
    fn model(&self) -> &str;
}

/// Builds the client selected by `cfg.provider`.
pub fn build_client(
    cfg: &GraderConfig,
    api_key: Option<String>,
) -> anyhow::Result<Arc<dyn LlmClient>> {
    let client: Arc<dyn LlmClient> = match cfg.provider {
        ProviderKind::Ollama => Arc::new(ollama::OllamaClient::new(
            cfg.model.clone(),
            cfg.base_url.clone(),
            cfg.temperature,
        )),
        ProviderKind::OpenAI => {
            let key = api_key.filter(|k| !k.trim().is_empty()).ok_or_else(|| {
                anyhow::anyhow!("config error: provider 'openai' requires OPENAI_API_KEY")
            })?;
            Arc::new(openai::OpenAIClient::new(
                cfg.model.clone(),
                key,
                cfg.base_url.clone(),
                cfg.temperature,
            ))
        }
        ProviderKind::Fake => Arc::new(fake::FakeClient::new(cfg.model.clone())),
    };
    tracing::debug!(
        event = "provider.selected",
        provider = client.provider_name(),
        model = client.model()
    );
    Ok(client)
}

pub(crate) fn full_messages(system: &str, turns: &[ChatMessage]) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(turns.len() + 1);
    messages.push(ChatMessage::system(system));
    messages.extend_from_slice(turns);
    messages
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Role, StorageSettings};

    fn cfg(provider: ProviderKind) -> GraderConfig {
        GraderConfig {
            prompt: "p".into(),
            model: "m".into(),
            temperature: 0.0,
            provider,
            base_url: None,
            timeout_seconds: None,
            question: None,
            storage: StorageSettings::default(),
            rubric_components: vec![],
            student_responses: vec![],
        }
    }

    #[test]
    fn openai_requires_key() {
        let err = build_client(&cfg(ProviderKind::OpenAI), None)
            .err()
            .unwrap();
        assert!(err.to_string().contains("OPENAI_API_KEY"));
        assert!(build_client(&cfg(ProviderKind::OpenAI), Some("k".into())).is_ok());
    }

    #[test]
    fn selects_provider_by_kind() {
        let c = build_client(&cfg(ProviderKind::Fake), None).unwrap();
        assert_eq!(c.provider_name(), "fake");
        let c = build_client(&cfg(ProviderKind::Ollama), None).unwrap();
        assert_eq!(c.provider_name(), "ollama");
        assert_eq!(c.model(), "m");
    }

    #[test]
    fn system_message_leads() {
        let msgs = full_messages("sys", &[ChatMessage::user("hi")]);
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0].role, Role::System);
        assert_eq!(msgs[1].content, "hi");
    }
}
