use crate::debug_log::DebugLogStore;
use crate::model::{
    grade_response_schema, ChatMessage, GradeResponse, GraderConfig, Query, Verdict,
};
use crate::providers::llm::structured::{chat_structured, StructuredOutput};
use crate::providers::llm::LlmClient;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;

pub mod record;

pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Clone)]
pub struct GradingConfig {
    pub prompt: String,
    pub model: String,
    pub temperature: f32,
    pub timeout: Duration,
}

impl GradingConfig {
    pub fn from_config(cfg: &GraderConfig) -> Self {
        Self {
            prompt: cfg.prompt.clone(),
            model: cfg.model.clone(),
            temperature: cfg.temperature,
            timeout: Duration::from_secs(cfg.timeout_seconds.unwrap_or(DEFAULT_TIMEOUT_SECS)),
        }
    }
}

/// Verdict for one rubric component together with the log of the call that produced it.
#[derive(Debug, Clone, Serialize)]
pub struct GradeOutcome {
    pub component: String,
    pub verdict: Verdict,
    pub debug_log: PathBuf,
}

/// Outcomes of grading one response against several components, in input order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct QuestionGrades {
    pub grades: Vec<GradeOutcome>,
}

impl QuestionGrades {
    pub fn results(&self) -> Vec<&Verdict> {
        self.grades.iter().map(|g| &g.verdict).collect()
    }

    pub fn debug_logs(&self) -> Vec<&Path> {
        self.grades.iter().map(|g| g.debug_log.as_path()).collect()
    }

    pub fn all_parsed(&self) -> bool {
        self.grades.iter().all(|g| g.verdict.is_parsed())
    }

    pub fn len(&self) -> usize {
        self.grades.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grades.is_empty()
    }
}

#[derive(Serialize)]
struct DebugRecord<'a> {
    timestamp: String,
    provider: &'a str,
    model: &'a str,
    temperature: f32,
    messages: Vec<ChatMessage>,
    raw: Option<&'a str>,
    response_meta: Option<&'a serde_json::Value>,
    parsed: String,
    parsing_error: Option<String>,
    error: Option<&'a str>,
    duration_ms: u64,
}

/// Grades student responses one rubric component at a time.
pub struct Grader {
    config: GradingConfig,
    client: Arc<dyn LlmClient>,
    logs: DebugLogStore,
    output: StructuredOutput,
}

impl Grader {
    pub fn new(
        config: GradingConfig,
        client: Arc<dyn LlmClient>,
        logs: DebugLogStore,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            config,
            client,
            logs,
            output: StructuredOutput::new(grade_response_schema()?)?,
        })
    }

    pub fn config(&self) -> &GradingConfig {
        &self.config
    }

    /// Grades `student_response` against a single component.
    ///
    /// Model failures, timeouts and unparseable replies become non-`Parsed` verdicts. The
    /// exchange is written to the debug log before returning; failing to write it is the
    /// only error.
    pub async fn evaluate(
        &self,
        rubric_component: &str,
        student_response: &str,
    ) -> anyhow::Result<GradeOutcome> {
        let query = Query {
            rubric_component: rubric_component.to_string(),
            student_response: student_response.to_string(),
        };
        let turns = [ChatMessage::user(serde_json::to_string(&query)?)];

        let started = Instant::now();
        let call = timeout(
            self.config.timeout,
            chat_structured::<GradeResponse>(
                self.client.as_ref(),
                &self.config.prompt,
                &turns,
                &self.output,
            ),
        )
        .await;
        let duration_ms = started.elapsed().as_millis() as u64;

        let (resp, verdict) = match call {
            Ok(Ok((resp, Ok(parsed)))) => (Some(resp), Verdict::Parsed(parsed)),
            Ok(Ok((resp, Err(e)))) => {
                tracing::warn!(
                    event = "grade.unparsed",
                    component = %rubric_component,
                    reason = %e,
                    "model reply did not match the grading schema"
                );
                let verdict = Verdict::Unparsed {
                    raw: resp.text.clone(),
                    reason: e.to_string(),
                };
                (Some(resp), verdict)
            }
            Ok(Err(e)) => {
                tracing::warn!(
                    event = "grade.model_error",
                    component = %rubric_component,
                    error = %e,
                    "model call failed"
                );
                let verdict = Verdict::Failed {
                    error: format!("{:#}", e),
                };
                (None, verdict)
            }
            Err(_) => {
                tracing::warn!(
                    event = "grade.timeout",
                    component = %rubric_component,
                    timeout_secs = self.config.timeout.as_secs(),
                    "model call timed out"
                );
                let verdict = Verdict::Failed {
                    error: format!(
                        "model call timed out after {}s",
                        self.config.timeout.as_secs_f64()
                    ),
                };
                (None, verdict)
            }
        };

        let (parsed, parsing_error, error) = match &verdict {
            Verdict::Parsed(r) => (serde_json::to_string(r)?, None, None),
            Verdict::Unparsed { reason, .. } => (String::new(), Some(reason.clone()), None),
            Verdict::Failed { error } => (String::new(), None, Some(error.as_str())),
        };

        let record = DebugRecord {
            timestamp: chrono::Utc::now().to_rfc3339(),
            provider: resp
                .as_ref()
                .map(|r| r.provider.as_str())
                .unwrap_or_else(|| self.client.provider_name()),
            model: resp
                .as_ref()
                .map(|r| r.model.as_str())
                .unwrap_or(self.config.model.as_str()),
            temperature: self.config.temperature,
            messages: crate::providers::llm::full_messages(&self.config.prompt, &turns),
            raw: resp.as_ref().map(|r| r.text.as_str()),
            response_meta: resp.as_ref().map(|r| &r.meta),
            parsed,
            parsing_error,
            error,
            duration_ms,
        };
        let debug_log = self.logs.store(&record)?;

        tracing::info!(
            event = "grade.component",
            component = %rubric_component,
            verdict = verdict.label(),
            duration_ms,
            debug_log = %debug_log.display()
        );

        Ok(GradeOutcome {
            component: rubric_component.to_string(),
            verdict,
            debug_log,
        })
    }

    /// Grades one response against every component, one call per component, in order.
    /// A bad reply or failed call for one component does not stop the others.
    pub async fn evaluate_question<S: AsRef<str>>(
        &self,
        rubric_components: &[S],
        student_response: &str,
    ) -> anyhow::Result<QuestionGrades> {
        let mut grades = Vec::with_capacity(rubric_components.len());
        for component in rubric_components {
            grades.push(self.evaluate(component.as_ref(), student_response).await?);
        }
        Ok(QuestionGrades { grades })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::llm::fake::FakeClient;
    use async_trait::async_trait;

    fn grader(client: Arc<dyn LlmClient>, dir: &Path, timeout: Duration) -> Grader {
        let cfg = GradingConfig {
            prompt: "You grade answers.".into(),
            model: "test-model".into(),
            temperature: 0.0,
            timeout,
        };
        Grader::new(cfg, client, DebugLogStore::new(dir)).unwrap()
    }

    fn read_log(path: &Path) -> serde_json::Value {
        serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn parsed_reply_is_logged_with_transcript() {
        let tmp = tempfile::tempdir().unwrap();
        let fake = Arc::new(FakeClient::new("test-model"));
        fake.push_reply(r#"{"evaluation": true, "rationale": "names Paris"}"#);
        let g = grader(fake.clone(), tmp.path(), Duration::from_secs(5));

        let out = g
            .evaluate("Mentions Paris", "Paris is the capital")
            .await
            .unwrap();

        assert_eq!(out.verdict.outcome(), Some(true));
        let log = read_log(&out.debug_log);
        assert_eq!(log["raw"], r#"{"evaluation": true, "rationale": "names Paris"}"#);
        assert_eq!(log["messages"][0]["role"], "system");
        assert_eq!(log["messages"][0]["content"], "You grade answers.");
        assert!(log["parsed"].as_str().unwrap().contains("\"evaluation\":true"));
        assert!(log["parsing_error"].is_null());

        let calls = fake.calls();
        let user: serde_json::Value = serde_json::from_str(&calls[0][1].content).unwrap();
        assert_eq!(user["rubricComponent"], "Mentions Paris");
        assert_eq!(user["studentResponse"], "Paris is the capital");
    }

    #[tokio::test]
    async fn unparsed_reply_yields_sentinel_and_empty_parsed() {
        let tmp = tempfile::tempdir().unwrap();
        let fake = Arc::new(FakeClient::new("m"));
        fake.push_reply("I think so.");
        let g = grader(fake, tmp.path(), Duration::from_secs(5));

        let out = g.evaluate("c", "r").await.unwrap();
        match &out.verdict {
            Verdict::Unparsed { raw, .. } => assert_eq!(raw, "I think so."),
            other => panic!("expected unparsed, got {:?}", other),
        }
        let log = read_log(&out.debug_log);
        assert_eq!(log["parsed"], "");
        assert!(log["parsing_error"].as_str().is_some());
    }

    #[tokio::test]
    async fn model_error_is_failed_verdict_not_error() {
        let tmp = tempfile::tempdir().unwrap();
        let fake = Arc::new(FakeClient::new("m"));
        fake.push_error("connection refused");
        let g = grader(fake, tmp.path(), Duration::from_secs(5));

        let out = g.evaluate("c", "r").await.unwrap();
        assert!(matches!(&out.verdict, Verdict::Failed { error } if error.contains("connection refused")));
        let log = read_log(&out.debug_log);
        assert!(log["raw"].is_null());
        assert_eq!(log["provider"], "fake");
    }

    struct SlowClient;

    #[async_trait]
    impl LlmClient for SlowClient {
        async fn chat(
            &self,
            _system: &str,
            _turns: &[ChatMessage],
            _format: Option<&serde_json::Value>,
        ) -> anyhow::Result<crate::model::LlmResponse> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            anyhow::bail!("unreachable")
        }
        fn provider_name(&self) -> &'static str {
            "slow"
        }
        fn model(&self) -> &str {
            "slow"
        }
    }

    #[tokio::test]
    async fn timeout_is_failed_verdict() {
        let tmp = tempfile::tempdir().unwrap();
        let g = grader(Arc::new(SlowClient), tmp.path(), Duration::from_millis(20));

        let out = g.evaluate("c", "r").await.unwrap();
        assert!(matches!(&out.verdict, Verdict::Failed { error } if error.contains("timed out")));
    }

    #[tokio::test]
    async fn question_keeps_input_order() {
        let tmp = tempfile::tempdir().unwrap();
        let fake = Arc::new(FakeClient::new("m"));
        fake.push_reply(r#"{"evaluation": true}"#)
            .push_reply(r#"{"evaluation": false}"#);
        let g = grader(fake, tmp.path(), Duration::from_secs(5));

        let grades = g
            .evaluate_question(&["first", "second"], "answer")
            .await
            .unwrap();
        assert_eq!(grades.len(), 2);
        assert_eq!(grades.grades[0].component, "first");
        assert_eq!(grades.results()[0].outcome(), Some(true));
        assert_eq!(grades.results()[1].outcome(), Some(false));
        assert!(grades.all_parsed());
    }
}
