use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraderConfig {
    /// System instruction sent with every grading call.
    pub prompt: String,
    pub model: String,
    pub temperature: f32,
    #[serde(default)]
    pub provider: ProviderKind,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
    /// Question text used when grades are persisted.
    #[serde(default)]
    pub question: Option<String>,
    #[serde(default)]
    pub storage: StorageSettings,
    #[serde(rename = "rubricComponent", default)]
    pub rubric_components: Vec<RubricComponent>,
    #[serde(rename = "studentResponse", default)]
    pub student_responses: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    #[default]
    Ollama,
    #[serde(rename = "openai")]
    OpenAI,
    Fake,
}

impl ProviderKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ollama" => Some(Self::Ollama),
            "openai" => Some(Self::OpenAI),
            "fake" => Some(Self::Fake),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ollama => "ollama",
            Self::OpenAI => "openai",
            Self::Fake => "fake",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageSettings {
    pub db: Option<String>,
    pub logs: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RubricComponent {
    pub component: String,
}

// --- Stored entities ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rubric {
    pub id: String,
    pub component: String,
    pub question_id: String,
    pub rubric_index: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub id: String,
    pub text: String,
    pub question_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evaluation {
    pub id: String,
    pub outcome: bool,
    pub debug_path: String,
    pub rubric_id: String,
    pub response_id: String,
}

// --- Grading contract ---

/// User turn of a grading call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Query {
    pub rubric_component: String,
    pub student_response: String,
}

/// Structured reply expected from the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GradeResponse {
    pub evaluation: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
}

pub const GRADE_RESPONSE_SCHEMA: &str = r#"{
  "type": "object",
  "properties": {
    "evaluation": { "type": "boolean" },
    "rationale": { "type": "string" }
  },
  "required": ["evaluation"]
}"#;

pub fn grade_response_schema() -> anyhow::Result<serde_json::Value> {
    serde_json::from_str(GRADE_RESPONSE_SCHEMA)
        .map_err(|e| anyhow::anyhow!("grading schema is not valid JSON: {}", e))
}

/// Outcome of one grading call. Only `Parsed` carries a trustworthy evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Verdict {
    Parsed(GradeResponse),
    Unparsed { raw: String, reason: String },
    Failed { error: String },
}

impl Verdict {
    pub fn outcome(&self) -> Option<bool> {
        match self {
            Verdict::Parsed(r) => Some(r.evaluation),
            _ => None,
        }
    }

    pub fn is_parsed(&self) -> bool {
        matches!(self, Verdict::Parsed(_))
    }

    pub fn label(&self) -> &'static str {
        match self {
            Verdict::Parsed(r) if r.evaluation => "pass",
            Verdict::Parsed(_) => "fail",
            Verdict::Unparsed { .. } => "unparsed",
            Verdict::Failed { .. } => "error",
        }
    }
}

// --- Model exchange ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmResponse {
    pub text: String,
    pub provider: String,
    pub model: String,
    #[serde(default)]
    pub meta: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_uses_camel_case_keys() {
        let q = Query {
            rubric_component: "Mentions Paris".into(),
            student_response: "Paris".into(),
        };
        let v = serde_json::to_value(&q).unwrap();
        assert_eq!(v["rubricComponent"], "Mentions Paris");
        assert_eq!(v["studentResponse"], "Paris");
    }

    #[test]
    fn schema_constant_is_valid_json() {
        let v: serde_json::Value = serde_json::from_str(GRADE_RESPONSE_SCHEMA).unwrap();
        assert_eq!(v["required"][0], "evaluation");
        let schema = grade_response_schema().unwrap();
        assert_eq!(schema, v);
        assert_ne!(schema, serde_json::json!({}));
    }

    #[test]
    fn only_parsed_verdicts_carry_outcome() {
        let parsed = Verdict::Parsed(GradeResponse {
            evaluation: false,
            rationale: None,
        });
        assert_eq!(parsed.outcome(), Some(false));
        assert_eq!(parsed.label(), "fail");

        let unparsed = Verdict::Unparsed {
            raw: "yes".into(),
            reason: "not json".into(),
        };
        assert_eq!(unparsed.outcome(), None);
        assert_eq!(unparsed.label(), "unparsed");
    }

    #[test]
    fn verdict_serializes_with_status_tag() {
        let v = serde_json::to_value(Verdict::Parsed(GradeResponse {
            evaluation: true,
            rationale: Some("mentions Paris".into()),
        }))
        .unwrap();
        assert_eq!(v["status"], "parsed");
        assert_eq!(v["evaluation"], true);

        let v = serde_json::to_value(Verdict::Failed {
            error: "timeout".into(),
        })
        .unwrap();
        assert_eq!(v["status"], "failed");
    }

    #[test]
    fn provider_kind_parses_names() {
        assert_eq!(ProviderKind::parse("OpenAI"), Some(ProviderKind::OpenAI));
        assert_eq!(ProviderKind::parse("ollama"), Some(ProviderKind::Ollama));
        assert_eq!(ProviderKind::parse("nope"), None);
        let k: ProviderKind = serde_yaml::from_str("openai").unwrap();
        assert_eq!(k, ProviderKind::OpenAI);
    }
}
