use crate::errors::ConfigError;
use crate::model::GraderConfig;
use std::path::{Component, Path, PathBuf};

pub const DEFAULT_DB_PATH: &str = "db/database.db";
pub const DEFAULT_LOG_DIR: &str = "logs";

pub fn load_config(path: &Path, strict: bool) -> Result<GraderConfig, ConfigError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| ConfigError(format!("failed to read config {}: {}", path.display(), e)))?;
    parse_config(&raw, path, strict)
}

pub fn parse_config(raw: &str, path: &Path, strict: bool) -> Result<GraderConfig, ConfigError> {
    let mut ignored_keys = std::collections::BTreeSet::new();
    let deserializer = serde_yaml::Deserializer::from_str(raw);

    let mut cfg: GraderConfig = serde_ignored::deserialize(deserializer, |path| {
        ignored_keys.insert(path.to_string());
    })
    .map_err(|e| ConfigError(format!("failed to parse YAML: {}", e)))?;

    // YAML anchors are commonly parked under x- keys
    let meaningful_unknowns: Vec<_> = ignored_keys
        .iter()
        .filter(|k| !k.starts_with('_') && !k.starts_with("x-"))
        .collect();

    if !meaningful_unknowns.is_empty() {
        if strict {
            return Err(ConfigError(format!(
                "Unknown fields detected in strict mode: {:?} (file: {})",
                meaningful_unknowns,
                path.display()
            )));
        }
        tracing::warn!(
            event = "config.unknown_fields",
            fields = ?meaningful_unknowns,
            file = %path.display(),
            "ignored unknown config fields"
        );
    }

    validate(&cfg)?;

    normalize_paths(&mut cfg, path);

    Ok(cfg)
}

fn validate(cfg: &GraderConfig) -> Result<(), ConfigError> {
    if cfg.prompt.trim().is_empty() {
        return Err(ConfigError("config key 'prompt' is empty".into()));
    }
    if cfg.model.trim().is_empty() {
        return Err(ConfigError("config key 'model' is empty".into()));
    }
    if !cfg.temperature.is_finite() || !(0.0..=2.0).contains(&cfg.temperature) {
        return Err(ConfigError(format!(
            "config key 'temperature' must be between 0 and 2 (got {})",
            cfg.temperature
        )));
    }
    if cfg.rubric_components.is_empty() {
        return Err(ConfigError("config has no rubricComponent entries".into()));
    }
    if let Some(i) = cfg
        .rubric_components
        .iter()
        .position(|c| c.component.trim().is_empty())
    {
        return Err(ConfigError(format!("rubricComponent[{}] is empty", i)));
    }
    if cfg.student_responses.is_empty() {
        return Err(ConfigError("config has no studentResponse entries".into()));
    }
    if cfg.timeout_seconds == Some(0) {
        return Err(ConfigError("config key 'timeout_seconds' must be > 0".into()));
    }
    Ok(())
}

/// Fills missing storage paths with defaults and anchors relative ones at the directory
/// holding the config file, so results do not depend on the working directory.
fn normalize_paths(cfg: &mut GraderConfig, config_path: &Path) {
    let base = config_path.parent().unwrap_or(Path::new(""));
    let db = cfg.storage.db.take();
    let logs = cfg.storage.logs.take();
    cfg.storage.db = Some(anchor(base, db.as_deref(), DEFAULT_DB_PATH));
    cfg.storage.logs = Some(anchor(base, logs.as_deref(), DEFAULT_LOG_DIR));
}

fn anchor(base: &Path, value: Option<&str>, default: &str) -> String {
    let value = value.map(str::trim).filter(|v| !v.is_empty()).unwrap_or(default);
    let path = Path::new(value);
    if path.is_absolute() {
        return value.to_string();
    }

    let mut out = PathBuf::new();
    for part in base.join(path).components() {
        match part {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out.to_string_lossy().into_owned()
}

pub fn write_sample_config(path: &Path) -> Result<(), ConfigError> {
    std::fs::write(path, SAMPLE_CONFIG)
        .map_err(|e| ConfigError(format!("failed to write sample config: {}", e)))?;
    Ok(())
}

pub const SAMPLE_CONFIG: &str = r#"prompt: |
  You are a strict grader. You receive a JSON object with a rubricComponent and a
  studentResponse. Decide whether the response satisfies the rubric component.
  Reply with JSON only: {"evaluation": true|false, "rationale": "<one sentence>"}.
model: llama3.1
temperature: 0.0
provider: ollama
timeout_seconds: 120
question: "What is the capital of France?"
storage:
  db: db/database.db
  logs: logs
rubricComponent:
  - component: "Mentions Paris"
  - component: "States that Paris is the capital"
  - component: "Gives no incorrect facts"
studentResponse:
  - "Paris is the capital of France."
  - "I think it is Lyon."
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ProviderKind;

    const MINIMAL: &str = r#"
prompt: grade it
model: llama3.1
temperature: 0.2
rubricComponent:
  - component: Mentions Paris
studentResponse:
  - Paris is the capital
"#;

    #[test]
    fn parses_minimal_config_with_defaults() {
        let cfg = parse_config(MINIMAL, Path::new("/srv/app/grader.yaml"), true).unwrap();
        assert_eq!(cfg.model, "llama3.1");
        assert_eq!(cfg.provider, ProviderKind::Ollama);
        assert_eq!(cfg.rubric_components[0].component, "Mentions Paris");
        assert_eq!(cfg.storage.db.as_deref(), Some("/srv/app/db/database.db"));
        assert_eq!(cfg.storage.logs.as_deref(), Some("/srv/app/logs"));
    }

    #[test]
    fn missing_prompt_is_config_error() {
        let raw = MINIMAL.replace("prompt: grade it\n", "");
        let err = parse_config(&raw, Path::new("grader.yaml"), false).unwrap_err();
        assert!(err.0.contains("failed to parse YAML"), "{}", err);
        assert!(err.0.contains("prompt"), "{}", err);
    }

    #[test]
    fn unknown_keys_fail_only_in_strict_mode() {
        let raw = format!("{}colour: blue\n", MINIMAL);
        assert!(parse_config(&raw, Path::new("grader.yaml"), false).is_ok());
        let err = parse_config(&raw, Path::new("grader.yaml"), true).unwrap_err();
        assert!(err.0.contains("colour"));
    }

    #[test]
    fn rejects_out_of_range_temperature() {
        let raw = MINIMAL.replace("temperature: 0.2", "temperature: 3.5");
        let err = parse_config(&raw, Path::new("grader.yaml"), false).unwrap_err();
        assert!(err.0.contains("temperature"));
    }

    #[test]
    fn rejects_empty_fixtures() {
        let raw = MINIMAL.replace("  - Paris is the capital\n", "  []\n");
        let raw = raw.replace("studentResponse:\n  []", "studentResponse: []");
        let err = parse_config(&raw, Path::new("grader.yaml"), false).unwrap_err();
        assert!(err.0.contains("studentResponse"));
    }

    #[test]
    fn absolute_storage_paths_are_kept() {
        let raw = format!("{}storage:\n  db: /data/grades.db\n", MINIMAL);
        let cfg = parse_config(&raw, Path::new("/srv/app/grader.yaml"), true).unwrap();
        assert_eq!(cfg.storage.db.as_deref(), Some("/data/grades.db"));
    }

    #[test]
    fn relative_storage_paths_follow_the_config_file() {
        let raw = format!("{}storage:\n  db: ../state/./grades.db\n  logs: \"  \"\n", MINIMAL);
        let cfg = parse_config(&raw, Path::new("/srv/app/conf/grader.yaml"), true).unwrap();
        assert_eq!(cfg.storage.db.as_deref(), Some("/srv/app/state/grades.db"));
        assert_eq!(cfg.storage.logs.as_deref(), Some("/srv/app/conf/logs"));
    }

    #[test]
    fn bare_config_name_keeps_paths_relative() {
        let cfg = parse_config(MINIMAL, Path::new("grader.yaml"), true).unwrap();
        assert_eq!(cfg.storage.db.as_deref(), Some("db/database.db"));
        assert_eq!(cfg.storage.logs.as_deref(), Some("logs"));
    }

    #[test]
    fn sample_config_loads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("grader.yaml");
        write_sample_config(&path).unwrap();
        let cfg = load_config(&path, true).unwrap();
        assert_eq!(cfg.rubric_components.len(), 3);
        assert_eq!(cfg.student_responses.len(), 2);
    }
}
