use std::fmt::{Display, Formatter};

#[derive(Debug)]
pub struct ConfigError(pub String);

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "ConfigError: {}", self.0)
    }
}
impl std::error::Error for ConfigError {}

/// Storage failures, kept apart from `anyhow` so callers can branch on them.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store is closed")]
    Closed,

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("failed to prepare store location {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl StoreError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

/// Why a model reply could not be read as structured output.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("reply is empty")]
    Empty,

    #[error("reply is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("reply does not match schema: {}", .0.join("; "))]
    Schema(Vec<String>),

    #[error("reply could not be decoded: {0}")]
    Decode(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_display_is_prefixed() {
        let e = ConfigError("missing key 'prompt'".into());
        assert_eq!(e.to_string(), "ConfigError: missing key 'prompt'");
    }

    #[test]
    fn schema_errors_are_joined() {
        let e = ParseError::Schema(vec!["a".into(), "b".into()]);
        assert_eq!(e.to_string(), "reply does not match schema: a; b");
    }

    #[test]
    fn not_found_names_entity() {
        let e = StoreError::not_found("question", "q-1");
        assert!(e.is_not_found());
        assert_eq!(e.to_string(), "question not found: q-1");
    }
}
