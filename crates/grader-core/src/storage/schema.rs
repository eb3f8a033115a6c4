pub const DDL: &str = r#"
CREATE TABLE IF NOT EXISTS question (
  id TEXT PRIMARY KEY,
  question TEXT NOT NULL,
  created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS rubric (
  id TEXT PRIMARY KEY,
  component TEXT NOT NULL,
  question_id TEXT NOT NULL REFERENCES question(id) ON DELETE CASCADE,
  rubric_index INTEGER NOT NULL,
  created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS response (
  id TEXT PRIMARY KEY,
  response TEXT NOT NULL,
  question_id TEXT NOT NULL REFERENCES question(id) ON DELETE CASCADE,
  created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS evaluation (
  seq INTEGER PRIMARY KEY AUTOINCREMENT,
  id TEXT NOT NULL UNIQUE,
  evaluation INTEGER NOT NULL,
  debug_path TEXT NOT NULL,
  rubric_id TEXT NOT NULL REFERENCES rubric(id) ON DELETE CASCADE,
  response_id TEXT NOT NULL REFERENCES response(id) ON DELETE CASCADE,
  created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_rubric_question ON rubric(question_id);
CREATE INDEX IF NOT EXISTS idx_response_question ON response(question_id);
CREATE INDEX IF NOT EXISTS idx_evaluation_response ON evaluation(response_id);
CREATE INDEX IF NOT EXISTS idx_evaluation_rubric ON evaluation(rubric_id);
"#;

pub const TABLES: [&str; 4] = ["question", "rubric", "response", "evaluation"];
