use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "grader",
    version,
    about = "Grade free-text answers against rubric components with an LLM"
)]
pub struct Cli {
    /// emit logs as JSON lines on stderr (level via GRADER_LOG)
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Grade a configured student response
    Grade(GradeArgs),
    /// List stored evaluations for a response
    Evaluations(EvaluationsArgs),
    /// Delete a stored question with everything that depends on it
    DeleteQuestion(DeleteQuestionArgs),
    /// Write a sample config
    Init(InitArgs),
    Version,
}

#[derive(clap::Args, Debug, Clone)]
pub struct GradeArgs {
    #[arg(long, default_value = "grader.yaml")]
    pub config: PathBuf,

    /// grade only this rubric component (0-based); default grades all of them
    #[arg(long)]
    pub component: Option<usize>,

    /// which studentResponse entry to grade (0-based)
    #[arg(long, default_value_t = 0)]
    pub response: usize,

    /// override the configured provider (ollama|openai|fake)
    #[arg(long)]
    pub provider: Option<String>,

    #[arg(long, env = "GRADER_MODEL")]
    pub model: Option<String>,

    #[arg(long, env = "GRADER_BASE_URL")]
    pub base_url: Option<String>,

    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// record question, rubrics, response and evaluations in the database
    #[arg(long)]
    pub persist: bool,

    /// database path (defaults to storage.db from the config)
    #[arg(long)]
    pub db: Option<PathBuf>,

    /// debug log directory (defaults to storage.logs from the config)
    #[arg(long)]
    pub logs: Option<PathBuf>,

    /// exit 1 unless every verdict parsed
    #[arg(long)]
    pub strict: bool,

    /// reject unknown config keys
    #[arg(long)]
    pub strict_config: bool,
}

#[derive(clap::Args, Debug, Clone)]
pub struct EvaluationsArgs {
    /// config whose storage.db is used when --db is not given
    #[arg(long, default_value = "grader.yaml")]
    pub config: PathBuf,

    #[arg(long)]
    pub db: Option<PathBuf>,

    #[arg(long)]
    pub response_id: String,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(clap::Args, Debug, Clone)]
pub struct DeleteQuestionArgs {
    /// config whose storage.db is used when --db is not given
    #[arg(long, default_value = "grader.yaml")]
    pub config: PathBuf,

    #[arg(long)]
    pub db: Option<PathBuf>,

    #[arg(long)]
    pub question_id: String,
}

#[derive(clap::Args, Debug, Clone)]
pub struct InitArgs {
    #[arg(long, default_value = "grader.yaml")]
    pub config: PathBuf,
}
