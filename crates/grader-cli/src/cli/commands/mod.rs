use super::args::*;
use grader_core::config::{load_config, DEFAULT_LOG_DIR};
use grader_core::debug_log::DebugLogStore;
use grader_core::errors::{ConfigError, StoreError};
use grader_core::grading::record::{record_response_grades, seed_question, SeededQuestion};
use grader_core::grading::{Grader, GradingConfig, QuestionGrades};
use grader_core::model::{GraderConfig, ProviderKind};
use grader_core::providers::llm::build_client;
use grader_core::report::console;
use grader_core::storage::Store;
use std::path::{Path, PathBuf};

pub mod exit_codes {
    pub const OK: i32 = 0;
    pub const GRADE_FAILED: i32 = 1;
    pub const CONFIG_ERROR: i32 = 2;
    pub const NOT_FOUND: i32 = 3;
}

pub async fn dispatch(cli: Cli) -> anyhow::Result<i32> {
    match cli.cmd {
        Command::Grade(args) => cmd_grade(args).await,
        Command::Evaluations(args) => cmd_evaluations(args),
        Command::DeleteQuestion(args) => cmd_delete_question(args),
        Command::Init(args) => cmd_init(args),
        Command::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(exit_codes::OK)
        }
    }
}

struct Selection {
    components: Vec<String>,
    student_response: String,
}

fn apply_overrides(cfg: &mut GraderConfig, args: &GradeArgs) -> Result<(), String> {
    if let Some(p) = &args.provider {
        cfg.provider = ProviderKind::parse(p)
            .ok_or_else(|| format!("unknown provider '{}' (ollama|openai|fake)", p))?;
    }
    if let Some(m) = args.model.as_ref().filter(|m| !m.trim().is_empty()) {
        cfg.model = m.clone();
    }
    if let Some(u) = args.base_url.as_ref().filter(|u| !u.trim().is_empty()) {
        cfg.base_url = Some(u.clone());
    }
    Ok(())
}

fn select(cfg: &GraderConfig, args: &GradeArgs) -> Result<Selection, String> {
    let student_response = cfg
        .student_responses
        .get(args.response)
        .cloned()
        .ok_or_else(|| {
            format!(
                "--response {} is out of range ({} studentResponse entries)",
                args.response,
                cfg.student_responses.len()
            )
        })?;

    let components = match args.component {
        Some(i) => vec![cfg
            .rubric_components
            .get(i)
            .map(|c| c.component.clone())
            .ok_or_else(|| {
                format!(
                    "--component {} is out of range ({} rubricComponent entries)",
                    i,
                    cfg.rubric_components.len()
                )
            })?],
        None => cfg
            .rubric_components
            .iter()
            .map(|c| c.component.clone())
            .collect(),
    };

    Ok(Selection {
        components,
        student_response,
    })
}

async fn cmd_grade(args: GradeArgs) -> anyhow::Result<i32> {
    let mut cfg = match load_config(&args.config, args.strict_config) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("config error: {}", e);
            return Ok(exit_codes::CONFIG_ERROR);
        }
    };

    let selection = match apply_overrides(&mut cfg, &args).and_then(|_| select(&cfg, &args)) {
        Ok(s) => s,
        Err(msg) => {
            eprintln!("config error: {}", msg);
            return Ok(exit_codes::CONFIG_ERROR);
        }
    };

    let client = match build_client(&cfg, args.api_key.clone()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{}", e);
            return Ok(exit_codes::CONFIG_ERROR);
        }
    };

    let logs_dir = args.logs.clone().unwrap_or_else(|| {
        PathBuf::from(
            cfg.storage
                .logs
                .clone()
                .unwrap_or_else(|| DEFAULT_LOG_DIR.to_string()),
        )
    });
    let grader = Grader::new(
        GradingConfig::from_config(&cfg),
        client,
        DebugLogStore::new(logs_dir),
    )?;

    tracing::info!(
        event = "grade.start",
        provider = cfg.provider.as_str(),
        model = %cfg.model,
        components = selection.components.len(),
        persist = args.persist
    );

    let grades = if args.persist {
        let db = db_path(&cfg, args.db.as_deref());
        let store = Store::open(&db)?;
        let question = cfg
            .question
            .clone()
            .unwrap_or_else(|| format!("questions from {}", args.config.display()));
        let result = grade_and_record(&store, &grader, &question, &selection).await;
        store.close()?;

        let (seeded, grades) = result?;
        eprintln!(
            "stored question={} response={} in {}",
            seeded.question_id,
            seeded.response_ids[0],
            db.display()
        );
        grades
    } else {
        grader
            .evaluate_question(&selection.components, &selection.student_response)
            .await?
    };

    for doc in console::render_verdicts(&grades)? {
        println!("{}", doc);
    }
    console::print_summary(&grades);

    if args.strict && !grades.all_parsed() {
        return Ok(exit_codes::GRADE_FAILED);
    }
    Ok(exit_codes::OK)
}

/// Seeds the question and grades its response. When grading fails the seeded rows are
/// deleted again so no question is left without evaluations.
async fn grade_and_record(
    store: &Store,
    grader: &Grader,
    question: &str,
    selection: &Selection,
) -> anyhow::Result<(SeededQuestion, QuestionGrades)> {
    let seeded = seed_question(
        store,
        question,
        &selection.components,
        std::slice::from_ref(&selection.student_response),
    )?;

    match record_response_grades(store, grader, &seeded.question_id, &seeded.response_ids[0])
        .await
    {
        Ok(recorded) => {
            let grades = QuestionGrades {
                grades: recorded.into_iter().map(|r| r.outcome).collect(),
            };
            Ok((seeded, grades))
        }
        Err(e) => {
            match store.delete_question(&seeded.question_id) {
                Ok(()) => tracing::warn!(
                    event = "grade.seed_rolled_back",
                    question_id = %seeded.question_id,
                    error = %e
                ),
                Err(cleanup) => tracing::error!(
                    event = "grade.seed_left_behind",
                    question_id = %seeded.question_id,
                    response_id = %seeded.response_ids[0],
                    error = %cleanup
                ),
            }
            Err(e)
        }
    }
}

fn db_path(cfg: &GraderConfig, flag: Option<&Path>) -> PathBuf {
    flag.map(Path::to_path_buf).unwrap_or_else(|| {
        PathBuf::from(
            cfg.storage
                .db
                .clone()
                .unwrap_or_else(|| grader_core::config::DEFAULT_DB_PATH.to_string()),
        )
    })
}

/// `--db` wins; otherwise `storage.db` from the config, resolved the same way `grade` does.
fn resolve_db(config: &Path, flag: Option<&Path>) -> Result<PathBuf, ConfigError> {
    match flag {
        Some(p) => Ok(p.to_path_buf()),
        None => load_config(config, false).map(|cfg| db_path(&cfg, None)),
    }
}

/// Opens an existing database, or returns the exit code to stop with.
fn open_existing(config: &Path, flag: Option<&Path>) -> anyhow::Result<Result<Store, i32>> {
    let db = match resolve_db(config, flag) {
        Ok(db) => db,
        Err(e) => {
            eprintln!("config error: {}", e);
            return Ok(Err(exit_codes::CONFIG_ERROR));
        }
    };
    if !db.exists() {
        eprintln!("error: database {} does not exist", db.display());
        return Ok(Err(exit_codes::NOT_FOUND));
    }
    Ok(Ok(Store::open(&db)?))
}

fn cmd_evaluations(args: EvaluationsArgs) -> anyhow::Result<i32> {
    let store = match open_existing(&args.config, args.db.as_deref())? {
        Ok(store) => store,
        Err(code) => return Ok(code),
    };
    let evaluations = store.get_evaluations_for_response(&args.response_id)?;
    store.close()?;

    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&evaluations)?),
        OutputFormat::Text => print!("{}", console::render_evaluations_text(&evaluations)),
    }
    Ok(exit_codes::OK)
}

fn cmd_delete_question(args: DeleteQuestionArgs) -> anyhow::Result<i32> {
    let store = match open_existing(&args.config, args.db.as_deref())? {
        Ok(store) => store,
        Err(code) => return Ok(code),
    };
    let result = store.delete_question(&args.question_id);
    store.close()?;

    match result {
        Ok(()) => {
            eprintln!("deleted question {}", args.question_id);
            Ok(exit_codes::OK)
        }
        Err(e @ StoreError::NotFound { .. }) => {
            eprintln!("error: {}", e);
            Ok(exit_codes::NOT_FOUND)
        }
        Err(e) => Err(e.into()),
    }
}

fn cmd_init(args: InitArgs) -> anyhow::Result<i32> {
    let path = &args.config;
    if path.exists() {
        eprintln!("note: {} already exists", path.display());
        return Ok(exit_codes::OK);
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    grader_core::config::write_sample_config(path)?;
    eprintln!("created {}", path.display());
    Ok(exit_codes::OK)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn grade_args(extra: &[&str]) -> GradeArgs {
        let mut argv = vec!["grader", "grade"];
        argv.extend_from_slice(extra);
        match Cli::parse_from(argv).cmd {
            Command::Grade(a) => a,
            _ => unreachable!(),
        }
    }

    fn cfg() -> GraderConfig {
        grader_core::config::parse_config(
            grader_core::config::SAMPLE_CONFIG,
            Path::new("/srv/grader.yaml"),
            true,
        )
        .unwrap()
    }

    #[test]
    fn selects_all_components_by_default() {
        let s = select(&cfg(), &grade_args(&[])).unwrap();
        assert_eq!(s.components.len(), 3);
        assert_eq!(s.student_response, "Paris is the capital of France.");
    }

    #[test]
    fn selects_single_component_and_response() {
        let s = select(&cfg(), &grade_args(&["--component", "1", "--response", "1"])).unwrap();
        assert_eq!(s.components, vec!["States that Paris is the capital"]);
        assert_eq!(s.student_response, "I think it is Lyon.");
    }

    #[test]
    fn out_of_range_selection_is_reported() {
        let err = select(&cfg(), &grade_args(&["--component", "9"])).err().unwrap();
        assert!(err.contains("--component 9"));
    }

    #[test]
    fn provider_override_is_validated() {
        let mut c = cfg();
        apply_overrides(&mut c, &grade_args(&["--provider", "fake"])).unwrap();
        assert_eq!(c.provider, ProviderKind::Fake);
        assert!(apply_overrides(&mut c, &grade_args(&["--provider", "gpt"])).is_err());
    }

    #[test]
    fn format_rejects_unknown_values() {
        let parsed = Cli::try_parse_from([
            "grader",
            "evaluations",
            "--response-id",
            "r",
            "--format",
            "yaml",
        ]);
        assert!(parsed.is_err());

        match Cli::parse_from(["grader", "evaluations", "--response-id", "r"]).cmd {
            Command::Evaluations(a) => {
                assert_eq!(a.format, OutputFormat::Text);
                assert_eq!(a.config, PathBuf::from("grader.yaml"));
                assert!(a.db.is_none());
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn listing_commands_use_the_config_database() {
        let tmp = tempfile::tempdir().unwrap();
        let config = tmp.path().join("sub").join("grader.yaml");
        std::fs::create_dir_all(config.parent().unwrap()).unwrap();
        grader_core::config::write_sample_config(&config).unwrap();

        let db = resolve_db(&config, None).unwrap();
        assert_eq!(db, tmp.path().join("sub").join("db").join("database.db"));
        assert_eq!(
            resolve_db(&config, Some(Path::new("other.db"))).unwrap(),
            PathBuf::from("other.db")
        );
        assert!(resolve_db(&tmp.path().join("missing.yaml"), None).is_err());
    }

    #[test]
    fn db_flag_wins_over_config() {
        let c = cfg();
        assert_eq!(db_path(&c, None), PathBuf::from("/srv/db/database.db"));
        assert_eq!(
            db_path(&c, Some(Path::new("/tmp/x.db"))),
            PathBuf::from("/tmp/x.db")
        );
    }
}
