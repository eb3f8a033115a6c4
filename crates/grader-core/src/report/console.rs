use crate::grading::QuestionGrades;
use crate::model::{Evaluation, Verdict};

/// One line per component on stderr, then a tally.
pub fn print_summary(grades: &QuestionGrades) {
    let mut pass = 0;
    let mut fail = 0;
    let mut unparsed = 0;
    let mut error = 0;

    eprintln!("\nGraded {} rubric components...", grades.len());

    for g in &grades.grades {
        let icon = match &g.verdict {
            Verdict::Parsed(r) if r.evaluation => {
                pass += 1;
                "✅"
            }
            Verdict::Parsed(_) => {
                fail += 1;
                "❌"
            }
            Verdict::Unparsed { .. } => {
                unparsed += 1;
                "❓"
            }
            Verdict::Failed { .. } => {
                error += 1;
                "💥"
            }
        };
        eprintln!("{} {:<40} {}", icon, truncate(&g.component, 40), g.verdict.label());
        match &g.verdict {
            Verdict::Unparsed { reason, .. } => eprintln!("    reason: {}", reason),
            Verdict::Failed { error } => eprintln!("    error: {}", error),
            Verdict::Parsed(_) => {}
        }
        eprintln!("    log: {}", g.debug_log.display());
    }

    eprintln!(
        "\nSummary: {} passed, {} failed, {} unparsed, {} errors",
        pass, fail, unparsed, error
    );
}

/// Pretty JSON for each verdict, in order.
pub fn render_verdicts(grades: &QuestionGrades) -> anyhow::Result<Vec<String>> {
    grades
        .grades
        .iter()
        .map(|g| serde_json::to_string_pretty(&g.verdict).map_err(anyhow::Error::from))
        .collect()
}

pub fn render_evaluations_text(evaluations: &[Evaluation]) -> String {
    let mut s = String::new();
    for e in evaluations {
        s.push_str(&format!(
            "{}  {}  rubric={}  log={}\n",
            e.id,
            if e.outcome { "pass" } else { "fail" },
            e.rubric_id,
            e.debug_path
        ));
    }
    s.push_str(&format!("{} evaluation(s)\n", evaluations.len()));
    s
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{}…", cut)
    }
}
