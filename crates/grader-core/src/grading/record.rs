use super::{GradeOutcome, Grader};
use crate::errors::StoreError;
use crate::model::Rubric;
use crate::storage::Store;
use serde::Serialize;

/// Ids created when a question and its fixtures are written to the store.
#[derive(Debug, Clone, Serialize)]
pub struct SeededQuestion {
    pub question_id: String,
    pub rubric_ids: Vec<String>,
    pub response_ids: Vec<String>,
}

/// Stores a question with its rubric components (indexed from 1) and responses.
pub fn seed_question<C: AsRef<str>, R: AsRef<str>>(
    store: &Store,
    question: &str,
    components: &[C],
    responses: &[R],
) -> Result<SeededQuestion, StoreError> {
    let question_id = store.add_question(question)?;
    let rubric_ids = components
        .iter()
        .enumerate()
        .map(|(i, c)| store.add_rubric(c.as_ref(), &question_id, i as i64 + 1))
        .collect::<Result<Vec<_>, _>>()?;
    let response_ids = responses
        .iter()
        .map(|r| store.add_response(r.as_ref(), &question_id))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(SeededQuestion {
        question_id,
        rubric_ids,
        response_ids,
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct RecordedGrade {
    pub rubric: Rubric,
    pub outcome: GradeOutcome,
    /// Set only when the verdict parsed and an evaluation row was written.
    pub evaluation_id: Option<String>,
}

/// Grades a stored response against its question's rubrics and records every parsed
/// verdict as an evaluation. Each row is written after its debug log exists.
pub async fn record_response_grades(
    store: &Store,
    grader: &Grader,
    question_id: &str,
    response_id: &str,
) -> anyhow::Result<Vec<RecordedGrade>> {
    let response = store
        .get_response(response_id)?
        .ok_or_else(|| StoreError::not_found("response", response_id))?;
    if response.question_id != question_id {
        anyhow::bail!(
            "response {} belongs to question {}, not {}",
            response_id,
            response.question_id,
            question_id
        );
    }

    let rubrics = store.rubrics_for_question(question_id)?;
    if rubrics.is_empty() {
        tracing::warn!(event = "record.no_rubrics", question_id = %question_id);
        return Ok(Vec::new());
    }

    let components: Vec<&str> = rubrics.iter().map(|r| r.component.as_str()).collect();
    let grades = grader
        .evaluate_question(&components, &response.text)
        .await?;

    let mut recorded = Vec::with_capacity(rubrics.len());
    for (rubric, outcome) in rubrics.into_iter().zip(grades.grades) {
        let evaluation_id = match outcome.verdict.outcome() {
            Some(passed) => Some(store.add_evaluation(
                passed,
                &outcome.debug_log.to_string_lossy(),
                &rubric.id,
                &response.id,
            )?),
            None => None,
        };
        recorded.push(RecordedGrade {
            rubric,
            outcome,
            evaluation_id,
        });
    }

    tracing::info!(
        event = "record.done",
        question_id = %question_id,
        response_id = %response_id,
        graded = recorded.len(),
        stored = recorded.iter().filter(|r| r.evaluation_id.is_some()).count()
    );
    Ok(recorded)
}
