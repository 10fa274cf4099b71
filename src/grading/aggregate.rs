//! Attempt-level aggregation over the per-question engine. Manual grades
//! always win: a question a teacher has scored is never recomputed.

use crate::domain::models::Answer;
use crate::domain::question::Question;
use crate::grading::engine;

#[derive(Debug, Clone)]
pub(crate) struct AttemptAggregate {
    pub(crate) score: f64,
    pub(crate) max_score: f64,
    pub(crate) percentage: f64,
    pub(crate) grade: f64,
    pub(crate) anomalies: u32,
    /// Questions submitted but only gradable by a teacher.
    pub(crate) pending_manual: Vec<String>,
}

impl AttemptAggregate {
    pub(crate) fn needs_review(&self) -> bool {
        !self.pending_manual.is_empty()
    }
}

/// Grades every answered question that has no manual grade yet, writes the
/// computed score and anomaly flag back onto the answers, and sums the
/// aggregate. Unanswered questions contribute 0 but still count toward the
/// maximum.
pub(crate) fn grade_attempt(
    questions: &[Question],
    answers: &mut [Answer],
    scale_max: f64,
) -> AttemptAggregate {
    let mut score = 0.0;
    let mut max_score = 0.0;
    let mut anomalies = 0;
    let mut pending_manual = Vec::new();

    for question in questions {
        max_score += question.max_score;

        let Some(answer) = answers.iter_mut().find(|answer| answer.question_id == question.id)
        else {
            continue;
        };

        if answer.manually_graded {
            score += answer.score.unwrap_or(0.0);
            continue;
        }

        let graded = engine::grade(question, &answer.value);
        answer.score = graded.score;
        answer.anomaly = graded.anomaly;

        if graded.anomaly {
            anomalies += 1;
        }

        match graded.score {
            Some(value) => score += value,
            None => pending_manual.push(question.id.clone()),
        }
    }

    let percentage = if max_score > 0.0 { score / max_score * 100.0 } else { 0.0 };
    let grade = percentage / 100.0 * scale_max;

    AttemptAggregate { score, max_score, percentage, grade, anomalies, pending_manual }
}
