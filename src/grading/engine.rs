//! Per-question scoring. Pure and deterministic: no I/O, no clock, no
//! side effects. Malformed definitions never abort an attempt; the
//! question scores 0 and is flagged as an anomaly for teacher review.

use std::collections::HashSet;

use crate::domain::question::{AnswerValue, MatchPair, Question, QuestionKind, TestOption};

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct QuestionGrade {
    /// None means manual-grading-only: a teacher must enter the score.
    pub(crate) score: Option<f64>,
    pub(crate) anomaly: bool,
}

impl QuestionGrade {
    fn scored(score: f64) -> Self {
        Self { score: Some(score), anomaly: false }
    }

    fn manual() -> Self {
        Self { score: None, anomaly: false }
    }

    fn anomaly() -> Self {
        Self { score: Some(0.0), anomaly: true }
    }
}

pub(crate) fn grade(question: &Question, value: &AnswerValue) -> QuestionGrade {
    match (&question.kind, value) {
        (QuestionKind::Test { options }, AnswerValue::Selected { option_ids }) => {
            grade_test(question, options, option_ids)
        }
        (QuestionKind::Open { expected, keywords }, AnswerValue::Text { text }) => {
            grade_open(question, expected.as_deref(), keywords, text)
        }
        (QuestionKind::FillBlanks { blanks }, AnswerValue::Blanks { values }) => {
            grade_fill_blanks(question, blanks, values)
        }
        (QuestionKind::Match { pairs, .. }, AnswerValue::Pairs { pairs: submitted }) => {
            grade_match(question, pairs, submitted)
        }
        // Answer shape does not fit the question type.
        _ => QuestionGrade::anomaly(),
    }
}

fn grade_test(question: &Question, options: &[TestOption], option_ids: &[String]) -> QuestionGrade {
    let correct: HashSet<&str> =
        options.iter().filter(|option| option.correct).map(|option| option.id.as_str()).collect();
    if correct.is_empty() {
        return QuestionGrade::anomaly();
    }

    let submitted: HashSet<&str> = option_ids.iter().map(String::as_str).collect();

    if !question.partial_credit {
        let score = if submitted == correct { question.max_score } else { 0.0 };
        return QuestionGrade::scored(score);
    }

    let correct_picks = submitted.intersection(&correct).count() as f64;
    let incorrect_picks = submitted.difference(&correct).count() as f64;
    let ratio = ((correct_picks - incorrect_picks).max(0.0)) / correct.len() as f64;
    QuestionGrade::scored(question.max_score * ratio)
}

fn grade_open(
    question: &Question,
    expected: Option<&str>,
    keywords: &[String],
    text: &str,
) -> QuestionGrade {
    if let Some(expected) = expected {
        let score = if normalize(text) == normalize(expected) { question.max_score } else { 0.0 };
        return QuestionGrade::scored(score);
    }

    if !keywords.is_empty() {
        let haystack = text.to_lowercase();
        let found = keywords
            .iter()
            .filter(|keyword| haystack.contains(&keyword.to_lowercase()))
            .count() as f64;
        let raw = question.max_score * found / keywords.len() as f64;
        return QuestionGrade::scored(round_half_up_one_decimal(raw));
    }

    QuestionGrade::manual()
}

fn grade_fill_blanks(question: &Question, blanks: &[String], values: &[String]) -> QuestionGrade {
    if blanks.is_empty() {
        return QuestionGrade::anomaly();
    }

    let matched = blanks
        .iter()
        .zip(values.iter())
        .filter(|(expected, submitted)| normalize(submitted) == normalize(expected))
        .count() as f64;
    QuestionGrade::scored(question.max_score * matched / blanks.len() as f64)
}

fn grade_match(question: &Question, pairs: &[MatchPair], submitted: &[MatchPair]) -> QuestionGrade {
    if pairs.is_empty() {
        return QuestionGrade::anomaly();
    }

    let correct: HashSet<&MatchPair> = pairs.iter().collect();
    let given: HashSet<&MatchPair> = submitted.iter().collect();

    if !question.partial_credit {
        let score = if given == correct { question.max_score } else { 0.0 };
        return QuestionGrade::scored(score);
    }

    // A wrong pairing contributes nothing, never negative.
    let matched = given.intersection(&correct).count() as f64;
    QuestionGrade::scored(question.max_score * matched / correct.len() as f64)
}

fn normalize(value: &str) -> String {
    value.trim().to_lowercase()
}

fn round_half_up_one_decimal(value: f64) -> f64 {
    (value * 10.0 + 0.5).floor() / 10.0
}
