//! Answer-shape validation: the submitted value must structurally fit the
//! question it answers before it is accepted into the answer store.

use std::collections::HashSet;

use crate::domain::question::{AnswerValue, Question, QuestionKind};

pub(crate) fn validate_answer_shape(
    question: &Question,
    value: &AnswerValue,
) -> Result<(), String> {
    match (&question.kind, value) {
        (QuestionKind::Test { options }, AnswerValue::Selected { option_ids }) => {
            let known: HashSet<&str> = options.iter().map(|option| option.id.as_str()).collect();
            let mut seen = HashSet::new();
            for option_id in option_ids {
                if !known.contains(option_id.as_str()) {
                    return Err(format!("unknown option id: {option_id}"));
                }
                if !seen.insert(option_id.as_str()) {
                    return Err(format!("duplicate option id: {option_id}"));
                }
            }
            Ok(())
        }
        (QuestionKind::Open { .. }, AnswerValue::Text { .. }) => Ok(()),
        (QuestionKind::FillBlanks { blanks }, AnswerValue::Blanks { values }) => {
            if values.len() != blanks.len() {
                return Err(format!(
                    "expected {} blank values, got {}",
                    blanks.len(),
                    values.len()
                ));
            }
            Ok(())
        }
        (QuestionKind::Match { left, right, .. }, AnswerValue::Pairs { pairs }) => {
            let left_ids: HashSet<&str> = left.iter().map(|item| item.id.as_str()).collect();
            let right_ids: HashSet<&str> = right.iter().map(|item| item.id.as_str()).collect();
            let mut used_left = HashSet::new();
            for pair in pairs {
                if !left_ids.contains(pair.left.as_str()) {
                    return Err(format!("unknown left item: {}", pair.left));
                }
                if !right_ids.contains(pair.right.as_str()) {
                    return Err(format!("unknown right item: {}", pair.right));
                }
                if !used_left.insert(pair.left.as_str()) {
                    return Err(format!("left item paired twice: {}", pair.left));
                }
            }
            Ok(())
        }
        _ => Err("answer shape does not match the question type".to_string()),
    }
}
