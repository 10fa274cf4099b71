use serde::{Deserialize, Serialize};

/// Read-only exam content as delivered by the catalog collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ExamDef {
    pub(crate) id: String,
    pub(crate) title: String,
    #[serde(default)]
    pub(crate) time_limit_minutes: Option<u64>,
    #[serde(default)]
    pub(crate) grade_on_abandon: bool,
    pub(crate) questions: Vec<Question>,
}

impl ExamDef {
    pub(crate) fn question(&self, question_id: &str) -> Option<&Question> {
        self.questions.iter().find(|question| question.id == question_id)
    }
}

/// One access code grant: the code, the exam it opens and who it was issued to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct CodeGrant {
    pub(crate) code: String,
    pub(crate) exam_id: String,
    #[serde(default)]
    pub(crate) student_name: Option<String>,
    #[serde(default)]
    pub(crate) pdf_mode: bool,
    #[serde(default)]
    pub(crate) revoked: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct Question {
    pub(crate) id: String,
    pub(crate) prompt: String,
    pub(crate) max_score: f64,
    #[serde(default)]
    pub(crate) partial_credit: bool,
    #[serde(flatten)]
    pub(crate) kind: QuestionKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum QuestionKind {
    Test {
        options: Vec<TestOption>,
    },
    Open {
        #[serde(default)]
        expected: Option<String>,
        #[serde(default)]
        keywords: Vec<String>,
    },
    FillBlanks {
        blanks: Vec<String>,
    },
    Match {
        left: Vec<MatchItem>,
        right: Vec<MatchItem>,
        pairs: Vec<MatchPair>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct TestOption {
    pub(crate) id: String,
    pub(crate) text: String,
    #[serde(default)]
    pub(crate) correct: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct MatchItem {
    pub(crate) id: String,
    pub(crate) text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub(crate) struct MatchPair {
    pub(crate) left: String,
    pub(crate) right: String,
}

/// Submitted answer payload, mirroring the four question shapes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum AnswerValue {
    Selected { option_ids: Vec<String> },
    Text { text: String },
    Blanks { values: Vec<String> },
    Pairs { pairs: Vec<MatchPair> },
}
