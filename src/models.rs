use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::str::FromStr;
use uuid::Uuid;

pub type AttemptId = i64;

/// Submitted answers: question id -> chosen option ids.
pub type Answers = HashMap<Uuid, BTreeSet<Uuid>>;

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone)]
pub struct Module {
    pub id: Uuid,
    pub title: String,
    /// Overrides the configured default when set.
    pub passing_threshold: Option<f64>,
}

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone)]
pub struct Lesson {
    pub id: Uuid,
    pub module_id: Uuid,
    pub position: i32,
    pub title: String,
}

/// Lesson completion counts for one (user, module) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LessonTally {
    pub completed: i64,
    pub total: i64,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum QuestionKind {
    SingleChoice,
    MultipleChoice,
    TrueFalse,
}

impl QuestionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionKind::SingleChoice => "single_choice",
            QuestionKind::MultipleChoice => "multiple_choice",
            QuestionKind::TrueFalse => "true_false",
        }
    }

    /// Kinds graded against exactly one chosen option.
    pub fn is_single_answer(&self) -> bool {
        !matches!(self, QuestionKind::MultipleChoice)
    }
}

impl FromStr for QuestionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "single_choice" => Ok(QuestionKind::SingleChoice),
            "multiple_choice" => Ok(QuestionKind::MultipleChoice),
            "true_false" => Ok(QuestionKind::TrueFalse),
            other => Err(format!("unknown question kind: {other}")),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AnswerOption {
    pub id: Uuid,
    pub position: i32,
    pub body: String,
    pub is_correct: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Question {
    pub id: Uuid,
    pub module_id: Uuid,
    pub position: i32,
    pub kind: QuestionKind,
    pub prompt: String,
    /// Ordered by `position`.
    pub options: Vec<AnswerOption>,
}

impl Question {
    pub fn correct_options(&self) -> BTreeSet<Uuid> {
        self.options
            .iter()
            .filter(|o| o.is_correct)
            .map(|o| o.id)
            .collect()
    }
}

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Attempt {
    pub id: AttemptId,
    pub user_id: Uuid,
    pub module_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub score: Option<f64>,
    pub passed: Option<bool>,
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    InProgress,
    Passed,
    Failed,
}

impl Attempt {
    pub fn status(&self) -> AttemptStatus {
        match (self.submitted_at, self.passed) {
            (None, _) => AttemptStatus::InProgress,
            (Some(_), Some(true)) => AttemptStatus::Passed,
            (Some(_), _) => AttemptStatus::Failed,
        }
    }

    pub fn is_submitted(&self) -> bool {
        self.submitted_at.is_some()
    }
}

/// What the store sees about a (user, module) pair while admitting a new attempt.
#[derive(Debug, Clone, Copy, Default)]
pub struct PairState {
    pub in_progress: Option<AttemptId>,
    pub last_submitted_at: Option<DateTime<Utc>>,
}

/// Frozen outcome written when an attempt is submitted.
#[derive(Debug, Clone)]
pub struct Submission {
    pub submitted_at: DateTime<Utc>,
    pub score: f64,
    pub passed: bool,
    pub answers: Answers,
}

// --- wire types ---

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Eligibility {
    pub eligible: bool,
    pub completed_count: i64,
    pub total_count: i64,
}

impl From<LessonTally> for Eligibility {
    fn from(tally: LessonTally) -> Self {
        Eligibility {
            // an empty module is never eligible
            eligible: tally.total > 0 && tally.completed >= tally.total,
            completed_count: tally.completed,
            total_count: tally.total,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PublicOption {
    pub option_id: Uuid,
    pub text: String,
}

/// A question as handed to the learner: no correctness flags.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PublicQuestion {
    pub question_id: Uuid,
    #[serde(rename = "type")]
    pub kind: QuestionKind,
    pub text: String,
    pub options: Vec<PublicOption>,
}

impl From<&Question> for PublicQuestion {
    fn from(q: &Question) -> Self {
        PublicQuestion {
            question_id: q.id,
            kind: q.kind,
            text: q.prompt.clone(),
            options: q
                .options
                .iter()
                .map(|o| PublicOption {
                    option_id: o.id,
                    text: o.body.clone(),
                })
                .collect(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct StartedAttempt {
    pub attempt_id: AttemptId,
    pub questions: Vec<PublicQuestion>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct AnswerEntry {
    pub question_id: Uuid,
    #[serde(default)]
    pub option_id: Option<Uuid>,
    #[serde(default)]
    pub option_ids: Option<Vec<Uuid>>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct SubmitReq {
    pub attempt_id: AttemptId,
    #[serde(default)]
    pub answers: Vec<AnswerEntry>,
}

impl SubmitReq {
    /// Folds the entry list into an answer map. A later entry for the same
    /// question replaces an earlier one; an entry with no options maps to an
    /// empty set, which grades as incorrect.
    pub fn answer_map(&self) -> Answers {
        let mut answers = Answers::new();
        for entry in &self.answers {
            let chosen: BTreeSet<Uuid> = entry
                .option_id
                .into_iter()
                .chain(entry.option_ids.iter().flatten().copied())
                .collect();
            answers.insert(entry.question_id, chosen);
        }
        answers
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResult {
    pub score: f64,
    pub passed: bool,
    pub attempt_id: AttemptId,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CooldownStatus {
    pub remaining_seconds: i64,
}
