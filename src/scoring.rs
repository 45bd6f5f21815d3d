//! Grading of submitted answers. Pure: no I/O, no hidden state.

use serde::Serialize;
use std::collections::BTreeSet;
use uuid::Uuid;

use crate::models::{Answers, Module, Question};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Grade {
    /// Percentage in `0.0..=100.0`, one decimal.
    pub score: f64,
    pub passed: bool,
    pub correct: usize,
    pub total: usize,
}

/// Passing threshold resolution: a module's own threshold wins over the default.
#[derive(Debug, Clone, Copy)]
pub struct PassingPolicy {
    default_threshold: f64,
}

impl PassingPolicy {
    pub fn new(default_threshold: f64) -> Self {
        Self { default_threshold }
    }

    pub fn threshold_for(&self, module: &Module) -> f64 {
        module.passing_threshold.unwrap_or(self.default_threshold)
    }
}

/// Single-answer kinds need exactly the one correct option; multiple choice
/// needs the exact correct set. No partial credit.
pub fn is_correct(question: &Question, submitted: Option<&BTreeSet<Uuid>>) -> bool {
    let Some(submitted) = submitted else {
        return false;
    };
    let correct = question.correct_options();
    if correct.is_empty() {
        return false;
    }
    if question.kind.is_single_answer() && submitted.len() != 1 {
        return false;
    }
    *submitted == correct
}

pub fn round_score(raw: f64) -> f64 {
    (raw * 10.0).round() / 10.0
}

pub fn grade(questions: &[Question], answers: &Answers, passing_threshold: f64) -> Grade {
    let total = questions.len();
    let correct = questions
        .iter()
        .filter(|q| is_correct(q, answers.get(&q.id)))
        .count();

    if total == 0 {
        return Grade {
            score: 0.0,
            passed: false,
            correct: 0,
            total: 0,
        };
    }

    let score = round_score(correct as f64 / total as f64 * 100.0);
    Grade {
        score,
        passed: score >= passing_threshold,
        correct,
        total,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AnswerOption, QuestionKind};

    fn question(kind: QuestionKind, flags: &[bool]) -> Question {
        let module_id = Uuid::nil();
        Question {
            id: Uuid::new_v4(),
            module_id,
            position: 0,
            kind,
            prompt: String::new(),
            options: flags
                .iter()
                .enumerate()
                .map(|(i, &is_correct)| AnswerOption {
                    id: Uuid::new_v4(),
                    position: i as i32,
                    body: format!("option {i}"),
                    is_correct,
                })
                .collect(),
        }
    }

    fn pick(q: &Question, idx: &[usize]) -> BTreeSet<Uuid> {
        idx.iter().map(|&i| q.options[i].id).collect()
    }

    #[test]
    fn single_choice_needs_the_one_correct_option() {
        let q = question(QuestionKind::SingleChoice, &[false, true, false]);
        assert!(is_correct(&q, Some(&pick(&q, &[1]))));
        assert!(!is_correct(&q, Some(&pick(&q, &[0]))));
        assert!(!is_correct(&q, Some(&pick(&q, &[1, 2]))));
        assert!(!is_correct(&q, None));
    }

    #[test]
    fn multiple_choice_has_no_partial_credit() {
        let q = question(QuestionKind::MultipleChoice, &[true, true, false]);
        assert!(is_correct(&q, Some(&pick(&q, &[0, 1]))));
        assert!(!is_correct(&q, Some(&pick(&q, &[0]))));
        assert!(!is_correct(&q, Some(&pick(&q, &[0, 1, 2]))));
    }

    #[test]
    fn unknown_option_is_incorrect() {
        let q = question(QuestionKind::TrueFalse, &[true, false]);
        assert!(!is_correct(&q, Some(&BTreeSet::from([Uuid::new_v4()]))));
    }

    #[test]
    fn score_rounds_to_one_decimal() {
        let qs: Vec<_> = (0..3)
            .map(|_| question(QuestionKind::SingleChoice, &[true, false]))
            .collect();
        let mut answers = Answers::new();
        answers.insert(qs[0].id, pick(&qs[0], &[0]));
        let g = grade(&qs, &answers, 30.0);
        assert_eq!(g.score, 33.3);
        assert!(g.passed);

        answers.insert(qs[1].id, pick(&qs[1], &[0]));
        assert_eq!(grade(&qs, &answers, 70.0).score, 66.7);
        assert!(!grade(&qs, &answers, 70.0).passed);
    }

    #[test]
    fn grading_is_deterministic() {
        let qs: Vec<_> = (0..5)
            .map(|i| question(QuestionKind::MultipleChoice, &[true, i % 2 == 0, false]))
            .collect();
        let answers: Answers = qs.iter().map(|q| (q.id, pick(q, &[0, 1]))).collect();
        let first = grade(&qs, &answers, 50.0);
        for _ in 0..10 {
            assert_eq!(grade(&qs, &answers, 50.0), first);
        }
        assert_eq!(first.correct, 3);
        assert_eq!(first.score, 60.0);
    }

    #[test]
    fn empty_exam_never_passes() {
        let g = grade(&[], &Answers::new(), 0.0);
        assert_eq!(g.score, 0.0);
        assert!(!g.passed);
    }

    #[test]
    fn module_threshold_overrides_default() {
        let policy = PassingPolicy::new(60.0);
        let mut module = Module {
            id: Uuid::new_v4(),
            title: "m".into(),
            passing_threshold: None,
        };
        assert_eq!(policy.threshold_for(&module), 60.0);
        module.passing_threshold = Some(50.0);
        assert_eq!(policy.threshold_for(&module), 50.0);
    }
}
