//! In-process `ExamStore`.
//!
//! A single async mutex guards all state, so every trait call is atomic. Backs
//! the engine and HTTP tests; the binary always runs on `PgStore`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{Admission, ExamStore};
use crate::error::ExamResult;
use crate::models::*;

#[derive(Default)]
struct State {
    modules: HashMap<Uuid, Module>,
    lessons: HashMap<Uuid, Lesson>,
    progress: HashMap<(Uuid, Uuid), bool>,
    questions: HashMap<Uuid, Vec<Question>>,
    attempts: BTreeMap<AttemptId, Attempt>,
    answers: HashMap<AttemptId, Answers>,
    next_attempt_id: AttemptId,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    latency: Option<Duration>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays every call, to exercise datastore timeouts.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    async fn lag(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }

    pub async fn add_module(&self, module: Module) {
        self.state.lock().await.modules.insert(module.id, module);
    }

    pub async fn add_lesson(&self, lesson: Lesson) {
        self.state.lock().await.lessons.insert(lesson.id, lesson);
    }

    pub async fn add_question(&self, question: Question) {
        let mut state = self.state.lock().await;
        let list = state.questions.entry(question.module_id).or_default();
        list.push(question);
        list.sort_by_key(|q| q.position);
    }

    /// Writes a progress row directly, including `completed = false`.
    pub async fn set_progress(&self, user_id: Uuid, lesson_id: Uuid, completed: bool) {
        self.state
            .lock()
            .await
            .progress
            .insert((user_id, lesson_id), completed);
    }

    /// Answers stored with a submitted attempt.
    pub async fn answers(&self, attempt_id: AttemptId) -> Option<Answers> {
        self.state.lock().await.answers.get(&attempt_id).cloned()
    }
}

#[async_trait]
impl ExamStore for MemoryStore {
    async fn module(&self, module_id: Uuid) -> ExamResult<Option<Module>> {
        self.lag().await;
        Ok(self.state.lock().await.modules.get(&module_id).cloned())
    }

    async fn lesson_tally(&self, user_id: Uuid, module_id: Uuid) -> ExamResult<LessonTally> {
        self.lag().await;
        let state = self.state.lock().await;
        let mut tally = LessonTally::default();
        for lesson in state.lessons.values().filter(|l| l.module_id == module_id) {
            tally.total += 1;
            if state
                .progress
                .get(&(user_id, lesson.id))
                .copied()
                .unwrap_or(false)
            {
                tally.completed += 1;
            }
        }
        Ok(tally)
    }

    async fn mark_lesson_complete(
        &self,
        user_id: Uuid,
        lesson_id: Uuid,
        _at: DateTime<Utc>,
    ) -> ExamResult<bool> {
        self.lag().await;
        let mut state = self.state.lock().await;
        if !state.lessons.contains_key(&lesson_id) {
            return Ok(false);
        }
        state.progress.insert((user_id, lesson_id), true);
        Ok(true)
    }

    async fn questions(&self, module_id: Uuid) -> ExamResult<Vec<Question>> {
        self.lag().await;
        let state = self.state.lock().await;
        let mut questions = state.questions.get(&module_id).cloned().unwrap_or_default();
        for q in &mut questions {
            q.options.sort_by_key(|o| o.position);
        }
        Ok(questions)
    }

    async fn last_submitted_at(
        &self,
        user_id: Uuid,
        module_id: Uuid,
    ) -> ExamResult<Option<DateTime<Utc>>> {
        self.lag().await;
        let state = self.state.lock().await;
        Ok(pair_state(&state, user_id, module_id).last_submitted_at)
    }

    async fn insert_attempt(
        &self,
        user_id: Uuid,
        module_id: Uuid,
        started_at: DateTime<Utc>,
        admit: Admission<'_>,
    ) -> ExamResult<Attempt> {
        self.lag().await;
        let mut state = self.state.lock().await;
        admit(&pair_state(&state, user_id, module_id))?;

        state.next_attempt_id += 1;
        let attempt = Attempt {
            id: state.next_attempt_id,
            user_id,
            module_id,
            started_at,
            submitted_at: None,
            score: None,
            passed: None,
        };
        state.attempts.insert(attempt.id, attempt.clone());
        Ok(attempt)
    }

    async fn attempt(&self, attempt_id: AttemptId) -> ExamResult<Option<Attempt>> {
        self.lag().await;
        Ok(self.state.lock().await.attempts.get(&attempt_id).cloned())
    }

    async fn finalize_attempt(
        &self,
        attempt_id: AttemptId,
        submission: &Submission,
    ) -> ExamResult<Option<Attempt>> {
        self.lag().await;
        let mut state = self.state.lock().await;
        let Some(attempt) = state.attempts.get_mut(&attempt_id) else {
            return Ok(None);
        };
        if attempt.is_submitted() {
            return Ok(None);
        }
        attempt.submitted_at = Some(submission.submitted_at);
        attempt.score = Some(submission.score);
        attempt.passed = Some(submission.passed);
        let attempt = attempt.clone();
        state.answers.insert(attempt_id, submission.answers.clone());
        Ok(Some(attempt))
    }

    async fn attempts(&self, user_id: Uuid, module_id: Uuid) -> ExamResult<Vec<Attempt>> {
        self.lag().await;
        let state = self.state.lock().await;
        Ok(state
            .attempts
            .values()
            .rev()
            .filter(|a| a.user_id == user_id && a.module_id == module_id)
            .cloned()
            .collect())
    }
}

fn pair_state(state: &State, user_id: Uuid, module_id: Uuid) -> PairState {
    let mut pair = PairState::default();
    for a in state
        .attempts
        .values()
        .filter(|a| a.user_id == user_id && a.module_id == module_id)
    {
        match a.submitted_at {
            None => pair.in_progress = Some(a.id),
            Some(at) => {
                pair.last_submitted_at = Some(pair.last_submitted_at.map_or(at, |prev| prev.max(at)))
            }
        }
    }
    pair
}
