//! Attempt lifecycle: `NotStarted -> InProgress -> Submitted(Passed | Failed)`.
//!
//! `start` and `submit` are the only writers. Both leave the race-sensitive
//! step to the store (`insert_attempt` / `finalize_attempt`), so a concurrent
//! loser gets `AttemptAlreadyInProgress` or `AttemptAlreadySubmitted`.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::cooldown::{ceil_seconds, CooldownPolicy};
use crate::error::{ExamError, ExamResult};
use crate::gate::EligibilityGate;
use crate::models::*;
use crate::scoring::{self, PassingPolicy};
use crate::store::Datastore;

pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

#[derive(Clone)]
pub struct ExamEngine {
    store: Datastore,
    gate: EligibilityGate,
    cooldown: CooldownPolicy,
    passing: PassingPolicy,
    clock: Clock,
}

impl ExamEngine {
    pub fn new(store: Datastore, cooldown: CooldownPolicy, passing: PassingPolicy) -> Self {
        Self {
            gate: EligibilityGate::new(store.clone()),
            store,
            cooldown,
            passing,
            clock: Arc::new(Utc::now),
        }
    }

    pub fn with_clock(mut self, clock: impl Fn() -> DateTime<Utc> + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    async fn require_module(&self, module_id: Uuid) -> ExamResult<Module> {
        self.store
            .module(module_id)
            .await?
            .ok_or(ExamError::ModuleNotFound(module_id))
    }

    pub async fn can_start(&self, user_id: Uuid, module_id: Uuid) -> ExamResult<Eligibility> {
        self.gate.can_start(user_id, module_id).await
    }

    pub async fn start(&self, user_id: Uuid, module_id: Uuid) -> ExamResult<StartedAttempt> {
        let module = self.require_module(module_id).await?;

        let eligibility = self.gate.eligibility_for(user_id, &module).await?;
        if !eligibility.eligible {
            return Err(ExamError::NotEligible {
                completed_count: eligibility.completed_count,
                total_count: eligibility.total_count,
            });
        }

        let questions = self.store.questions(module_id).await?;

        let now = self.now();
        let cooldown = self.cooldown;
        let admit = move |pair: &PairState| {
            if pair.in_progress.is_some() {
                return Err(ExamError::AttemptAlreadyInProgress);
            }
            cooldown.admit(pair.last_submitted_at, now)
        };

        let attempt = match self
            .store
            .insert_attempt(user_id, module_id, now, &admit)
            .await
        {
            Ok(attempt) => attempt,
            Err(err @ (ExamError::AttemptAlreadyInProgress | ExamError::CooldownActive { .. })) => {
                tracing::debug!(%user_id, %module_id, reason = err.kind(), "start rejected");
                return Err(err);
            }
            Err(err) => return Err(err),
        };

        tracing::info!(
            %user_id,
            %module_id,
            attempt_id = attempt.id,
            questions = questions.len(),
            "attempt started"
        );

        Ok(StartedAttempt {
            attempt_id: attempt.id,
            questions: questions.iter().map(PublicQuestion::from).collect(),
        })
    }

    pub async fn submit(
        &self,
        user_id: Uuid,
        attempt_id: AttemptId,
        answers: Answers,
    ) -> ExamResult<SubmitResult> {
        self.submit_inner(user_id, None, attempt_id, answers).await
    }

    /// Like `submit`, but an attempt of another module counts as not found.
    pub async fn submit_in_module(
        &self,
        user_id: Uuid,
        module_id: Uuid,
        attempt_id: AttemptId,
        answers: Answers,
    ) -> ExamResult<SubmitResult> {
        self.submit_inner(user_id, Some(module_id), attempt_id, answers)
            .await
    }

    async fn submit_inner(
        &self,
        user_id: Uuid,
        module_id: Option<Uuid>,
        attempt_id: AttemptId,
        answers: Answers,
    ) -> ExamResult<SubmitResult> {
        let attempt = self
            .store
            .attempt(attempt_id)
            .await?
            .filter(|a| module_id.map_or(true, |m| m == a.module_id))
            .ok_or(ExamError::AttemptNotFound(attempt_id))?;
        if attempt.user_id != user_id {
            return Err(ExamError::AttemptNotOwned(attempt_id));
        }
        if attempt.is_submitted() {
            tracing::debug!(%user_id, attempt_id, "submit rejected, already submitted");
            return Err(ExamError::AttemptAlreadySubmitted(attempt_id));
        }

        let module = self.require_module(attempt.module_id).await?;
        let questions = self.store.questions(module.id).await?;
        let grade = scoring::grade(&questions, &answers, self.passing.threshold_for(&module));

        let submission = Submission {
            submitted_at: self.now(),
            score: grade.score,
            passed: grade.passed,
            answers,
        };
        let Some(stored) = self.store.finalize_attempt(attempt_id, &submission).await? else {
            tracing::debug!(%user_id, attempt_id, "submit lost race");
            return Err(ExamError::AttemptAlreadySubmitted(attempt_id));
        };

        self.cooldown
            .record_outcome(user_id, module.id, submission.submitted_at);
        tracing::info!(
            %user_id,
            module_id = %module.id,
            attempt_id,
            score = grade.score,
            passed = grade.passed,
            correct = grade.correct,
            total = grade.total,
            "attempt submitted"
        );

        Ok(SubmitResult {
            score: stored.score.unwrap_or(grade.score),
            passed: stored.passed.unwrap_or(grade.passed),
            attempt_id,
        })
    }

    pub async fn remaining_cooldown(&self, user_id: Uuid, module_id: Uuid) -> ExamResult<CooldownStatus> {
        self.require_module(module_id).await?;
        let remaining = self
            .cooldown
            .remaining_cooldown(&self.store, user_id, module_id, self.now())
            .await?;
        Ok(CooldownStatus {
            remaining_seconds: ceil_seconds(remaining),
        })
    }

    pub async fn history(&self, user_id: Uuid, module_id: Uuid) -> ExamResult<Vec<Attempt>> {
        self.require_module(module_id).await?;
        self.store.attempts(user_id, module_id).await
    }

    pub async fn mark_lesson_complete(&self, user_id: Uuid, lesson_id: Uuid) -> ExamResult<()> {
        if !self
            .store
            .mark_lesson_complete(user_id, lesson_id, self.now())
            .await?
        {
            return Err(ExamError::LessonNotFound(lesson_id));
        }
        tracing::info!(%user_id, %lesson_id, "lesson completed");
        Ok(())
    }
}
