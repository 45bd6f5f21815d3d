//! Datastore access for the exam engine.
//!
//! `ExamStore` is the capability every component is built on. Implementations
//! own atomicity: `insert_attempt` must check and insert as one serialized unit
//! per (user, module), and `finalize_attempt` must only touch attempts that are
//! still in progress. `Datastore` wraps any implementation and bounds every
//! call with a timeout so nothing above it can hang on I/O.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::error::{ExamError, ExamResult};
use crate::models::{Attempt, AttemptId, LessonTally, Module, PairState, Question, Submission};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Admission check run by `insert_attempt` while the pair is locked.
pub type Admission<'a> = &'a (dyn Fn(&PairState) -> ExamResult<()> + Send + Sync);

#[async_trait]
pub trait ExamStore: Send + Sync {
    async fn module(&self, module_id: Uuid) -> ExamResult<Option<Module>>;

    async fn lesson_tally(&self, user_id: Uuid, module_id: Uuid) -> ExamResult<LessonTally>;

    /// Upserts the progress row as completed. Returns `false` when the lesson does not exist.
    async fn mark_lesson_complete(
        &self,
        user_id: Uuid,
        lesson_id: Uuid,
        at: DateTime<Utc>,
    ) -> ExamResult<bool>;

    /// Questions of a module with their options, both in position order.
    async fn questions(&self, module_id: Uuid) -> ExamResult<Vec<Question>>;

    async fn last_submitted_at(
        &self,
        user_id: Uuid,
        module_id: Uuid,
    ) -> ExamResult<Option<DateTime<Utc>>>;

    /// Inserts an in-progress attempt if `admit` accepts the pair's current state.
    async fn insert_attempt(
        &self,
        user_id: Uuid,
        module_id: Uuid,
        started_at: DateTime<Utc>,
        admit: Admission<'_>,
    ) -> ExamResult<Attempt>;

    async fn attempt(&self, attempt_id: AttemptId) -> ExamResult<Option<Attempt>>;

    /// Freezes an in-progress attempt. `None` means it was already submitted.
    async fn finalize_attempt(
        &self,
        attempt_id: AttemptId,
        submission: &Submission,
    ) -> ExamResult<Option<Attempt>>;

    /// All attempts of a pair, newest first.
    async fn attempts(&self, user_id: Uuid, module_id: Uuid) -> ExamResult<Vec<Attempt>>;
}

/// Shared, timeout-bounded handle to an `ExamStore`.
#[derive(Clone)]
pub struct Datastore {
    inner: Arc<dyn ExamStore>,
    timeout: Duration,
}

impl Datastore {
    pub fn new(inner: Arc<dyn ExamStore>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn bounded<T>(&self, fut: impl Future<Output = ExamResult<T>>) -> ExamResult<T> {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(res) => res,
            Err(_) => Err(ExamError::DatastoreTimeout),
        }
    }

    pub async fn module(&self, module_id: Uuid) -> ExamResult<Option<Module>> {
        self.bounded(self.inner.module(module_id)).await
    }

    pub async fn lesson_tally(&self, user_id: Uuid, module_id: Uuid) -> ExamResult<LessonTally> {
        self.bounded(self.inner.lesson_tally(user_id, module_id)).await
    }

    pub async fn mark_lesson_complete(
        &self,
        user_id: Uuid,
        lesson_id: Uuid,
        at: DateTime<Utc>,
    ) -> ExamResult<bool> {
        self.bounded(self.inner.mark_lesson_complete(user_id, lesson_id, at))
            .await
    }

    pub async fn questions(&self, module_id: Uuid) -> ExamResult<Vec<Question>> {
        self.bounded(self.inner.questions(module_id)).await
    }

    pub async fn last_submitted_at(
        &self,
        user_id: Uuid,
        module_id: Uuid,
    ) -> ExamResult<Option<DateTime<Utc>>> {
        self.bounded(self.inner.last_submitted_at(user_id, module_id))
            .await
    }

    pub async fn insert_attempt(
        &self,
        user_id: Uuid,
        module_id: Uuid,
        started_at: DateTime<Utc>,
        admit: Admission<'_>,
    ) -> ExamResult<Attempt> {
        self.bounded(
            self.inner
                .insert_attempt(user_id, module_id, started_at, admit),
        )
        .await
    }

    pub async fn attempt(&self, attempt_id: AttemptId) -> ExamResult<Option<Attempt>> {
        self.bounded(self.inner.attempt(attempt_id)).await
    }

    pub async fn finalize_attempt(
        &self,
        attempt_id: AttemptId,
        submission: &Submission,
    ) -> ExamResult<Option<Attempt>> {
        self.bounded(self.inner.finalize_attempt(attempt_id, submission))
            .await
    }

    pub async fn attempts(&self, user_id: Uuid, module_id: Uuid) -> ExamResult<Vec<Attempt>> {
        self.bounded(self.inner.attempts(user_id, module_id)).await
    }
}
