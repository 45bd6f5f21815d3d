use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{query, query_as, query_scalar};
use std::collections::HashMap;
use uuid::Uuid;

use super::{Admission, ExamStore};
use crate::db::Db;
use crate::error::{ExamError, ExamResult};
use crate::models::*;

/// Postgres `unique_violation`.
const PG_UNIQUE_VIOLATION: &str = "23505";

const ATTEMPT_COLUMNS: &str = "id, user_id, module_id, started_at, submitted_at, score, passed";

#[derive(sqlx::FromRow)]
struct QuestionRow {
    id: Uuid,
    module_id: Uuid,
    position: i32,
    kind: String,
    prompt: String,
}

#[derive(sqlx::FromRow)]
struct OptionRow {
    id: Uuid,
    question_id: Uuid,
    position: i32,
    body: String,
    is_correct: bool,
}

#[derive(Clone)]
pub struct PgStore {
    db: Db,
}

impl PgStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ExamStore for PgStore {
    async fn module(&self, module_id: Uuid) -> ExamResult<Option<Module>> {
        let module = query_as::<_, Module>(
            "SELECT id, title, passing_threshold FROM modules WHERE id = $1",
        )
        .bind(module_id)
        .fetch_optional(&self.db)
        .await?;
        Ok(module)
    }

    async fn lesson_tally(&self, user_id: Uuid, module_id: Uuid) -> ExamResult<LessonTally> {
        let (total, completed): (i64, i64) = query_as(
            r#"
            SELECT count(*) AS total,
                   count(*) FILTER (WHERE p.completed) AS completed
            FROM lessons l
            LEFT JOIN lesson_progress p ON p.lesson_id = l.id AND p.user_id = $2
            WHERE l.module_id = $1
            "#,
        )
        .bind(module_id)
        .bind(user_id)
        .fetch_one(&self.db)
        .await?;
        Ok(LessonTally { completed, total })
    }

    async fn mark_lesson_complete(
        &self,
        user_id: Uuid,
        lesson_id: Uuid,
        at: DateTime<Utc>,
    ) -> ExamResult<bool> {
        let done = query(
            r#"
            INSERT INTO lesson_progress (user_id, lesson_id, completed, updated_at)
            SELECT $1, id, TRUE, $3 FROM lessons WHERE id = $2
            ON CONFLICT (user_id, lesson_id)
            DO UPDATE SET completed = TRUE, updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(user_id)
        .bind(lesson_id)
        .bind(at)
        .execute(&self.db)
        .await?;
        Ok(done.rows_affected() > 0)
    }

    async fn questions(&self, module_id: Uuid) -> ExamResult<Vec<Question>> {
        let rows = query_as::<_, QuestionRow>(
            "SELECT id, module_id, position, kind, prompt FROM questions WHERE module_id = $1 ORDER BY position, id",
        )
        .bind(module_id)
        .fetch_all(&self.db)
        .await?;

        let option_rows = query_as::<_, OptionRow>(
            r#"
            SELECT o.id, o.question_id, o.position, o.body, o.is_correct
            FROM question_options o
            JOIN questions q ON q.id = o.question_id
            WHERE q.module_id = $1
            ORDER BY o.position, o.id
            "#,
        )
        .bind(module_id)
        .fetch_all(&self.db)
        .await?;

        let mut options: HashMap<Uuid, Vec<AnswerOption>> = HashMap::new();
        for o in option_rows {
            options.entry(o.question_id).or_default().push(AnswerOption {
                id: o.id,
                position: o.position,
                body: o.body,
                is_correct: o.is_correct,
            });
        }

        rows.into_iter()
            .map(|r| {
                // kind is CHECK-constrained, so a parse failure means schema drift
                let kind = r.kind.parse().map_err(ExamError::DatastoreUnavailable)?;
                Ok(Question {
                    options: options.remove(&r.id).unwrap_or_default(),
                    id: r.id,
                    module_id: r.module_id,
                    position: r.position,
                    kind,
                    prompt: r.prompt,
                })
            })
            .collect()
    }

    async fn last_submitted_at(
        &self,
        user_id: Uuid,
        module_id: Uuid,
    ) -> ExamResult<Option<DateTime<Utc>>> {
        let at = query_scalar::<_, Option<DateTime<Utc>>>(
            "SELECT max(submitted_at) FROM attempts WHERE user_id = $1 AND module_id = $2",
        )
        .bind(user_id)
        .bind(module_id)
        .fetch_one(&self.db)
        .await?;
        Ok(at)
    }

    async fn insert_attempt(
        &self,
        user_id: Uuid,
        module_id: Uuid,
        started_at: DateTime<Utc>,
        admit: Admission<'_>,
    ) -> ExamResult<Attempt> {
        let mut tx = self.db.begin().await?;

        // serialize concurrent starts for the same pair until commit
        query("SELECT pg_advisory_xact_lock(hashtextextended($1 || ':' || $2, 0))")
            .bind(user_id.to_string())
            .bind(module_id.to_string())
            .execute(&mut *tx)
            .await?;

        let in_progress = query_scalar::<_, AttemptId>(
            "SELECT id FROM attempts WHERE user_id = $1 AND module_id = $2 AND submitted_at IS NULL",
        )
        .bind(user_id)
        .bind(module_id)
        .fetch_optional(&mut *tx)
        .await?;

        let last_submitted_at = query_scalar::<_, Option<DateTime<Utc>>>(
            "SELECT max(submitted_at) FROM attempts WHERE user_id = $1 AND module_id = $2",
        )
        .bind(user_id)
        .bind(module_id)
        .fetch_one(&mut *tx)
        .await?;

        admit(&PairState {
            in_progress,
            last_submitted_at,
        })?;

        let attempt = query_as::<_, Attempt>(&format!(
            "INSERT INTO attempts (user_id, module_id, started_at) VALUES ($1, $2, $3) RETURNING {ATTEMPT_COLUMNS}"
        ))
        .bind(user_id)
        .bind(module_id)
        .bind(started_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.code().as_deref() == Some(PG_UNIQUE_VIOLATION) => {
                ExamError::AttemptAlreadyInProgress
            }
            other => other.into(),
        })?;

        tx.commit().await?;
        Ok(attempt)
    }

    async fn attempt(&self, attempt_id: AttemptId) -> ExamResult<Option<Attempt>> {
        let attempt = query_as::<_, Attempt>(&format!(
            "SELECT {ATTEMPT_COLUMNS} FROM attempts WHERE id = $1"
        ))
        .bind(attempt_id)
        .fetch_optional(&self.db)
        .await?;
        Ok(attempt)
    }

    async fn finalize_attempt(
        &self,
        attempt_id: AttemptId,
        submission: &Submission,
    ) -> ExamResult<Option<Attempt>> {
        let mut tx = self.db.begin().await?;

        let updated = query_as::<_, Attempt>(&format!(
            r#"
            UPDATE attempts SET submitted_at = $2, score = $3, passed = $4
            WHERE id = $1 AND submitted_at IS NULL
            RETURNING {ATTEMPT_COLUMNS}
            "#
        ))
        .bind(attempt_id)
        .bind(submission.submitted_at)
        .bind(submission.score)
        .bind(submission.passed)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(attempt) = updated else {
            return Ok(None);
        };

        let (question_ids, option_ids): (Vec<Uuid>, Vec<Uuid>) = submission
            .answers
            .iter()
            .flat_map(|(q, opts)| opts.iter().map(move |o| (*q, *o)))
            .unzip();

        if !question_ids.is_empty() {
            query(
                r#"
                INSERT INTO attempt_answers (attempt_id, question_id, option_id)
                SELECT $1, q, o FROM UNNEST($2::uuid[], $3::uuid[]) AS t(q, o)
                "#,
            )
            .bind(attempt_id)
            .bind(&question_ids)
            .bind(&option_ids)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(Some(attempt))
    }

    async fn attempts(&self, user_id: Uuid, module_id: Uuid) -> ExamResult<Vec<Attempt>> {
        let attempts = query_as::<_, Attempt>(&format!(
            "SELECT {ATTEMPT_COLUMNS} FROM attempts WHERE user_id = $1 AND module_id = $2 ORDER BY id DESC"
        ))
        .bind(user_id)
        .bind(module_id)
        .fetch_all(&self.db)
        .await?;
        Ok(attempts)
    }
}
