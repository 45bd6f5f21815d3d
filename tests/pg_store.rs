//! Runs the engine against `PgStore`. Needs a disposable Postgres in
//! `DATABASE_URL`; without it every test returns early.

use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use mooc_exam_engine::{
    cooldown::CooldownPolicy,
    models::{Answers, AttemptStatus},
    scoring::PassingPolicy,
    store::{Datastore, PgStore},
    ExamEngine, ExamError,
};

async fn pool() -> Option<PgPool> {
    let Ok(url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL not set, skipping postgres test");
        return None;
    };
    let pool = PgPool::connect(&url).await.expect("connect to DATABASE_URL");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("run migrations");
    Some(pool)
}

struct Seeded {
    module_id: Uuid,
    lessons: Vec<Uuid>,
    /// (question id, correct option id, wrong option id)
    questions: Vec<(Uuid, Uuid, Uuid)>,
}

/// Module with `lessons` lessons and two single-choice questions, threshold 50.
async fn seed(pool: &PgPool, lessons: usize) -> Seeded {
    let module_id = Uuid::new_v4();
    sqlx::query("INSERT INTO modules (id, title, passing_threshold) VALUES ($1, $2, $3)")
        .bind(module_id)
        .bind("Borrowing")
        .bind(50.0_f64)
        .execute(pool)
        .await
        .unwrap();

    let mut lesson_ids = Vec::new();
    for position in 0..lessons as i32 {
        let id = Uuid::new_v4();
        sqlx::query("INSERT INTO lessons (id, module_id, position, title) VALUES ($1, $2, $3, $4)")
            .bind(id)
            .bind(module_id)
            .bind(position)
            .bind(format!("Lesson {position}"))
            .execute(pool)
            .await
            .unwrap();
        lesson_ids.push(id);
    }

    let mut questions = Vec::new();
    for position in 0..2_i32 {
        let (q, right, wrong) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        sqlx::query("INSERT INTO questions (id, module_id, position, kind, prompt) VALUES ($1, $2, $3, 'single_choice', $4)")
            .bind(q)
            .bind(module_id)
            .bind(position)
            .bind(format!("Question {position}"))
            .execute(pool)
            .await
            .unwrap();
        for (pos, (id, correct)) in [(right, true), (wrong, false)].into_iter().enumerate() {
            sqlx::query("INSERT INTO question_options (id, question_id, position, body, is_correct) VALUES ($1, $2, $3, $4, $5)")
                .bind(id)
                .bind(q)
                .bind(pos as i32)
                .bind(if correct { "right" } else { "wrong" })
                .bind(correct)
                .execute(pool)
                .await
                .unwrap();
        }
        questions.push((q, right, wrong));
    }

    Seeded {
        module_id,
        lessons: lesson_ids,
        questions,
    }
}

fn engine(pool: PgPool) -> ExamEngine {
    ExamEngine::new(
        Datastore::new(Arc::new(PgStore::new(pool)), Duration::from_secs(10)),
        CooldownPolicy::new(chrono::Duration::seconds(3600)),
        PassingPolicy::new(60.0),
    )
}

async fn eligible_user(engine: &ExamEngine, seeded: &Seeded) -> Uuid {
    let user = Uuid::new_v4();
    for lesson in &seeded.lessons {
        engine.mark_lesson_complete(user, *lesson).await.unwrap();
    }
    user
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_starts_admit_exactly_one_in_postgres() {
    let Some(pool) = pool().await else { return };
    let seeded = seed(&pool, 2).await;
    let engine = engine(pool);
    let user = eligible_user(&engine, &seeded).await;

    let handles: Vec<_> = (0..12)
        .map(|_| {
            let engine = engine.clone();
            let module_id = seeded.module_id;
            tokio::spawn(async move { engine.start(user, module_id).await })
        })
        .collect();

    let (mut ok, mut in_progress) = (0, 0);
    for h in handles {
        match h.await.unwrap() {
            Ok(_) => ok += 1,
            Err(ExamError::AttemptAlreadyInProgress) => in_progress += 1,
            Err(other) => panic!("unexpected {other:?}"),
        }
    }
    assert_eq!(ok, 1);
    assert_eq!(in_progress, 11);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_submits_freeze_once_in_postgres() {
    let Some(pool) = pool().await else { return };
    let seeded = seed(&pool, 1).await;
    let engine = engine(pool.clone());
    let user = eligible_user(&engine, &seeded).await;
    let attempt_id = engine.start(user, seeded.module_id).await.unwrap().attempt_id;

    let (q0, right0, _) = seeded.questions[0];
    let (q1, _, wrong1) = seeded.questions[1];
    let answers: Answers = [(q0, [right0].into()), (q1, [wrong1].into())].into_iter().collect();

    let handles: Vec<_> = (0..12)
        .map(|_| {
            let engine = engine.clone();
            let answers = answers.clone();
            tokio::spawn(async move { engine.submit(user, attempt_id, answers).await })
        })
        .collect();

    let mut winners = Vec::new();
    let mut losers = 0;
    for h in handles {
        match h.await.unwrap() {
            Ok(result) => winners.push(result),
            Err(ExamError::AttemptAlreadySubmitted(_)) => losers += 1,
            Err(other) => panic!("unexpected {other:?}"),
        }
    }
    assert_eq!(winners.len(), 1);
    assert_eq!(losers, 11);
    assert_eq!(winners[0].score, 50.0);
    assert!(winners[0].passed);

    let stored: i64 = sqlx::query_scalar("SELECT count(*) FROM attempt_answers WHERE attempt_id = $1")
        .bind(attempt_id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(stored, 2);

    let history = engine.history(user, seeded.module_id).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status(), AttemptStatus::Passed);
}

#[tokio::test]
async fn gate_and_cooldown_in_postgres() {
    let Some(pool) = pool().await else { return };
    let seeded = seed(&pool, 3).await;
    let engine = engine(pool);
    let user = Uuid::new_v4();
    for lesson in seeded.lessons.iter().take(2) {
        engine.mark_lesson_complete(user, *lesson).await.unwrap();
    }

    match engine.start(user, seeded.module_id).await {
        Err(ExamError::NotEligible {
            completed_count: 2,
            total_count: 3,
        }) => {}
        other => panic!("unexpected {other:?}"),
    }

    engine.mark_lesson_complete(user, seeded.lessons[2]).await.unwrap();
    let attempt_id = engine.start(user, seeded.module_id).await.unwrap().attempt_id;
    engine.submit(user, attempt_id, Answers::new()).await.unwrap();

    match engine.start(user, seeded.module_id).await {
        Err(ExamError::CooldownActive { remaining_seconds }) => {
            assert!(remaining_seconds > 3500 && remaining_seconds <= 3600)
        }
        other => panic!("unexpected {other:?}"),
    }
}
