//! Shared fixtures: an engine over the in-memory store and catalog.

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use uuid::Uuid;

use learnhub_progress::catalog::InMemoryCatalog;
use learnhub_progress::ingest::IngestResult;
use learnhub_progress::models::{ProgressEvent, ProgressEventKind, XpLedgerEntry, XpReason};
use learnhub_progress::store::{MemoryStore, ProgressStore};
use learnhub_progress::ProgressEngine;

pub const RUST_101: &str = "rust-101";
pub const ASYNC_201: &str = "async-201";
pub const ML_301: &str = "ml-301";

pub struct Harness {
    pub engine: Arc<ProgressEngine>,
    pub store: Arc<MemoryStore>,
    pub catalog: Arc<InMemoryCatalog>,
}

impl Harness {
    /// Courses: `rust-101` (l1, l2 with quiz q2), `async-201` (a1..a3) and
    /// `ml-301` (m1..m8), the last two without quizzes.
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let catalog = Arc::new(InMemoryCatalog::new());
        catalog
            .add_course(RUST_101, &[("l1", false), ("l2", true)])
            .unwrap();
        catalog
            .add_course(ASYNC_201, &[("a1", false), ("a2", false), ("a3", false)])
            .unwrap();
        let ml: Vec<String> = (1..=8).map(|i| format!("m{i}")).collect();
        let ml: Vec<(&str, bool)> = ml.iter().map(|id| (id.as_str(), false)).collect();
        catalog.add_course(ML_301, &ml).unwrap();
        let engine = Arc::new(ProgressEngine::new(store.clone(), catalog.clone()));
        Self {
            engine,
            store,
            catalog,
        }
    }

    /// Records the lesson with the course service, then feeds the event in.
    pub async fn complete_lesson(
        &self,
        user: &str,
        course: &str,
        lesson: &str,
        at: DateTime<Utc>,
    ) -> IngestResult {
        self.catalog.complete_lesson(user, lesson).unwrap();
        self.engine
            .ingest(event(user, ProgressEventKind::LessonCompleted, course, Some(lesson), None, at))
            .await
            .unwrap()
    }

    pub async fn pass_quiz(
        &self,
        user: &str,
        course: &str,
        lesson: &str,
        quiz: &str,
        at: DateTime<Utc>,
    ) -> IngestResult {
        self.catalog.pass_quiz(user, lesson).unwrap();
        self.engine
            .ingest(event(user, ProgressEventKind::QuizPassed, course, Some(lesson), Some(quiz), at))
            .await
            .unwrap()
    }

    /// Gives the user a starting balance by writing a ledger entry straight
    /// to the store. The engine itself only pays table or catalog amounts.
    pub async fn seed_xp(&self, user: &str, amount: i64) {
        let entry = XpLedgerEntry {
            id: Uuid::new_v4(),
            user_id: user.to_string(),
            amount,
            reason: XpReason::LessonComplete,
            reference_id: "seed".into(),
            course_id: None,
            created_at: Utc::now(),
        };
        self.store.append_xp(&entry).await.unwrap();
    }

    /// Marks every lesson and quiz of `rust-101` done without ingesting events.
    pub fn finish_rust_101(&self, user: &str) {
        self.catalog.enroll(user, RUST_101).unwrap();
        self.catalog.complete_lesson(user, "l1").unwrap();
        self.catalog.complete_lesson(user, "l2").unwrap();
        self.catalog.pass_quiz(user, "l2").unwrap();
    }
}

pub fn event(
    user: &str,
    kind: ProgressEventKind,
    course: &str,
    lesson: Option<&str>,
    quiz: Option<&str>,
    at: DateTime<Utc>,
) -> ProgressEvent {
    ProgressEvent {
        user_id: user.to_string(),
        kind,
        course_id: course.to_string(),
        lesson_id: lesson.map(str::to_string),
        quiz_id: quiz.map(str::to_string),
        occurred_at: at,
    }
}

/// Noon UTC on the given day of March 2026.
pub fn day(d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, d, 12, 0, 0).unwrap()
}

pub fn date(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 3, d).unwrap()
}
