//! Read/write-back interface to the course & enrollment service.

pub mod memory;
pub mod postgres;

pub use self::memory::InMemoryCatalog;
pub use self::postgres::PgCatalog;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::EnrollmentProgress;

/// A student's standing in one course, as counted by the course service.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CourseSnapshot {
    pub total_lessons: i64,
    pub completed_lessons: i64,
    /// Lessons that carry a quiz.
    pub quiz_lessons: i64,
    /// Quiz-bearing lessons with at least one passing attempt.
    pub passed_quiz_lessons: i64,
}

impl CourseSnapshot {
    pub fn missing_lessons(&self) -> i64 {
        (self.total_lessons - self.completed_lessons).max(0)
    }

    pub fn missing_quizzes(&self) -> i64 {
        (self.quiz_lessons - self.passed_quiz_lessons).max(0)
    }

    pub fn is_complete(&self) -> bool {
        self.total_lessons > 0 && self.missing_lessons() == 0 && self.missing_quizzes() == 0
    }

    pub fn progress_percent(&self) -> i32 {
        if self.total_lessons == 0 {
            return 0;
        }
        ((self.completed_lessons.min(self.total_lessons) * 100) / self.total_lessons) as i32
    }
}

#[async_trait]
pub trait CourseCatalog: Send + Sync {
    /// `None` when the course is unknown or has no lessons.
    async fn course_snapshot(&self, student_id: &str, course_id: &str)
        -> Result<Option<CourseSnapshot>>;

    async fn enrollment(&self, student_id: &str, course_id: &str)
        -> Result<Option<EnrollmentProgress>>;

    /// Write-back: enrollment status becomes `Completed`.
    async fn mark_completed(
        &self,
        student_id: &str,
        course_id: &str,
        at: DateTime<Utc>,
    ) -> Result<()>;

    async fn reviews_written(&self, user_id: &str) -> Result<i64>;
}
