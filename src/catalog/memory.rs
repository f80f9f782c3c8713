use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{CourseCatalog, CourseSnapshot};
use crate::error::{ProgressError, Result};
use crate::models::{EnrollmentProgress, EnrollmentStatus};

#[derive(Debug, Clone)]
struct Lesson {
    id: String,
    has_quiz: bool,
}

#[derive(Default)]
struct State {
    courses: HashMap<String, Vec<Lesson>>,
    completed: HashSet<(String, String)>,
    passed_quizzes: HashSet<(String, String)>,
    enrollments: HashMap<(String, String), EnrollmentProgress>,
    reviews: HashMap<String, i64>,
}

/// Course service stand-in for tests and embedded hosts.
#[derive(Default)]
pub struct InMemoryCatalog {
    state: Mutex<State>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| ProgressError::PersistenceUnavailable("catalog poisoned".into()))
    }

    /// Registers a course as `(lesson_id, has_quiz)` pairs.
    pub fn add_course(&self, course_id: &str, lessons: &[(&str, bool)]) -> Result<()> {
        let lessons = lessons
            .iter()
            .map(|(id, has_quiz)| Lesson {
                id: id.to_string(),
                has_quiz: *has_quiz,
            })
            .collect();
        self.lock()?.courses.insert(course_id.to_string(), lessons);
        Ok(())
    }

    pub fn enroll(&self, student_id: &str, course_id: &str) -> Result<()> {
        self.lock()?.enrollments.insert(
            (student_id.to_string(), course_id.to_string()),
            EnrollmentProgress {
                student_id: student_id.to_string(),
                course_id: course_id.to_string(),
                status: EnrollmentStatus::Active,
                progress_percent: 0,
                completed_at: None,
            },
        );
        Ok(())
    }

    pub fn unenroll(&self, student_id: &str, course_id: &str) -> Result<()> {
        let mut state = self.lock()?;
        let enrollment = state
            .enrollments
            .get_mut(&(student_id.to_string(), course_id.to_string()))
            .ok_or_else(|| ProgressError::NotFound {
                entity: "enrollment",
                id: format!("{student_id}/{course_id}"),
            })?;
        enrollment.status = EnrollmentStatus::Unenrolled;
        Ok(())
    }

    pub fn complete_lesson(&self, student_id: &str, lesson_id: &str) -> Result<()> {
        self.lock()?
            .completed
            .insert((student_id.to_string(), lesson_id.to_string()));
        Ok(())
    }

    pub fn pass_quiz(&self, student_id: &str, lesson_id: &str) -> Result<()> {
        self.lock()?
            .passed_quizzes
            .insert((student_id.to_string(), lesson_id.to_string()));
        Ok(())
    }

    pub fn add_review(&self, user_id: &str) -> Result<()> {
        *self.lock()?.reviews.entry(user_id.to_string()).or_default() += 1;
        Ok(())
    }
}

#[async_trait]
impl CourseCatalog for InMemoryCatalog {
    async fn course_snapshot(
        &self,
        student_id: &str,
        course_id: &str,
    ) -> Result<Option<CourseSnapshot>> {
        let state = self.lock()?;
        let Some(lessons) = state.courses.get(course_id).filter(|l| !l.is_empty()) else {
            return Ok(None);
        };
        let mut snap = CourseSnapshot::default();
        for lesson in lessons {
            let key = (student_id.to_string(), lesson.id.clone());
            snap.total_lessons += 1;
            if state.completed.contains(&key) {
                snap.completed_lessons += 1;
            }
            if lesson.has_quiz {
                snap.quiz_lessons += 1;
                if state.passed_quizzes.contains(&key) {
                    snap.passed_quiz_lessons += 1;
                }
            }
        }
        Ok(Some(snap))
    }

    async fn enrollment(
        &self,
        student_id: &str,
        course_id: &str,
    ) -> Result<Option<EnrollmentProgress>> {
        Ok(self
            .lock()?
            .enrollments
            .get(&(student_id.to_string(), course_id.to_string()))
            .cloned())
    }

    async fn mark_completed(
        &self,
        student_id: &str,
        course_id: &str,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let mut state = self.lock()?;
        let enrollment = state
            .enrollments
            .get_mut(&(student_id.to_string(), course_id.to_string()))
            .ok_or_else(|| ProgressError::NotFound {
                entity: "enrollment",
                id: format!("{student_id}/{course_id}"),
            })?;
        if enrollment.status == EnrollmentStatus::Unenrolled {
            return Err(ProgressError::validation(
                "enrollment",
                format!("{student_id} is unenrolled from {course_id}"),
            ));
        }
        enrollment.status = EnrollmentStatus::Completed;
        enrollment.progress_percent = 100;
        enrollment.completed_at.get_or_insert(at);
        Ok(())
    }

    async fn reviews_written(&self, user_id: &str) -> Result<i64> {
        Ok(self.lock()?.reviews.get(user_id).copied().unwrap_or_default())
    }
}
