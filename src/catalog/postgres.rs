use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{CourseCatalog, CourseSnapshot};
use crate::db::Db;
use crate::error::{ProgressError, Result};
use crate::models::{EnrollmentProgress, EnrollmentStatus};

#[derive(Clone)]
pub struct PgCatalog {
    pool: Db,
}

impl PgCatalog {
    pub fn new(pool: Db) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CourseCatalog for PgCatalog {
    async fn course_snapshot(
        &self,
        student_id: &str,
        course_id: &str,
    ) -> Result<Option<CourseSnapshot>> {
        let (total_lessons, completed_lessons, quiz_lessons, passed_quiz_lessons) =
            sqlx::query_as::<_, (i64, i64, i64, i64)>(
                r#"
                SELECT
                    COUNT(*)::BIGINT,
                    COUNT(*) FILTER (WHERE lp.completed IS TRUE)::BIGINT,
                    COUNT(*) FILTER (WHERE l.has_quiz)::BIGINT,
                    COUNT(*) FILTER (
                        WHERE l.has_quiz AND EXISTS (
                            SELECT 1 FROM quiz_attempts qa
                            WHERE qa.student_id = $1 AND qa.lesson_id = l.id AND qa.passed
                        )
                    )::BIGINT
                FROM lessons l
                LEFT JOIN lesson_progress lp ON lp.lesson_id = l.id AND lp.student_id = $1
                WHERE l.course_id = $2
                "#,
            )
            .bind(student_id)
            .bind(course_id)
            .fetch_one(&self.pool)
            .await?;

        if total_lessons == 0 {
            return Ok(None);
        }
        Ok(Some(CourseSnapshot {
            total_lessons,
            completed_lessons,
            quiz_lessons,
            passed_quiz_lessons,
        }))
    }

    async fn enrollment(
        &self,
        student_id: &str,
        course_id: &str,
    ) -> Result<Option<EnrollmentProgress>> {
        let row = sqlx::query_as::<_, (String, String, String, i32, Option<DateTime<Utc>>)>(
            r#"
            SELECT student_id, course_id, status, progress_percent, completed_at
            FROM enrollments WHERE student_id = $1 AND course_id = $2
            "#,
        )
        .bind(student_id)
        .bind(course_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|(student_id, course_id, status, progress_percent, completed_at)| {
            let status = EnrollmentStatus::parse(&status).ok_or_else(|| {
                ProgressError::validation("status", format!("unknown enrollment status '{status}'"))
            })?;
            Ok(EnrollmentProgress {
                student_id,
                course_id,
                status,
                progress_percent,
                completed_at,
            })
        })
        .transpose()
    }

    async fn mark_completed(
        &self,
        student_id: &str,
        course_id: &str,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let res = sqlx::query(
            r#"
            UPDATE enrollments
            SET status = 'completed', progress_percent = 100,
                completed_at = COALESCE(completed_at, $3)
            WHERE student_id = $1 AND course_id = $2 AND status <> 'unenrolled'
            "#,
        )
        .bind(student_id)
        .bind(course_id)
        .bind(at)
        .execute(&self.pool)
        .await?;
        if res.rows_affected() > 0 {
            return Ok(());
        }
        match self.enrollment(student_id, course_id).await? {
            Some(_) => Err(ProgressError::validation(
                "enrollment",
                format!("{student_id} is unenrolled from {course_id}"),
            )),
            None => Err(ProgressError::NotFound {
                entity: "enrollment",
                id: format!("{student_id}/{course_id}"),
            }),
        }
    }

    async fn reviews_written(&self, user_id: &str) -> Result<i64> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM reviews WHERE author_id = $1")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }
}
