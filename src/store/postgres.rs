use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use super::ProgressStore;
use crate::db::Db;
use crate::error::{ProgressError, Result};
use crate::models::{Certificate, UserBadge, UserProgressAggregate, XpLedgerEntry, XpReason};
use crate::streak::{self, StreakSnapshot};

#[derive(Clone)]
pub struct PgStore {
    pool: Db,
}

impl PgStore {
    pub fn new(pool: Db) -> Self {
        Self { pool }
    }
}

type LedgerRow = (Uuid, String, i64, String, String, Option<String>, DateTime<Utc>);

fn ledger_entry(row: LedgerRow) -> Result<XpLedgerEntry> {
    let (id, user_id, amount, reason, reference_id, course_id, created_at) = row;
    Ok(XpLedgerEntry {
        id,
        user_id,
        amount,
        reason: reason.parse()?,
        reference_id,
        course_id,
        created_at,
    })
}

const ENSURE_AGGREGATE: &str =
    "INSERT INTO user_progress (user_id) VALUES ($1) ON CONFLICT (user_id) DO NOTHING";

#[async_trait]
impl ProgressStore for PgStore {
    async fn aggregate(&self, user_id: &str) -> Result<Option<UserProgressAggregate>> {
        let agg = sqlx::query_as::<_, UserProgressAggregate>(
            r#"
            SELECT user_id, total_xp, current_streak, longest_streak, last_activity_date
            FROM user_progress WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(agg)
    }

    async fn append_xp(&self, entry: &XpLedgerEntry) -> Result<i64> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO xp_ledger (id, user_id, amount, reason, reference_id, course_id, created_at)
            VALUES ($1,$2,$3,$4,$5,$6,$7)
            ON CONFLICT (user_id, reason, reference_id) WHERE amount > 0 DO NOTHING
            "#,
        )
        .bind(entry.id)
        .bind(&entry.user_id)
        .bind(entry.amount)
        .bind(entry.reason.as_str())
        .bind(&entry.reference_id)
        .bind(&entry.course_id)
        .bind(entry.created_at)
        .execute(&mut *tx)
        .await?;
        if inserted.rows_affected() == 0 {
            return Err(ProgressError::Conflict {
                constraint: "xp_ledger_grant_key",
            });
        }

        sqlx::query(ENSURE_AGGREGATE)
            .bind(&entry.user_id)
            .execute(&mut *tx)
            .await?;
        let total: i64 = sqlx::query_scalar(
            r#"
            UPDATE user_progress SET total_xp = total_xp + $2, updated_at = now()
            WHERE user_id = $1
            RETURNING total_xp
            "#,
        )
        .bind(&entry.user_id)
        .bind(entry.amount)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(total)
    }

    async fn ledger(&self, user_id: &str) -> Result<Vec<XpLedgerEntry>> {
        let rows = sqlx::query_as::<_, LedgerRow>(
            r#"
            SELECT id, user_id, amount, reason, reference_id, course_id, created_at
            FROM xp_ledger WHERE user_id = $1
            ORDER BY created_at, id
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(ledger_entry).collect()
    }

    async fn count_grants(&self, user_id: &str, reason: XpReason) -> Result<i64> {
        let n: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM xp_ledger WHERE user_id = $1 AND reason = $2 AND amount > 0",
        )
        .bind(user_id)
        .bind(reason.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(n)
    }

    async fn apply_activity(&self, user_id: &str, day: NaiveDate) -> Result<StreakSnapshot> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(ENSURE_AGGREGATE)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        // row lock serialises concurrent streak updates for this user
        let mut agg = sqlx::query_as::<_, UserProgressAggregate>(
            r#"
            SELECT user_id, total_xp, current_streak, longest_streak, last_activity_date
            FROM user_progress WHERE user_id = $1
            FOR UPDATE
            "#,
        )
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await?;

        let snapshot = streak::advance(&mut agg, day);

        sqlx::query(
            r#"
            UPDATE user_progress
            SET current_streak = $2, longest_streak = $3, last_activity_date = $4, updated_at = now()
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .bind(agg.current_streak)
        .bind(agg.longest_streak)
        .bind(agg.last_activity_date)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(snapshot)
    }

    async fn insert_badge(&self, badge: &UserBadge) -> Result<()> {
        let inserted = sqlx::query(
            r#"
            INSERT INTO user_badges (user_id, badge_key, earned_at) VALUES ($1,$2,$3)
            ON CONFLICT (user_id, badge_key) DO NOTHING
            "#,
        )
        .bind(&badge.user_id)
        .bind(&badge.badge_key)
        .bind(badge.earned_at)
        .execute(&self.pool)
        .await?;
        if inserted.rows_affected() == 0 {
            return Err(ProgressError::Conflict {
                constraint: "user_badges_pkey",
            });
        }
        Ok(())
    }

    async fn badges(&self, user_id: &str) -> Result<Vec<UserBadge>> {
        let rows = sqlx::query_as::<_, UserBadge>(
            "SELECT user_id, badge_key, earned_at FROM user_badges WHERE user_id = $1 ORDER BY earned_at, badge_key",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn insert_certificate(&self, certificate: &Certificate) -> Result<i64> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(ENSURE_AGGREGATE)
            .bind(&certificate.student_id)
            .execute(&mut *tx)
            .await?;
        // serialises issuance per student so the count below is exact
        sqlx::query("SELECT 1 FROM user_progress WHERE user_id = $1 FOR UPDATE")
            .bind(&certificate.student_id)
            .execute(&mut *tx)
            .await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO certificates (certificate_id, student_id, course_id, issued_at)
            VALUES ($1,$2,$3,$4)
            ON CONFLICT (student_id, course_id) DO NOTHING
            "#,
        )
        .bind(&certificate.certificate_id)
        .bind(&certificate.student_id)
        .bind(&certificate.course_id)
        .bind(certificate.issued_at)
        .execute(&mut *tx)
        .await?;
        if inserted.rows_affected() == 0 {
            return Err(ProgressError::Conflict {
                constraint: "certificates_student_id_course_id_key",
            });
        }

        let held: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM certificates WHERE student_id = $1")
            .bind(&certificate.student_id)
            .fetch_one(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(held)
    }

    async fn certificate(
        &self,
        student_id: &str,
        course_id: &str,
    ) -> Result<Option<Certificate>> {
        let cert = sqlx::query_as::<_, Certificate>(
            r#"
            SELECT certificate_id, student_id, course_id, issued_at
            FROM certificates WHERE student_id = $1 AND course_id = $2
            "#,
        )
        .bind(student_id)
        .bind(course_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(cert)
    }

    async fn certificates(&self, student_id: &str) -> Result<Vec<Certificate>> {
        let rows = sqlx::query_as::<_, Certificate>(
            r#"
            SELECT certificate_id, student_id, course_id, issued_at
            FROM certificates WHERE student_id = $1
            ORDER BY issued_at, course_id
            "#,
        )
        .bind(student_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn xp_standings(&self, course_id: Option<&str>) -> Result<Vec<(String, i64)>> {
        let rows = match course_id {
            None => {
                sqlx::query_as::<_, (String, i64)>("SELECT user_id, total_xp FROM user_progress")
                    .fetch_all(&self.pool)
                    .await?
            }
            Some(course_id) => {
                sqlx::query_as::<_, (String, i64)>(
                    r#"
                    SELECT user_id, SUM(amount)::BIGINT
                    FROM xp_ledger WHERE course_id = $1
                    GROUP BY user_id
                    "#,
                )
                .bind(course_id)
                .fetch_all(&self.pool)
                .await?
            }
        };
        Ok(rows)
    }
}
