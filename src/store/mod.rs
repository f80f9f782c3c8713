//! Storage boundary. Exactly-once effects rest on the unique keys enforced
//! here; a violated key surfaces as `ProgressError::Conflict`.

pub mod memory;
pub mod postgres;

pub use self::memory::MemoryStore;
pub use self::postgres::PgStore;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::error::Result;
use crate::models::{Certificate, UserBadge, UserProgressAggregate, XpLedgerEntry, XpReason};
use crate::streak::StreakSnapshot;

#[async_trait]
pub trait ProgressStore: Send + Sync {
    async fn aggregate(&self, user_id: &str) -> Result<Option<UserProgressAggregate>>;

    /// Appends `entry` and adds its amount to the user's `total_xp` in one
    /// atomic step, creating the aggregate if needed. Returns the new total.
    async fn append_xp(&self, entry: &XpLedgerEntry) -> Result<i64>;

    async fn ledger(&self, user_id: &str) -> Result<Vec<XpLedgerEntry>>;

    /// Number of distinct positive grants of `reason` held by the user.
    async fn count_grants(&self, user_id: &str, reason: XpReason) -> Result<i64>;

    /// Runs [`crate::streak::advance`] under a per-user lock and persists it.
    async fn apply_activity(&self, user_id: &str, day: NaiveDate) -> Result<StreakSnapshot>;

    async fn insert_badge(&self, badge: &UserBadge) -> Result<()>;

    async fn badges(&self, user_id: &str) -> Result<Vec<UserBadge>>;

    /// Stores the certificate and returns how many certificates the student
    /// holds including this one, counted under a per-student lock.
    async fn insert_certificate(&self, certificate: &Certificate) -> Result<i64>;

    async fn certificate(&self, student_id: &str, course_id: &str)
        -> Result<Option<Certificate>>;

    async fn certificates(&self, student_id: &str) -> Result<Vec<Certificate>>;

    /// `(user_id, xp)` pairs, unordered. With a course, XP earned in that
    /// course only; otherwise every aggregate's `total_xp`.
    async fn xp_standings(&self, course_id: Option<&str>) -> Result<Vec<(String, i64)>>;
}
