//! Partial failures after a certificate is stored must not undo it.

mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;

use learnhub_progress::badges::FIRST_COURSE_COMPLETE;
use learnhub_progress::catalog::InMemoryCatalog;
use learnhub_progress::models::{Certificate, UserBadge, UserProgressAggregate, XpLedgerEntry, XpReason};
use learnhub_progress::store::{MemoryStore, ProgressStore};
use learnhub_progress::streak::StreakSnapshot;
use learnhub_progress::{ProgressEngine, ProgressError, Result};

/// Memory store with switchable outages on selected writes.
#[derive(Default)]
struct FlakyStore {
    inner: MemoryStore,
    fail_badges: AtomicBool,
    fail_bonus: AtomicBool,
    fail_badge_bonus: AtomicBool,
}

fn outage() -> ProgressError {
    ProgressError::PersistenceUnavailable("connection reset".into())
}

#[async_trait]
impl ProgressStore for FlakyStore {
    async fn aggregate(&self, user_id: &str) -> Result<Option<UserProgressAggregate>> {
        self.inner.aggregate(user_id).await
    }

    async fn append_xp(&self, entry: &XpLedgerEntry) -> Result<i64> {
        if entry.reason == XpReason::CourseCompleteBonus && self.fail_bonus.load(Ordering::SeqCst) {
            return Err(outage());
        }
        if entry.reason == XpReason::BadgeBonus && self.fail_badge_bonus.load(Ordering::SeqCst) {
            return Err(outage());
        }
        self.inner.append_xp(entry).await
    }

    async fn ledger(&self, user_id: &str) -> Result<Vec<XpLedgerEntry>> {
        self.inner.ledger(user_id).await
    }

    async fn count_grants(&self, user_id: &str, reason: XpReason) -> Result<i64> {
        self.inner.count_grants(user_id, reason).await
    }

    async fn apply_activity(&self, user_id: &str, day: NaiveDate) -> Result<StreakSnapshot> {
        self.inner.apply_activity(user_id, day).await
    }

    async fn insert_badge(&self, badge: &UserBadge) -> Result<()> {
        if self.fail_badges.load(Ordering::SeqCst) {
            return Err(outage());
        }
        self.inner.insert_badge(badge).await
    }

    async fn badges(&self, user_id: &str) -> Result<Vec<UserBadge>> {
        self.inner.badges(user_id).await
    }

    async fn insert_certificate(&self, certificate: &Certificate) -> Result<i64> {
        self.inner.insert_certificate(certificate).await
    }

    async fn certificate(&self, student_id: &str, course_id: &str) -> Result<Option<Certificate>> {
        self.inner.certificate(student_id, course_id).await
    }

    async fn certificates(&self, student_id: &str) -> Result<Vec<Certificate>> {
        self.inner.certificates(student_id).await
    }

    async fn xp_standings(&self, course_id: Option<&str>) -> Result<Vec<(String, i64)>> {
        self.inner.xp_standings(course_id).await
    }
}

fn setup() -> (ProgressEngine, Arc<FlakyStore>) {
    let store = Arc::new(FlakyStore::default());
    let catalog = Arc::new(InMemoryCatalog::new());
    catalog
        .add_course(common::RUST_101, &[("l1", false), ("l2", true)])
        .unwrap();
    catalog.enroll("s1", common::RUST_101).unwrap();
    catalog.complete_lesson("s1", "l1").unwrap();
    catalog.complete_lesson("s1", "l2").unwrap();
    catalog.pass_quiz("s1", "l2").unwrap();
    (ProgressEngine::new(store.clone(), catalog), store)
}

#[tokio::test]
async fn badge_outage_keeps_certificate_and_reports_followup() {
    let (engine, store) = setup();
    store.fail_badges.store(true, Ordering::SeqCst);

    let outcome = engine.generate("s1", common::RUST_101).await.unwrap();
    assert!(!outcome.already_existed);
    assert_eq!(outcome.xp_awarded, 50);
    assert!(outcome.badges_awarded.is_empty());
    assert_eq!(outcome.followup_errors.len(), 1);
    assert!(outcome.followup_errors[0].starts_with("reevaluate"));
    assert!(store.certificate("s1", common::RUST_101).await.unwrap().is_some());

    // caller re-triggers badge evaluation once storage recovers
    store.fail_badges.store(false, Ordering::SeqCst);
    let unlocked = engine.reevaluate("s1").await.unwrap();
    assert_eq!(unlocked[0].badge_key, FIRST_COURSE_COMPLETE);
    assert_eq!(engine.aggregate("s1").await.unwrap().total_xp, 75);
}

#[tokio::test]
async fn lost_completion_bonus_is_restored_on_next_generate() {
    let (engine, store) = setup();
    store.fail_bonus.store(true, Ordering::SeqCst);

    let first = engine.generate("s1", common::RUST_101).await.unwrap();
    assert_eq!(first.xp_awarded, 0);
    assert!(first.followup_errors.iter().any(|e| e.starts_with("completion_bonus")));
    // badge evaluation still ran
    assert_eq!(first.badges_awarded.len(), 1);

    store.fail_bonus.store(false, Ordering::SeqCst);
    let second = engine.generate("s1", common::RUST_101).await.unwrap();
    assert!(second.already_existed);
    assert_eq!(second.certificate, first.certificate);
    assert_eq!(second.xp_awarded, 50);

    let third = engine.generate("s1", common::RUST_101).await.unwrap();
    assert_eq!(third.xp_awarded, 0);
    assert_eq!(engine.aggregate("s1").await.unwrap().total_xp, 75);
    assert!(engine.reconcile("s1").await.unwrap().consistent);
}

#[tokio::test]
async fn lost_badge_bonus_is_restored_on_next_reevaluate() {
    let (engine, store) = setup();
    store.fail_badge_bonus.store(true, Ordering::SeqCst);

    let outcome = engine.generate("s1", common::RUST_101).await.unwrap();
    assert!(outcome.followup_errors[0].starts_with("reevaluate"));
    assert_eq!(store.badges("s1").await.unwrap().len(), 1);
    assert_eq!(engine.aggregate("s1").await.unwrap().total_xp, 50);

    store.fail_badge_bonus.store(false, Ordering::SeqCst);
    assert!(engine.reevaluate("s1").await.unwrap().is_empty());
    assert!(engine.reevaluate("s1").await.unwrap().is_empty());
    assert_eq!(engine.aggregate("s1").await.unwrap().total_xp, 75);
}

#[tokio::test]
async fn storage_outage_surfaces_as_retryable() {
    let (engine, store) = setup();
    store.fail_badges.store(true, Ordering::SeqCst);

    // nothing to unlock yet, so the failing write is never reached
    assert!(engine.reevaluate("s1").await.unwrap().is_empty());

    engine.generate("s1", common::RUST_101).await.unwrap();
    let err = engine.reevaluate("s1").await.unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(err.error_code(), "PERSISTENCE_UNAVAILABLE");
}
