use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::NaiveDate;

use super::ProgressStore;
use crate::error::{ProgressError, Result};
use crate::models::{Certificate, UserBadge, UserProgressAggregate, XpLedgerEntry, XpReason};
use crate::streak::{self, StreakSnapshot};

#[derive(Default)]
struct State {
    aggregates: HashMap<String, UserProgressAggregate>,
    ledger: Vec<XpLedgerEntry>,
    // (user_id, reason, reference_id) of positive entries
    grant_keys: HashSet<(String, XpReason, String)>,
    badges: HashMap<(String, String), UserBadge>,
    certificates: HashMap<(String, String), Certificate>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| ProgressError::PersistenceUnavailable("memory store poisoned".into()))
    }
}

#[async_trait]
impl ProgressStore for MemoryStore {
    async fn aggregate(&self, user_id: &str) -> Result<Option<UserProgressAggregate>> {
        Ok(self.lock()?.aggregates.get(user_id).cloned())
    }

    async fn append_xp(&self, entry: &XpLedgerEntry) -> Result<i64> {
        let mut state = self.lock()?;
        if entry.amount > 0 {
            let key = (
                entry.user_id.clone(),
                entry.reason,
                entry.reference_id.clone(),
            );
            if !state.grant_keys.insert(key) {
                return Err(ProgressError::Conflict {
                    constraint: "xp_ledger_grant_key",
                });
            }
        }
        state.ledger.push(entry.clone());
        let agg = state
            .aggregates
            .entry(entry.user_id.clone())
            .or_insert_with(|| UserProgressAggregate::zeroed(&entry.user_id));
        agg.total_xp += entry.amount;
        Ok(agg.total_xp)
    }

    async fn ledger(&self, user_id: &str) -> Result<Vec<XpLedgerEntry>> {
        Ok(self
            .lock()?
            .ledger
            .iter()
            .filter(|e| e.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn count_grants(&self, user_id: &str, reason: XpReason) -> Result<i64> {
        let n = self
            .lock()?
            .grant_keys
            .iter()
            .filter(|(u, r, _)| u == user_id && *r == reason)
            .count();
        Ok(n as i64)
    }

    async fn apply_activity(&self, user_id: &str, day: NaiveDate) -> Result<StreakSnapshot> {
        let mut state = self.lock()?;
        let agg = state
            .aggregates
            .entry(user_id.to_string())
            .or_insert_with(|| UserProgressAggregate::zeroed(user_id));
        Ok(streak::advance(agg, day))
    }

    async fn insert_badge(&self, badge: &UserBadge) -> Result<()> {
        let mut state = self.lock()?;
        let key = (badge.user_id.clone(), badge.badge_key.clone());
        if state.badges.contains_key(&key) {
            return Err(ProgressError::Conflict {
                constraint: "user_badges_user_badge_key",
            });
        }
        state.badges.insert(key, badge.clone());
        Ok(())
    }

    async fn badges(&self, user_id: &str) -> Result<Vec<UserBadge>> {
        let mut out: Vec<UserBadge> = self
            .lock()?
            .badges
            .values()
            .filter(|b| b.user_id == user_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.earned_at.cmp(&b.earned_at).then(a.badge_key.cmp(&b.badge_key)));
        Ok(out)
    }

    async fn insert_certificate(&self, certificate: &Certificate) -> Result<i64> {
        let mut state = self.lock()?;
        let key = (
            certificate.student_id.clone(),
            certificate.course_id.clone(),
        );
        if state.certificates.contains_key(&key) {
            return Err(ProgressError::Conflict {
                constraint: "certificates_student_course",
            });
        }
        state.certificates.insert(key, certificate.clone());
        let held = state
            .certificates
            .values()
            .filter(|c| c.student_id == certificate.student_id)
            .count();
        Ok(held as i64)
    }

    async fn certificate(
        &self,
        student_id: &str,
        course_id: &str,
    ) -> Result<Option<Certificate>> {
        Ok(self
            .lock()?
            .certificates
            .get(&(student_id.to_string(), course_id.to_string()))
            .cloned())
    }

    async fn certificates(&self, student_id: &str) -> Result<Vec<Certificate>> {
        let mut out: Vec<Certificate> = self
            .lock()?
            .certificates
            .values()
            .filter(|c| c.student_id == student_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.issued_at.cmp(&b.issued_at).then(a.course_id.cmp(&b.course_id)));
        Ok(out)
    }

    async fn xp_standings(&self, course_id: Option<&str>) -> Result<Vec<(String, i64)>> {
        let state = self.lock()?;
        let Some(course_id) = course_id else {
            return Ok(state
                .aggregates
                .values()
                .map(|a| (a.user_id.clone(), a.total_xp))
                .collect());
        };
        let mut per_user: HashMap<&str, i64> = HashMap::new();
        for e in state
            .ledger
            .iter()
            .filter(|e| e.course_id.as_deref() == Some(course_id))
        {
            *per_user.entry(e.user_id.as_str()).or_default() += e.amount;
        }
        Ok(per_user
            .into_iter()
            .map(|(u, xp)| (u.to_string(), xp))
            .collect())
    }
}
