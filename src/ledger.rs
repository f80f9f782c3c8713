use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::ProgressEngine;
use crate::error::{ProgressError, Result};
use crate::models::{XpLedgerEntry, XpReason};

pub const LESSON_COMPLETE_XP: i64 = 10;
pub const QUIZ_PASS_XP: i64 = 15;
pub const COURSE_COMPLETE_BONUS_XP: i64 = 50;

/// XP per level unit; level `n` starts at `XP_PER_LEVEL_UNIT * n²`.
const XP_PER_LEVEL_UNIT: i64 = 100;

/// Amount a reason always pays, when the reason has a fixed price.
pub fn fixed_reward(reason: XpReason) -> Option<i64> {
    match reason {
        XpReason::LessonComplete => Some(LESSON_COMPLETE_XP),
        XpReason::QuizPass => Some(QUIZ_PASS_XP),
        XpReason::CourseCompleteBonus => Some(COURSE_COMPLETE_BONUS_XP),
        XpReason::BadgeBonus | XpReason::Correction => None,
    }
}

/// `floor(sqrt(total_xp / 100))`. Negative totals sit at level 0.
pub fn level_for(total_xp: i64) -> u32 {
    let units = (total_xp.max(0) / XP_PER_LEVEL_UNIT) as u64;
    let mut level = (units as f64).sqrt() as u64;
    // float sqrt can be off by one near perfect squares
    while (level + 1) * (level + 1) <= units {
        level += 1;
    }
    while level * level > units {
        level -= 1;
    }
    level as u32
}

/// Total XP at which `level` is reached.
pub fn xp_for_level(level: u32) -> i64 {
    XP_PER_LEVEL_UNIT * i64::from(level) * i64::from(level)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XpGrant {
    pub user_id: String,
    pub reason: XpReason,
    pub reference_id: String,
    pub amount: i64,
    /// Course the XP was earned in, for per-course standings.
    pub course_id: Option<String>,
}

impl XpGrant {
    /// A grant priced from the reward table.
    pub fn fixed(user_id: &str, reason: XpReason, reference_id: &str, course_id: Option<&str>) -> Self {
        Self {
            user_id: user_id.to_string(),
            reason,
            reference_id: reference_id.to_string(),
            amount: fixed_reward(reason).unwrap_or_default(),
            course_id: course_id.map(str::to_string),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.user_id.trim().is_empty() {
            return Err(ProgressError::validation("user_id", "must not be empty"));
        }
        if self.reference_id.trim().is_empty() {
            return Err(ProgressError::validation("reference_id", "must not be empty"));
        }
        match (self.reason, fixed_reward(self.reason)) {
            (_, Some(price)) if self.amount != price => Err(ProgressError::validation(
                "amount",
                format!("{} always pays {price} XP, got {}", self.reason, self.amount),
            )),
            (XpReason::BadgeBonus, _) if self.amount <= 0 => Err(ProgressError::validation(
                "amount",
                "badge bonus must be positive",
            )),
            (XpReason::Correction, _) if self.amount >= 0 => Err(ProgressError::validation(
                "amount",
                "corrections must be negative",
            )),
            _ => Ok(()),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct GrantOutcome {
    pub granted: bool,
    pub new_total: i64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    pub user_id: String,
    pub ledger_sum: i64,
    pub total_xp: i64,
    pub consistent: bool,
}

impl ProgressEngine {
    /// Grants XP once per `(user, reason, reference)`.
    ///
    /// A repeat grant, including the loser of a concurrent race, returns
    /// `granted = false` with the current total instead of an error.
    pub async fn grant(
        &self,
        user_id: &str,
        reason: XpReason,
        reference_id: &str,
        amount: i64,
    ) -> Result<GrantOutcome> {
        self.grant_xp(XpGrant {
            user_id: user_id.to_string(),
            reason,
            reference_id: reference_id.to_string(),
            amount,
            course_id: None,
        })
        .await
    }

    #[tracing::instrument(skip(self, grant), fields(user_id = %grant.user_id, reason = %grant.reason, reference_id = %grant.reference_id))]
    pub async fn grant_xp(&self, grant: XpGrant) -> Result<GrantOutcome> {
        grant.validate()?;
        if grant.reason == XpReason::BadgeBonus {
            self.check_badge_bonus(&grant)?;
        }

        let entry = XpLedgerEntry {
            id: Uuid::new_v4(),
            user_id: grant.user_id,
            amount: grant.amount,
            reason: grant.reason,
            reference_id: grant.reference_id,
            course_id: grant.course_id,
            created_at: Utc::now(),
        };

        match self.store.append_xp(&entry).await {
            Ok(new_total) => {
                tracing::info!(amount = entry.amount, new_total, "xp granted");
                Ok(GrantOutcome {
                    granted: true,
                    new_total,
                })
            }
            Err(ProgressError::Conflict { .. }) => {
                let new_total = self
                    .store
                    .aggregate(&entry.user_id)
                    .await?
                    .map(|a| a.total_xp)
                    .unwrap_or_default();
                tracing::debug!(new_total, "xp already granted for this key");
                Ok(GrantOutcome {
                    granted: false,
                    new_total,
                })
            }
            Err(e) => Err(e),
        }
    }

    /// A badge bonus pays exactly the catalog's `xp_reward` for that badge key.
    fn check_badge_bonus(&self, grant: &XpGrant) -> Result<()> {
        let def = self
            .badges
            .iter()
            .find(|d| d.key == grant.reference_id)
            .ok_or_else(|| {
                ProgressError::validation(
                    "reference_id",
                    format!("unknown badge '{}'", grant.reference_id),
                )
            })?;
        if grant.amount != def.xp_reward {
            return Err(ProgressError::validation(
                "amount",
                format!("badge {} pays {} XP, got {}", def.key, def.xp_reward, grant.amount),
            ));
        }
        Ok(())
    }

    /// Recomputes the ledger sum and compares it with the stored total.
    pub async fn reconcile(&self, user_id: &str) -> Result<Reconciliation> {
        let ledger_sum: i64 = self.store.ledger(user_id).await?.iter().map(|e| e.amount).sum();
        let total_xp = self
            .store
            .aggregate(user_id)
            .await?
            .map(|a| a.total_xp)
            .unwrap_or_default();
        if ledger_sum != total_xp {
            tracing::warn!(user_id, ledger_sum, total_xp, "xp total drifted from ledger");
        }
        Ok(Reconciliation {
            user_id: user_id.to_string(),
            ledger_sum,
            total_xp,
            consistent: ledger_sum == total_xp,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_is_square_root_staircase() {
        assert_eq!(level_for(0), 0);
        assert_eq!(level_for(99), 0);
        assert_eq!(level_for(100), 1);
        assert_eq!(level_for(399), 1);
        assert_eq!(level_for(400), 2);
        assert_eq!(level_for(900), 3);
        assert_eq!(level_for(10_000), 10);
        assert_eq!(level_for(-50), 0);
    }

    #[test]
    fn level_never_decreases_as_xp_grows() {
        let mut prev = 0;
        for xp in (0..50_000).step_by(7) {
            let level = level_for(xp);
            assert!(level >= prev, "level dropped at {xp}");
            assert!(xp >= xp_for_level(level));
            assert!(xp < xp_for_level(level + 1));
            prev = level;
        }
    }

    #[test]
    fn reward_table() {
        assert_eq!(fixed_reward(XpReason::LessonComplete), Some(10));
        assert_eq!(fixed_reward(XpReason::QuizPass), Some(15));
        assert_eq!(fixed_reward(XpReason::CourseCompleteBonus), Some(50));
        assert_eq!(fixed_reward(XpReason::BadgeBonus), None);
    }

    #[test]
    fn grant_validation() {
        let ok = XpGrant::fixed("u1", XpReason::QuizPass, "q1", None);
        assert!(ok.validate().is_ok());

        let mut overpaid = ok.clone();
        overpaid.amount = 1_000;
        assert!(matches!(
            overpaid.validate(),
            Err(ProgressError::Validation { ref field, .. }) if field == "amount"
        ));

        let correction = XpGrant {
            user_id: "u1".into(),
            reason: XpReason::Correction,
            reference_id: "ticket-7".into(),
            amount: 5,
            course_id: None,
        };
        assert!(correction.validate().is_err());

        let blank = XpGrant::fixed(" ", XpReason::LessonComplete, "l1", None);
        assert!(blank.validate().is_err());
    }
}
