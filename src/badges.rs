use std::collections::{HashMap, HashSet};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::engine::ProgressEngine;
use crate::error::{ProgressError, Result};
use crate::ledger::XpGrant;
use crate::models::{BadgeCriteria, BadgeDefinition, Rarity, UserBadge, XpReason};

pub const FIRST_COURSE_COMPLETE: &str = "FIRST_COURSE_COMPLETE";

pub fn default_catalog() -> Vec<BadgeDefinition> {
    let badge = |key: &str,
                 name: &str,
                 criteria_type: BadgeCriteria,
                 target: i64,
                 xp_reward: i64,
                 rarity: Rarity| BadgeDefinition {
        key: key.to_string(),
        name: name.to_string(),
        criteria_type,
        target,
        xp_reward,
        rarity,
    };
    vec![
        badge(FIRST_COURSE_COMPLETE, "First Graduation", BadgeCriteria::CoursesCompleted, 1, 25, Rarity::Common),
        badge("COURSE_COLLECTOR", "Course Collector", BadgeCriteria::CoursesCompleted, 5, 100, Rarity::Rare),
        badge("WEEK_STREAK", "Seven Day Streak", BadgeCriteria::StreakDays, 7, 50, Rarity::Rare),
        badge("MONTH_STREAK", "Thirty Day Streak", BadgeCriteria::StreakDays, 30, 200, Rarity::Epic),
        badge("QUIZ_WHIZ", "Quiz Whiz", BadgeCriteria::QuizzesPassed, 10, 40, Rarity::Rare),
        badge("FIRST_REVIEW", "First Review", BadgeCriteria::ReviewsWritten, 1, 10, Rarity::Common),
    ]
}

/// Rejects duplicate keys, non-positive targets and negative rewards.
pub fn validate_catalog(defs: &[BadgeDefinition]) -> Result<()> {
    let mut seen = HashSet::new();
    for def in defs {
        if def.key.trim().is_empty() {
            return Err(ProgressError::validation("key", "badge key must not be empty"));
        }
        if !seen.insert(def.key.as_str()) {
            return Err(ProgressError::validation(
                "key",
                format!("duplicate badge key '{}'", def.key),
            ));
        }
        if def.target <= 0 {
            return Err(ProgressError::validation(
                "target",
                format!("badge '{}' needs a positive target", def.key),
            ));
        }
        if def.xp_reward < 0 {
            return Err(ProgressError::validation(
                "xp_reward",
                format!("badge '{}' has a negative reward", def.key),
            ));
        }
    }
    Ok(())
}

pub fn load_catalog(path: &Path) -> Result<Vec<BadgeDefinition>> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        ProgressError::validation("badge_catalog", format!("{}: {e}", path.display()))
    })?;
    let defs: Vec<BadgeDefinition> = serde_json::from_str(&raw)
        .map_err(|e| ProgressError::validation("badge_catalog", e.to_string()))?;
    validate_catalog(&defs)?;
    Ok(defs)
}

/// Counter values a badge target is compared against.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BadgeCounters {
    pub courses_completed: i64,
    pub current_streak: i64,
    pub longest_streak: i64,
    pub quizzes_passed: i64,
    pub reviews_written: i64,
}

impl BadgeCounters {
    pub fn progress(&self, criteria: BadgeCriteria) -> i64 {
        match criteria {
            BadgeCriteria::CoursesCompleted => self.courses_completed,
            // a streak once reached counts, even if it has since broken
            BadgeCriteria::StreakDays => self.longest_streak.max(self.current_streak),
            BadgeCriteria::QuizzesPassed => self.quizzes_passed,
            BadgeCriteria::ReviewsWritten => self.reviews_written,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct BadgeUnlock {
    pub badge_key: String,
    pub name: String,
    pub rarity: Rarity,
    pub xp_awarded: i64,
    pub earned_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct BadgeProgress {
    pub badge_key: String,
    pub progress: i64,
    pub target: i64,
    pub earned: bool,
}

fn badge_bonus(user_id: &str, def: &BadgeDefinition) -> XpGrant {
    XpGrant {
        user_id: user_id.to_string(),
        reason: XpReason::BadgeBonus,
        reference_id: def.key.clone(),
        amount: def.xp_reward,
        course_id: None,
    }
}

impl ProgressEngine {
    pub async fn badge_counters(&self, user_id: &str) -> Result<BadgeCounters> {
        let agg = self.store.aggregate(user_id).await?;
        Ok(BadgeCounters {
            courses_completed: self.store.certificates(user_id).await?.len() as i64,
            current_streak: agg.as_ref().map(|a| i64::from(a.current_streak)).unwrap_or_default(),
            longest_streak: agg.as_ref().map(|a| i64::from(a.longest_streak)).unwrap_or_default(),
            quizzes_passed: self.store.count_grants(user_id, XpReason::QuizPass).await?,
            reviews_written: self.catalog.reviews_written(user_id).await?,
        })
    }

    /// Unlocks every badge whose target is met and not yet held, paying its bonus.
    /// Held badges are never revoked.
    #[tracing::instrument(skip(self))]
    pub async fn reevaluate(&self, user_id: &str) -> Result<Vec<BadgeUnlock>> {
        if user_id.trim().is_empty() {
            return Err(ProgressError::validation("user_id", "must not be empty"));
        }
        let counters = self.badge_counters(user_id).await?;
        let held: HashSet<String> = self
            .store
            .badges(user_id)
            .await?
            .into_iter()
            .map(|b| b.badge_key)
            .collect();

        let mut unlocked = Vec::new();
        for def in self.badges.iter() {
            if held.contains(&def.key) {
                // re-issue a bonus lost after the badge row was written
                if def.xp_reward > 0 {
                    let healed = self.grant_xp(badge_bonus(user_id, def)).await?;
                    if healed.granted {
                        tracing::warn!(badge_key = %def.key, "restored missing badge bonus");
                    }
                }
                continue;
            }
            if counters.progress(def.criteria_type) < def.target {
                continue;
            }

            let badge = UserBadge {
                user_id: user_id.to_string(),
                badge_key: def.key.clone(),
                earned_at: Utc::now(),
            };
            match self.store.insert_badge(&badge).await {
                Ok(()) => {}
                Err(ProgressError::Conflict { .. }) => {
                    tracing::debug!(badge_key = %def.key, "badge unlocked concurrently");
                    continue;
                }
                Err(e) => return Err(e),
            }

            let xp_awarded = if def.xp_reward > 0 {
                let outcome = self.grant_xp(badge_bonus(user_id, def)).await?;
                if outcome.granted {
                    def.xp_reward
                } else {
                    0
                }
            } else {
                0
            };

            tracing::info!(badge_key = %def.key, xp_awarded, "badge unlocked");
            unlocked.push(BadgeUnlock {
                badge_key: def.key.clone(),
                name: def.name.clone(),
                rarity: def.rarity,
                xp_awarded,
                earned_at: badge.earned_at,
            });
        }
        Ok(unlocked)
    }

    /// Per-badge progress for display; does not unlock anything.
    pub async fn badge_progress(&self, user_id: &str) -> Result<Vec<BadgeProgress>> {
        let counters = self.badge_counters(user_id).await?;
        let held: HashMap<String, UserBadge> = self
            .store
            .badges(user_id)
            .await?
            .into_iter()
            .map(|b| (b.badge_key.clone(), b))
            .collect();
        Ok(self
            .badges
            .iter()
            .map(|def| BadgeProgress {
                badge_key: def.key.clone(),
                progress: counters.progress(def.criteria_type).min(def.target),
                target: def.target,
                earned: held.contains_key(&def.key),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_catalog_is_valid() {
        let catalog = default_catalog();
        validate_catalog(&catalog).unwrap();
        assert!(catalog.iter().any(|b| b.key == FIRST_COURSE_COMPLETE && b.target == 1));
    }

    #[test]
    fn duplicate_keys_rejected() {
        let mut catalog = default_catalog();
        catalog.push(catalog[0].clone());
        assert!(validate_catalog(&catalog).is_err());
    }

    #[test]
    fn streak_badges_use_best_streak() {
        let counters = BadgeCounters {
            current_streak: 1,
            longest_streak: 9,
            ..Default::default()
        };
        assert_eq!(counters.progress(BadgeCriteria::StreakDays), 9);
    }

    #[test]
    fn load_catalog_from_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("badges.json");
        std::fs::write(
            &path,
            r#"[{"key":"NIGHT_OWL","name":"Night Owl","criteria_type":"quizzes_passed","target":3,"xp_reward":5,"rarity":"legendary"}]"#,
        )
        .unwrap();

        let catalog = load_catalog(&path).unwrap();
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog[0].rarity, Rarity::Legendary);

        std::fs::write(&path, "not json").unwrap();
        assert!(load_catalog(&path).is_err());
    }
}
