use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::badges::{self, BadgeProgress};
use crate::catalog::CourseCatalog;
use crate::error::{ProgressError, Result};
use crate::ledger;
use crate::models::{BadgeDefinition, Certificate, UserBadge, UserProgressAggregate};
use crate::store::ProgressStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    pub leaderboard_window_radius: usize,
    pub leaderboard_max_limit: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            leaderboard_window_radius: 2,
            leaderboard_max_limit: 100,
        }
    }
}

pub struct ProgressEngine {
    pub(crate) store: Arc<dyn ProgressStore>,
    pub(crate) catalog: Arc<dyn CourseCatalog>,
    pub(crate) badges: Vec<BadgeDefinition>,
    pub(crate) settings: EngineSettings,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ProgressView {
    pub user_id: String,
    pub total_xp: i64,
    pub level: u32,
    /// XP still needed to reach `level + 1`.
    pub xp_to_next_level: i64,
    pub current_streak: i32,
    pub longest_streak: i32,
    pub last_activity_date: Option<chrono::NaiveDate>,
    pub badges: Vec<UserBadge>,
    pub badge_progress: Vec<BadgeProgress>,
    pub certificates: Vec<Certificate>,
}

impl ProgressEngine {
    /// Engine with the built-in badge catalog and default settings.
    pub fn new(store: Arc<dyn ProgressStore>, catalog: Arc<dyn CourseCatalog>) -> Self {
        Self {
            store,
            catalog,
            badges: badges::default_catalog(),
            settings: EngineSettings::default(),
        }
    }

    pub fn with_badges(mut self, badges: Vec<BadgeDefinition>) -> Result<Self> {
        badges::validate_catalog(&badges)?;
        self.badges = badges;
        Ok(self)
    }

    pub fn with_settings(mut self, settings: EngineSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn badge_catalog(&self) -> &[BadgeDefinition] {
        &self.badges
    }

    /// The user's aggregate, zero-valued if nothing has been recorded yet.
    pub async fn aggregate(&self, user_id: &str) -> Result<UserProgressAggregate> {
        Ok(self
            .store
            .aggregate(user_id)
            .await?
            .unwrap_or_else(|| UserProgressAggregate::zeroed(user_id)))
    }

    pub async fn progress(&self, user_id: &str) -> Result<ProgressView> {
        if user_id.trim().is_empty() {
            return Err(ProgressError::validation("user_id", "must not be empty"));
        }
        let agg = self.aggregate(user_id).await?;
        let level = agg.level();
        Ok(ProgressView {
            xp_to_next_level: ledger::xp_for_level(level + 1) - agg.total_xp.max(0),
            level,
            user_id: agg.user_id,
            total_xp: agg.total_xp,
            current_streak: agg.current_streak,
            longest_streak: agg.longest_streak,
            last_activity_date: agg.last_activity_date,
            badges: self.store.badges(user_id).await?,
            badge_progress: self.badge_progress(user_id).await?,
            certificates: self.store.certificates(user_id).await?,
        })
    }
}
