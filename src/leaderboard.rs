use crate::engine::ProgressEngine;
use crate::error::{ProgressError, Result};
use crate::models::LeaderboardEntry;

/// Descending XP, ties by ascending user id. Ranks are row numbers, never shared.
pub fn rank(mut rows: Vec<(String, i64)>) -> Vec<LeaderboardEntry> {
    rows.sort_by(|(ua, xa), (ub, xb)| xb.cmp(xa).then_with(|| ua.cmp(ub)));
    rows.into_iter()
        .enumerate()
        .map(|(i, (user_id, total_xp))| LeaderboardEntry {
            rank: i as u32 + 1,
            user_id,
            total_xp,
        })
        .collect()
}

/// Top `limit` entries, plus a window of `radius` ranks either side of
/// `around` when that user sits below the top block.
pub fn window(
    ranked: &[LeaderboardEntry],
    limit: usize,
    around: Option<&str>,
    radius: usize,
) -> Vec<LeaderboardEntry> {
    let top = limit.min(ranked.len());
    let mut out = ranked[..top].to_vec();

    let position = around.and_then(|user| ranked.iter().position(|e| e.user_id == user));
    if let Some(pos) = position.filter(|&p| p >= top) {
        let start = pos.saturating_sub(radius).max(top);
        let end = (pos + radius + 1).min(ranked.len());
        out.extend_from_slice(&ranked[start..end]);
    }
    out
}

impl ProgressEngine {
    fn check_limit(&self, limit: usize) -> Result<usize> {
        if limit == 0 {
            return Err(ProgressError::validation("limit", "must be at least 1"));
        }
        Ok(limit.min(self.settings.leaderboard_max_limit))
    }

    pub async fn global_leaderboard(
        &self,
        limit: usize,
        around_user_id: Option<&str>,
    ) -> Result<Vec<LeaderboardEntry>> {
        let limit = self.check_limit(limit)?;
        let ranked = rank(self.store.xp_standings(None).await?);
        Ok(window(
            &ranked,
            limit,
            around_user_id,
            self.settings.leaderboard_window_radius,
        ))
    }

    /// Ranks users by the XP they earned inside `course_id`.
    pub async fn course_leaderboard(
        &self,
        course_id: &str,
        limit: usize,
        around_user_id: Option<&str>,
    ) -> Result<Vec<LeaderboardEntry>> {
        if course_id.trim().is_empty() {
            return Err(ProgressError::validation("course_id", "must not be empty"));
        }
        let limit = self.check_limit(limit)?;
        let ranked = rank(self.store.xp_standings(Some(course_id)).await?);
        Ok(window(
            &ranked,
            limit,
            around_user_id,
            self.settings.leaderboard_window_radius,
        ))
    }
}
