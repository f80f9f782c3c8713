use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ProgressError;
use crate::ledger;

// --- events ---

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ProgressEventKind {
    LessonCompleted,
    QuizPassed,
    CourseProgressChanged,
    CourseCompleted,
}

/// Canonical learning event. Produced only by the ingestor from a raw event.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ProgressEvent {
    pub user_id: String,
    pub kind: ProgressEventKind,
    pub course_id: String,
    pub lesson_id: Option<String>,
    pub quiz_id: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

// --- xp ledger ---

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum XpReason {
    LessonComplete,
    QuizPass,
    CourseCompleteBonus,
    BadgeBonus,
    /// Negative adjustment issued by an operator; never deduplicated.
    Correction,
}

impl XpReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LessonComplete => "lesson_complete",
            Self::QuizPass => "quiz_pass",
            Self::CourseCompleteBonus => "course_complete_bonus",
            Self::BadgeBonus => "badge_bonus",
            Self::Correction => "correction",
        }
    }
}

impl fmt::Display for XpReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for XpReason {
    type Err = ProgressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "lesson_complete" => Ok(Self::LessonComplete),
            "quiz_pass" => Ok(Self::QuizPass),
            "course_complete_bonus" => Ok(Self::CourseCompleteBonus),
            "badge_bonus" => Ok(Self::BadgeBonus),
            "correction" => Ok(Self::Correction),
            other => Err(ProgressError::validation(
                "reason",
                format!("unknown xp reason '{other}'"),
            )),
        }
    }
}

/// Append-only; corrections are new negative rows.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct XpLedgerEntry {
    pub id: Uuid,
    pub user_id: String,
    pub amount: i64,
    pub reason: XpReason,
    pub reference_id: String,
    pub course_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

// --- aggregate ---

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct UserProgressAggregate {
    pub user_id: String,
    pub total_xp: i64,
    pub current_streak: i32,
    pub longest_streak: i32,
    pub last_activity_date: Option<NaiveDate>,
}

impl UserProgressAggregate {
    pub fn zeroed(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            total_xp: 0,
            current_streak: 0,
            longest_streak: 0,
            last_activity_date: None,
        }
    }

    /// Derived from `total_xp` on every read, never stored.
    pub fn level(&self) -> u32 {
        ledger::level_for(self.total_xp)
    }
}

// --- badges ---

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BadgeCriteria {
    CoursesCompleted,
    StreakDays,
    QuizzesPassed,
    ReviewsWritten,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Rarity {
    #[default]
    Common,
    Rare,
    Epic,
    Legendary,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct BadgeDefinition {
    pub key: String,
    pub name: String,
    pub criteria_type: BadgeCriteria,
    pub target: i64,
    pub xp_reward: i64,
    #[serde(default)]
    pub rarity: Rarity,
}

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct UserBadge {
    pub user_id: String,
    pub badge_key: String,
    pub earned_at: DateTime<Utc>,
}

// --- enrollment & certificates ---

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EnrollmentStatus {
    Active,
    Completed,
    Unenrolled,
}

impl EnrollmentStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "completed" => Some(Self::Completed),
            "unenrolled" => Some(Self::Unenrolled),
            _ => None,
        }
    }
}

/// Owned by the course service; read here and written back on completion.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct EnrollmentProgress {
    pub student_id: String,
    pub course_id: String,
    pub status: EnrollmentStatus,
    pub progress_percent: i32,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Certificate {
    pub certificate_id: String,
    pub student_id: String,
    pub course_id: String,
    pub issued_at: DateTime<Utc>,
}

// --- leaderboard ---

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct LeaderboardEntry {
    pub rank: u32,
    pub user_id: String,
    pub total_xp: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn xp_reason_parses_its_own_labels() {
        for reason in [
            XpReason::LessonComplete,
            XpReason::QuizPass,
            XpReason::CourseCompleteBonus,
            XpReason::BadgeBonus,
            XpReason::Correction,
        ] {
            assert_eq!(reason.as_str().parse::<XpReason>().unwrap(), reason);
        }
        assert!("bogus".parse::<XpReason>().is_err());
    }

    #[test]
    fn badge_definition_defaults_rarity() {
        let def: BadgeDefinition = serde_json::from_str(
            r#"{"key":"K","name":"K","criteria_type":"streak_days","target":3,"xp_reward":5}"#,
        )
        .unwrap();
        assert_eq!(def.rarity, Rarity::Common);
        assert_eq!(def.criteria_type, BadgeCriteria::StreakDays);
    }
}
