//! Daily-activity streaks. A day is a UTC calendar day.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::engine::ProgressEngine;
use crate::error::{ProgressError, Result};
use crate::models::UserProgressAggregate;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StreakChange {
    /// First activity ever recorded for the user.
    Started,
    SameDay,
    Extended,
    /// A gap of one or more idle days; today counts as day 1.
    Restarted,
    /// Activity dated before the last recorded day. Streak fields untouched.
    OutOfOrder,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreakSnapshot {
    pub current_streak: i32,
    pub longest_streak: i32,
    pub change: StreakChange,
}

pub fn activity_day(at: DateTime<Utc>) -> NaiveDate {
    at.date_naive()
}

/// Applies one day of activity to the aggregate's streak fields.
pub fn advance(state: &mut UserProgressAggregate, day: NaiveDate) -> StreakSnapshot {
    let change = match state.last_activity_date {
        None => StreakChange::Started,
        Some(last) if day == last => StreakChange::SameDay,
        Some(last) if day < last => StreakChange::OutOfOrder,
        Some(last) if last.succ_opt() == Some(day) => StreakChange::Extended,
        Some(_) => StreakChange::Restarted,
    };

    match change {
        StreakChange::Started | StreakChange::Restarted => state.current_streak = 1,
        StreakChange::Extended => state.current_streak += 1,
        StreakChange::SameDay | StreakChange::OutOfOrder => {}
    }

    if change != StreakChange::OutOfOrder {
        state.longest_streak = state.longest_streak.max(state.current_streak);
        state.last_activity_date = Some(day);
    }

    StreakSnapshot {
        current_streak: state.current_streak,
        longest_streak: state.longest_streak,
        change,
    }
}

impl ProgressEngine {
    #[tracing::instrument(skip(self))]
    pub async fn record_activity(&self, user_id: &str, day: NaiveDate) -> Result<StreakSnapshot> {
        if user_id.trim().is_empty() {
            return Err(ProgressError::validation("user_id", "must not be empty"));
        }
        let snapshot = self.store.apply_activity(user_id, day).await?;
        if snapshot.change == StreakChange::OutOfOrder {
            tracing::debug!(%day, "activity predates last recorded day; streak untouched");
        }
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, d).unwrap()
    }

    #[test]
    fn consecutive_days_then_gap() {
        let mut agg = UserProgressAggregate::zeroed("u1");
        for d in 1..=3 {
            advance(&mut agg, day(d));
        }
        assert_eq!((agg.current_streak, agg.longest_streak), (3, 3));

        let snap = advance(&mut agg, day(5));
        assert_eq!(snap.change, StreakChange::Restarted);
        assert_eq!((snap.current_streak, snap.longest_streak), (1, 3));
        assert_eq!(agg.last_activity_date, Some(day(5)));
    }

    #[test]
    fn same_day_counts_once() {
        let mut agg = UserProgressAggregate::zeroed("u1");
        assert_eq!(advance(&mut agg, day(1)).change, StreakChange::Started);
        let snap = advance(&mut agg, day(1));
        assert_eq!(snap.change, StreakChange::SameDay);
        assert_eq!(snap.current_streak, 1);
    }

    #[test]
    fn out_of_order_leaves_fields_alone() {
        let mut agg = UserProgressAggregate::zeroed("u1");
        advance(&mut agg, day(10));
        advance(&mut agg, day(11));
        let before = agg.clone();

        let snap = advance(&mut agg, day(9));
        assert_eq!(snap.change, StreakChange::OutOfOrder);
        assert_eq!(agg, before);
    }

    #[test]
    fn month_boundary_extends() {
        let mut agg = UserProgressAggregate::zeroed("u1");
        advance(&mut agg, NaiveDate::from_ymd_opt(2026, 2, 28).unwrap());
        let snap = advance(&mut agg, NaiveDate::from_ymd_opt(2026, 3, 1).unwrap());
        assert_eq!(snap.change, StreakChange::Extended);
        assert_eq!(snap.current_streak, 2);
    }

    #[test]
    fn activity_day_uses_utc_calendar() {
        let late = DateTime::parse_from_rfc3339("2026-03-01T23:30:00-05:00")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(activity_day(late), day(2));
    }
}
