use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::badges::BadgeUnlock;
use crate::certificates::CertificateOutcome;
use crate::engine::ProgressEngine;
use crate::error::{ProgressError, Result};
use crate::ledger::{GrantOutcome, XpGrant};
use crate::models::{ProgressEvent, ProgressEventKind, XpReason};
use crate::streak::{self, StreakSnapshot};

/// Event as received from a collaborator, before validation.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct RawProgressEvent {
    pub user_id: String,
    pub kind: String,
    #[serde(default)]
    pub course_id: String,
    #[serde(default)]
    pub lesson_id: Option<String>,
    #[serde(default)]
    pub quiz_id: Option<String>,
    #[serde(default)]
    pub occurred_at: Option<DateTime<Utc>>,
}

pub fn parse_kind(kind: &str) -> Result<ProgressEventKind> {
    let normalized = kind.trim().to_ascii_lowercase().replace('-', "_");
    match normalized.as_str() {
        "lesson_completed" => Ok(ProgressEventKind::LessonCompleted),
        "quiz_passed" => Ok(ProgressEventKind::QuizPassed),
        "course_progress_changed" => Ok(ProgressEventKind::CourseProgressChanged),
        "course_completed" => Ok(ProgressEventKind::CourseCompleted),
        _ => Err(ProgressError::UnsupportedEvent(kind.to_string())),
    }
}

fn required(field: &str, value: &str) -> Result<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ProgressError::validation(field, "must not be empty"));
    }
    Ok(value.to_string())
}

fn optional(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

impl RawProgressEvent {
    pub fn normalize(&self) -> Result<ProgressEvent> {
        let kind = parse_kind(&self.kind)?;
        let user_id = required("user_id", &self.user_id)?;
        let course_id = required("course_id", &self.course_id)?;
        let lesson_id = optional(self.lesson_id.as_deref());
        let quiz_id = optional(self.quiz_id.as_deref());

        match kind {
            ProgressEventKind::LessonCompleted if lesson_id.is_none() => {
                return Err(ProgressError::validation(
                    "lesson_id",
                    "required for lesson_completed",
                ))
            }
            ProgressEventKind::QuizPassed if quiz_id.is_none() => {
                return Err(ProgressError::validation("quiz_id", "required for quiz_passed"))
            }
            _ => {}
        }

        Ok(ProgressEvent {
            user_id,
            kind,
            course_id,
            lesson_id,
            quiz_id,
            occurred_at: self.occurred_at.unwrap_or_else(Utc::now),
        })
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct IngestResult {
    pub event: ProgressEvent,
    /// `None` for kinds that carry no XP of their own.
    pub xp: Option<GrantOutcome>,
    pub streak: StreakSnapshot,
    pub badges_unlocked: Vec<BadgeUnlock>,
    /// Present when this event completed the course (or it was already certified).
    pub completion: Option<CertificateOutcome>,
}

impl ProgressEngine {
    pub async fn ingest_raw(&self, raw: &RawProgressEvent) -> Result<IngestResult> {
        let event = raw.normalize().map_err(|e| {
            tracing::debug!(error = %e, kind = %raw.kind, "event dropped");
            e
        })?;
        self.ingest(event).await
    }

    #[tracing::instrument(skip(self, event), fields(user_id = %event.user_id, course_id = %event.course_id, kind = ?event.kind))]
    pub async fn ingest(&self, event: ProgressEvent) -> Result<IngestResult> {
        if event.user_id.trim().is_empty() {
            return Err(ProgressError::validation("user_id", "must not be empty"));
        }
        if event.course_id.trim().is_empty() {
            return Err(ProgressError::validation("course_id", "must not be empty"));
        }

        let grant = match event.kind {
            ProgressEventKind::LessonCompleted => event
                .lesson_id
                .as_deref()
                .map(|lesson| (XpReason::LessonComplete, lesson)),
            ProgressEventKind::QuizPassed => event
                .quiz_id
                .as_deref()
                .map(|quiz| (XpReason::QuizPass, quiz)),
            ProgressEventKind::CourseProgressChanged | ProgressEventKind::CourseCompleted => None,
        };
        let xp = match grant {
            Some((reason, reference)) => Some(
                self.grant_xp(XpGrant::fixed(
                    &event.user_id,
                    reason,
                    reference,
                    Some(&event.course_id),
                ))
                .await?,
            ),
            None => None,
        };

        let streak = self
            .record_activity(&event.user_id, streak::activity_day(event.occurred_at))
            .await?;

        let badges_unlocked = self.reevaluate(&event.user_id).await?;

        let completion = match self.generate(&event.user_id, &event.course_id).await {
            Ok(outcome) => Some(outcome),
            Err(ProgressError::NotEligible { .. }) => None,
            Err(ProgressError::Validation { field, message }) if field == "enrollment" => {
                tracing::debug!(%message, "completion check skipped");
                None
            }
            Err(ProgressError::NotFound { entity, id }) => {
                tracing::debug!(entity, id = %id, "completion check skipped");
                None
            }
            Err(e) => return Err(e),
        };

        Ok(IngestResult {
            event,
            xp,
            streak,
            badges_unlocked,
            completion,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(kind: &str) -> RawProgressEvent {
        RawProgressEvent {
            user_id: "u1".into(),
            kind: kind.into(),
            course_id: "c1".into(),
            lesson_id: Some("l1".into()),
            quiz_id: Some("q1".into()),
            occurred_at: None,
        }
    }

    #[test]
    fn kind_parsing_is_lenient_on_case_and_dashes() {
        assert_eq!(parse_kind("Lesson-Completed").unwrap(), ProgressEventKind::LessonCompleted);
        assert_eq!(parse_kind(" quiz_passed ").unwrap(), ProgressEventKind::QuizPassed);
        assert!(matches!(
            parse_kind("video_paused"),
            Err(ProgressError::UnsupportedEvent(k)) if k == "video_paused"
        ));
    }

    #[test]
    fn normalize_trims_and_defaults_timestamp() {
        let mut event = raw("course_completed");
        event.user_id = "  u1 ".into();
        event.lesson_id = Some("   ".into());
        let before = Utc::now();
        let norm = event.normalize().unwrap();
        assert_eq!(norm.user_id, "u1");
        assert_eq!(norm.lesson_id, None);
        assert!(norm.occurred_at >= before);
    }

    #[test]
    fn normalize_rejects_missing_ids() {
        let mut event = raw("lesson_completed");
        event.course_id = String::new();
        assert!(matches!(
            event.normalize(),
            Err(ProgressError::Validation { ref field, .. }) if field == "course_id"
        ));

        let mut event = raw("lesson_completed");
        event.lesson_id = None;
        assert!(event.normalize().is_err());

        let mut event = raw("quiz_passed");
        event.quiz_id = None;
        assert!(event.normalize().is_err());
    }

    #[test]
    fn unsupported_kind_wins_over_other_errors() {
        let event = RawProgressEvent {
            kind: "teleported".into(),
            ..Default::default()
        };
        assert!(matches!(event.normalize(), Err(ProgressError::UnsupportedEvent(_))));
    }
}
