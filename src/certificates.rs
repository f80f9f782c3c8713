use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::badges::BadgeUnlock;
use crate::catalog::CourseSnapshot;
use crate::engine::ProgressEngine;
use crate::error::{ProgressError, Result};
use crate::ledger::XpGrant;
use crate::models::{Certificate, EnrollmentStatus, XpReason};

/// Per (student, course). `Certified` is terminal.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CompletionState {
    InProgress,
    Eligible,
    Certified,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CertificateOutcome {
    pub certificate: Certificate,
    pub xp_awarded: i64,
    pub badges_awarded: Vec<BadgeUnlock>,
    pub is_first_completion: bool,
    pub already_existed: bool,
    /// Cascade steps that failed after the certificate was stored. The
    /// certificate stands; re-run `generate` or `reevaluate` to catch up.
    pub followup_errors: Vec<String>,
}

fn eligibility(course_id: &str, snapshot: &CourseSnapshot) -> Result<()> {
    if snapshot.is_complete() {
        return Ok(());
    }
    Err(ProgressError::NotEligible {
        course_id: course_id.to_string(),
        missing_lessons: snapshot.missing_lessons(),
        missing_quizzes: snapshot.missing_quizzes(),
    })
}

fn new_certificate_id() -> String {
    format!("CERT-{}", Uuid::new_v4().simple().to_string().to_uppercase())
}

impl ProgressEngine {
    pub async fn completion_state(&self, student_id: &str, course_id: &str) -> Result<CompletionState> {
        if self.store.certificate(student_id, course_id).await?.is_some() {
            return Ok(CompletionState::Certified);
        }
        let snapshot = self.snapshot(student_id, course_id).await?;
        Ok(if snapshot.is_complete() {
            CompletionState::Eligible
        } else {
            CompletionState::InProgress
        })
    }

    async fn snapshot(&self, student_id: &str, course_id: &str) -> Result<CourseSnapshot> {
        self.catalog
            .course_snapshot(student_id, course_id)
            .await?
            .ok_or_else(|| ProgressError::NotFound {
                entity: "course",
                id: course_id.to_string(),
            })
    }

    /// Only an active or already completed enrollment can be certified.
    async fn check_enrollment(&self, student_id: &str, course_id: &str) -> Result<()> {
        let enrollment = self
            .catalog
            .enrollment(student_id, course_id)
            .await?
            .ok_or_else(|| ProgressError::NotFound {
                entity: "enrollment",
                id: format!("{student_id}/{course_id}"),
            })?;
        if enrollment.status == EnrollmentStatus::Unenrolled {
            return Err(ProgressError::validation(
                "enrollment",
                format!("{student_id} is unenrolled from {course_id}"),
            ));
        }
        Ok(())
    }

    /// Issues the course certificate exactly once.
    ///
    /// The winner of the insert marks the enrollment completed, pays the
    /// completion bonus and re-evaluates badges. Failures in those steps are
    /// collected in `followup_errors` and never undo the certificate.
    #[tracing::instrument(skip(self))]
    pub async fn generate(&self, student_id: &str, course_id: &str) -> Result<CertificateOutcome> {
        if student_id.trim().is_empty() {
            return Err(ProgressError::validation("student_id", "must not be empty"));
        }
        if course_id.trim().is_empty() {
            return Err(ProgressError::validation("course_id", "must not be empty"));
        }

        if let Some(existing) = self.store.certificate(student_id, course_id).await? {
            return self.existing_certificate(existing).await;
        }

        let snapshot = self.snapshot(student_id, course_id).await?;
        eligibility(course_id, &snapshot)?;
        self.check_enrollment(student_id, course_id).await?;

        let certificate = Certificate {
            certificate_id: new_certificate_id(),
            student_id: student_id.to_string(),
            course_id: course_id.to_string(),
            issued_at: Utc::now(),
        };
        let held = match self.store.insert_certificate(&certificate).await {
            Ok(held) => held,
            Err(ProgressError::Conflict { .. }) => {
                let existing = self
                    .store
                    .certificate(student_id, course_id)
                    .await?
                    .ok_or_else(|| ProgressError::NotFound {
                        entity: "certificate",
                        id: format!("{student_id}/{course_id}"),
                    })?;
                tracing::debug!("lost certificate race; returning the stored one");
                return self.existing_certificate(existing).await;
            }
            Err(e) => return Err(e),
        };
        tracing::info!(certificate_id = %certificate.certificate_id, "certificate issued");

        let mut followup_errors = Vec::new();

        if let Err(e) = self
            .catalog
            .mark_completed(student_id, course_id, certificate.issued_at)
            .await
        {
            tracing::warn!(error = %e, "enrollment write-back failed");
            followup_errors.push(format!("mark_completed: {e}"));
        }

        let xp_awarded = match self.completion_bonus(&certificate).await {
            Ok(xp) => xp,
            Err(e) => {
                tracing::warn!(error = %e, "completion bonus not granted");
                followup_errors.push(format!("completion_bonus: {e}"));
                0
            }
        };

        let badges_awarded = match self.reevaluate(student_id).await {
            Ok(unlocked) => unlocked,
            Err(e) => {
                tracing::warn!(error = %e, "badge evaluation deferred");
                followup_errors.push(format!("reevaluate: {e}"));
                Vec::new()
            }
        };

        Ok(CertificateOutcome {
            certificate,
            xp_awarded,
            badges_awarded,
            is_first_completion: held == 1,
            already_existed: false,
            followup_errors,
        })
    }

    async fn completion_bonus(&self, certificate: &Certificate) -> Result<i64> {
        let grant = XpGrant::fixed(
            &certificate.student_id,
            XpReason::CourseCompleteBonus,
            &certificate.course_id,
            Some(&certificate.course_id),
        );
        let amount = grant.amount;
        let outcome = self.grant_xp(grant).await?;
        Ok(if outcome.granted { amount } else { 0 })
    }

    /// Terminal state. The bonus grant is re-issued (a no-op unless an
    /// earlier call failed between storing the certificate and paying it).
    async fn existing_certificate(&self, certificate: Certificate) -> Result<CertificateOutcome> {
        let xp_awarded = self.completion_bonus(&certificate).await?;
        if xp_awarded > 0 {
            tracing::info!(certificate_id = %certificate.certificate_id, "restored missing completion bonus");
        }
        Ok(CertificateOutcome {
            certificate,
            xp_awarded,
            badges_awarded: Vec::new(),
            is_first_completion: false,
            already_existed: true,
            followup_errors: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_eligible_reports_missing_counts() {
        let snap = CourseSnapshot {
            total_lessons: 5,
            completed_lessons: 3,
            quiz_lessons: 2,
            passed_quiz_lessons: 0,
        };
        match eligibility("c1", &snap) {
            Err(ProgressError::NotEligible {
                missing_lessons,
                missing_quizzes,
                ..
            }) => assert_eq!((missing_lessons, missing_quizzes), (2, 2)),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn certificate_ids_are_opaque_and_unique() {
        let a = new_certificate_id();
        let b = new_certificate_id();
        assert!(a.starts_with("CERT-"));
        assert_eq!(a.len(), 5 + 32);
        assert_ne!(a, b);
    }
}
