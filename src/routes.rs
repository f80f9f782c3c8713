use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use crate::badges::BadgeUnlock;
use crate::certificates::CertificateOutcome;
use crate::engine::{ProgressEngine, ProgressView};
use crate::error::ProgressError;
use crate::ingest::{IngestResult, RawProgressEvent};
use crate::models::LeaderboardEntry;

type ApiResult<T> = Result<Json<T>, (StatusCode, String)>;

pub fn router(engine: Arc<ProgressEngine>) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        // write path
        .route("/api/events", post(ingest_event))
        .route("/api/users/:user_id/badges/reevaluate", post(reevaluate))
        .route(
            "/api/courses/:course_id/students/:student_id/certificate",
            post(generate_certificate),
        )
        // read path
        .route("/api/users/:user_id/progress", get(progress))
        .route("/api/leaderboard", get(global_leaderboard))
        .route("/api/courses/:course_id/leaderboard", get(course_leaderboard))
        .with_state(engine)
}

#[derive(Deserialize, Debug, Default)]
struct LeaderboardQuery {
    limit: Option<usize>,
    around: Option<String>,
}

const DEFAULT_LIMIT: usize = 10;

async fn ingest_event(
    State(engine): State<Arc<ProgressEngine>>,
    Json(raw): Json<RawProgressEvent>,
) -> ApiResult<IngestResult> {
    let result = engine.ingest_raw(&raw).await.map_err(to_http)?;
    Ok(Json(result))
}

async fn reevaluate(
    State(engine): State<Arc<ProgressEngine>>,
    Path(user_id): Path<String>,
) -> ApiResult<Vec<BadgeUnlock>> {
    Ok(Json(engine.reevaluate(&user_id).await.map_err(to_http)?))
}

async fn generate_certificate(
    State(engine): State<Arc<ProgressEngine>>,
    Path((course_id, student_id)): Path<(String, String)>,
) -> ApiResult<CertificateOutcome> {
    let outcome = engine
        .generate(&student_id, &course_id)
        .await
        .map_err(to_http)?;
    Ok(Json(outcome))
}

async fn progress(
    State(engine): State<Arc<ProgressEngine>>,
    Path(user_id): Path<String>,
) -> ApiResult<ProgressView> {
    Ok(Json(engine.progress(&user_id).await.map_err(to_http)?))
}

async fn global_leaderboard(
    State(engine): State<Arc<ProgressEngine>>,
    Query(q): Query<LeaderboardQuery>,
) -> ApiResult<Vec<LeaderboardEntry>> {
    let entries = engine
        .global_leaderboard(q.limit.unwrap_or(DEFAULT_LIMIT), q.around.as_deref())
        .await
        .map_err(to_http)?;
    Ok(Json(entries))
}

async fn course_leaderboard(
    State(engine): State<Arc<ProgressEngine>>,
    Path(course_id): Path<String>,
    Query(q): Query<LeaderboardQuery>,
) -> ApiResult<Vec<LeaderboardEntry>> {
    let entries = engine
        .course_leaderboard(&course_id, q.limit.unwrap_or(DEFAULT_LIMIT), q.around.as_deref())
        .await
        .map_err(to_http)?;
    Ok(Json(entries))
}

// --- helpers ---
fn to_http(err: ProgressError) -> (StatusCode, String) {
    let status = match &err {
        ProgressError::Validation { .. } | ProgressError::UnsupportedEvent(_) => {
            StatusCode::BAD_REQUEST
        }
        ProgressError::NotFound { .. } => StatusCode::NOT_FOUND,
        ProgressError::NotEligible { .. } | ProgressError::Conflict { .. } => StatusCode::CONFLICT,
        ProgressError::PersistenceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
    };
    if status.is_server_error() {
        tracing::error!(error = %err, "internal error");
    }
    (status, format!("{}: {}", err.error_code(), err))
}
