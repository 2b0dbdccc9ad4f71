use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use std::sync::Arc;

use crate::{
    db::AppState,
    error::AppError,
    models::{GenericResponse, StoredViolation, ViolationReport, WarningSummary},
};

pub async fn health_checker() -> impl IntoResponse {
    const MESSAGE: &str = "ExamGuard attempt service is running";
    let json_response = serde_json::json!({
        "status": "success",
        "message": MESSAGE
    });
    Json(json_response)
}

fn validate_attempt(attempt_id: &str) -> Result<(), AppError> {
    if attempt_id.trim().is_empty() {
        return Err(AppError::InvalidAttempt);
    }
    Ok(())
}

pub async fn record_violation(
    State(state): State<Arc<AppState>>,
    Path(attempt_id): Path<String>,
    Json(report): Json<ViolationReport>,
) -> Result<(StatusCode, Json<WarningSummary>), AppError> {
    validate_attempt(&attempt_id)?;

    if state.store.is_submitted(&attempt_id).await? {
        tracing::warn!(attempt_id = %attempt_id, "[server] violation for submitted attempt rejected");
        return Err(AppError::AttemptClosed(attempt_id));
    }

    let kind = report.kind;
    let violations = state
        .store
        .record_violation(&attempt_id, StoredViolation::from(report))
        .await?;

    let summary = WarningSummary::new(violations.len(), state.max_warnings, Some(violations));
    tracing::info!(
        attempt_id = %attempt_id,
        violation = ?kind,
        warning_count = summary.warning_count,
        auto_submit = summary.should_auto_submit,
        "[server] violation recorded"
    );

    Ok((StatusCode::CREATED, Json(summary)))
}

pub async fn get_warnings(
    State(state): State<Arc<AppState>>,
    Path(attempt_id): Path<String>,
) -> Result<Json<WarningSummary>, AppError> {
    validate_attempt(&attempt_id)?;

    let count = state.store.violation_count(&attempt_id).await?;
    Ok(Json(WarningSummary::new(count, state.max_warnings, None)))
}

pub async fn submit_attempt(
    State(state): State<Arc<AppState>>,
    Path(attempt_id): Path<String>,
) -> Result<Json<GenericResponse>, AppError> {
    validate_attempt(&attempt_id)?;

    state.store.mark_submitted(&attempt_id).await?;
    tracing::info!(attempt_id = %attempt_id, "[server] attempt submitted");

    Ok(Json(GenericResponse {
        status: "success".to_string(),
        message: format!("[server] attempt {} submitted", attempt_id),
    }))
}
