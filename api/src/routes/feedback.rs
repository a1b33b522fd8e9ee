use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use edutrack_core::auth;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::error::AppError;
use crate::extract::AppJson;
use crate::state::AppState;

const MAX_SUBJECT_CHARS: usize = 200;
const MAX_MESSAGE_CHARS: usize = 5000;

pub fn router() -> Router<AppState> {
    Router::new().route("/v1/feedback", post(submit_feedback))
}

/// Message from the contact page. Works signed in or anonymous.
#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct FeedbackRequest {
    pub email: String,
    pub subject: String,
    pub message: String,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct FeedbackResponse {
    pub id: Uuid,
    pub status: String,
}

struct ValidFeedback {
    email: String,
    subject: String,
    message: String,
}

fn validate_feedback(req: &FeedbackRequest) -> Result<ValidFeedback, AppError> {
    let email = auth::normalize_email(&req.email);
    if !auth::is_plausible_email(&email) {
        return Err(AppError::validation("email", "email must be a valid address"));
    }
    let subject = req.subject.trim();
    if subject.is_empty() || subject.chars().count() > MAX_SUBJECT_CHARS {
        return Err(AppError::validation(
            "subject",
            format!("subject must be 1-{MAX_SUBJECT_CHARS} characters"),
        ));
    }
    let message = req.message.trim();
    if message.is_empty() || message.chars().count() > MAX_MESSAGE_CHARS {
        return Err(AppError::validation(
            "message",
            format!("message must be 1-{MAX_MESSAGE_CHARS} characters"),
        ));
    }
    Ok(ValidFeedback {
        email,
        subject: subject.to_string(),
        message: message.to_string(),
    })
}

#[utoipa::path(
    post,
    path = "/v1/feedback",
    request_body = FeedbackRequest,
    responses(
        (status = 201, description = "Feedback stored", body = FeedbackResponse),
        (status = 400, description = "Validation error", body = edutrack_core::error::ApiError)
    ),
    tag = "feedback"
)]
pub async fn submit_feedback(
    user: Option<AuthenticatedUser>,
    State(state): State<AppState>,
    AppJson(req): AppJson<FeedbackRequest>,
) -> Result<impl IntoResponse, AppError> {
    let feedback = validate_feedback(&req)?;
    let id = Uuid::now_v7();
    let user_id = user.map(|u| u.user_id);

    let status: String = sqlx::query_scalar(
        "INSERT INTO feedback (id, user_id, email, subject, message) \
         VALUES ($1, $2, $3, $4, $5) RETURNING status",
    )
    .bind(id)
    .bind(user_id)
    .bind(&feedback.email)
    .bind(&feedback.subject)
    .bind(&feedback.message)
    .fetch_one(&state.db)
    .await?;

    tracing::info!(feedback_id = %id, signed_in = user_id.is_some(), "feedback received");
    Ok((StatusCode::CREATED, Json(FeedbackResponse { id, status })))
}
