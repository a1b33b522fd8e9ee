use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use edutrack_core::error::{self, ApiError};

/// Internal error type that converts to structured API responses
#[derive(Debug)]
pub enum AppError {
    /// Validation error (400)
    Validation {
        message: String,
        field: Option<String>,
        received: Option<serde_json::Value>,
        docs_hint: Option<String>,
    },
    /// Missing or invalid credentials (401)
    Unauthorized {
        message: String,
        docs_hint: Option<String>,
    },
    /// Authenticated but not allowed (403)
    Forbidden {
        message: String,
        docs_hint: Option<String>,
    },
    /// Resource does not exist or is not visible to the caller (404)
    NotFound { resource: String },
    /// Unique constraint or state conflict (409)
    Conflict {
        code: &'static str,
        message: String,
        docs_hint: Option<String>,
    },
    /// Database error (500)
    Database(sqlx::Error),
    /// Internal error (500)
    Internal(String),
}

impl AppError {
    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        AppError::Validation {
            message: message.into(),
            field: Some(field.to_string()),
            received: None,
            docs_hint: None,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation { .. } => StatusCode::BAD_REQUEST,
            AppError::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            AppError::Forbidden { .. } => StatusCode::FORBIDDEN,
            AppError::NotFound { .. } => StatusCode::NOT_FOUND,
            AppError::Conflict { .. } => StatusCode::CONFLICT,
            AppError::Database(err) if is_unique_violation(err) => StatusCode::CONFLICT,
            AppError::Database(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Postgres `unique_violation`.
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("23505"))
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let request_id = uuid::Uuid::now_v7().to_string();
        let status = self.status();

        let api_error = match self {
            AppError::Validation {
                message,
                field,
                received,
                docs_hint,
            } => ApiError {
                error: error::codes::VALIDATION_FAILED.to_string(),
                message,
                field,
                received,
                request_id,
                docs_hint,
            },
            AppError::Unauthorized { message, docs_hint } => ApiError {
                error: error::codes::UNAUTHORIZED.to_string(),
                message,
                field: None,
                received: None,
                request_id,
                docs_hint,
            },
            AppError::Forbidden { message, docs_hint } => ApiError {
                error: error::codes::FORBIDDEN.to_string(),
                message,
                field: None,
                received: None,
                request_id,
                docs_hint,
            },
            AppError::NotFound { resource } => ApiError {
                error: error::codes::NOT_FOUND.to_string(),
                message: format!("{resource} not found"),
                field: None,
                received: None,
                request_id,
                docs_hint: None,
            },
            AppError::Conflict {
                code,
                message,
                docs_hint,
            } => ApiError {
                error: code.to_string(),
                message,
                field: None,
                received: None,
                request_id,
                docs_hint,
            },
            AppError::Database(err) if is_unique_violation(&err) => {
                tracing::warn!("Unique constraint violated: {:?}", err);
                ApiError {
                    error: error::codes::CONFLICT.to_string(),
                    message: "Resource already exists".to_string(),
                    field: None,
                    received: None,
                    request_id,
                    docs_hint: None,
                }
            }
            AppError::Database(err) => {
                tracing::error!("Database error: {:?}", err);
                internal(request_id)
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                internal(request_id)
            }
        };

        (status, Json(api_error)).into_response()
    }
}

fn internal(request_id: String) -> ApiError {
    ApiError {
        error: error::codes::INTERNAL_ERROR.to_string(),
        message: "An internal error occurred".to_string(),
        field: None,
        received: None,
        request_id,
        docs_hint: None,
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Database(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_variant() {
        assert_eq!(
            AppError::validation("email", "bad").status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::NotFound {
                resource: "chat session".to_string()
            }
            .status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::Conflict {
                code: error::codes::CHAT_BUSY,
                message: "busy".to_string(),
                docs_hint: None
            }
            .status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::Database(sqlx::Error::RowNotFound).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn internal_errors_do_not_leak_details() {
        let response = AppError::Internal("secret detail".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
