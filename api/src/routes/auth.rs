use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use chrono::{Duration, Utc};
use edutrack_core::auth;
use edutrack_core::profile::Role;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::error::{AppError, is_unique_violation};
use crate::extract::AppJson;
use crate::mailer;
use crate::state::AppState;

const ACCESS_TOKEN_TTL_SECS: i64 = 3600;
const REFRESH_TOKEN_TTL_DAYS: i64 = 30;
const RESET_TOKEN_TTL_HOURS: i64 = 1;
const MAX_DISPLAY_NAME_CHARS: usize = 100;

pub fn register_router() -> Router<AppState> {
    Router::new().route("/v1/auth/register", post(register))
}

pub fn login_router() -> Router<AppState> {
    Router::new()
        .route("/v1/auth/login", post(login))
        .route("/v1/auth/password-reset", post(request_password_reset))
        .route("/v1/auth/password-reset/confirm", post(confirm_password_reset))
}

pub fn token_router() -> Router<AppState> {
    Router::new()
        .route("/v1/auth/token", post(token))
        .route("/v1/auth/logout", post(logout))
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct StatusResponse {
    pub status: String,
}

// ──────────────────────────────────────────────
// POST /v1/auth/register
// ──────────────────────────────────────────────

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub display_name: String,
    pub role: Role,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct RegisterResponse {
    pub user_id: Uuid,
    pub email: String,
    pub display_name: String,
    pub role: Role,
    pub tokens: TokenResponse,
}

/// Checks a registration and returns the normalized email and display name.
fn validate_registration(req: &RegisterRequest) -> Result<(String, String), AppError> {
    let email = auth::normalize_email(&req.email);
    if !auth::is_plausible_email(&email) {
        return Err(AppError::Validation {
            message: "email must be a valid address".to_string(),
            field: Some("email".to_string()),
            received: Some(serde_json::Value::String(req.email.clone())),
            docs_hint: None,
        });
    }
    validate_password(&req.password, "password")?;
    let display_name = validate_display_name(&req.display_name)?;
    Ok((email, display_name))
}

fn validate_password(password: &str, field: &str) -> Result<(), AppError> {
    if password.chars().count() < auth::MIN_PASSWORD_LEN {
        return Err(AppError::validation(
            field,
            format!(
                "password must be at least {} characters",
                auth::MIN_PASSWORD_LEN
            ),
        ));
    }
    Ok(())
}

pub(crate) fn validate_display_name(raw: &str) -> Result<String, AppError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(AppError::validation(
            "display_name",
            "display_name must not be empty",
        ));
    }
    if trimmed.chars().count() > MAX_DISPLAY_NAME_CHARS {
        return Err(AppError::validation(
            "display_name",
            format!("display_name must be at most {MAX_DISPLAY_NAME_CHARS} characters"),
        ));
    }
    Ok(trimmed.to_string())
}

#[utoipa::path(
    post,
    path = "/v1/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "User registered and signed in", body = RegisterResponse),
        (status = 400, description = "Validation error", body = edutrack_core::error::ApiError),
        (status = 409, description = "Email already registered", body = edutrack_core::error::ApiError)
    ),
    tag = "auth"
)]
pub async fn register(
    State(state): State<AppState>,
    AppJson(req): AppJson<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    let (email, display_name) = validate_registration(&req)?;
    let password_hash = auth::hash_password(&req.password).map_err(AppError::Internal)?;
    let user_id = Uuid::now_v7();

    let mut tx = state.db.begin().await?;

    sqlx::query(
        "INSERT INTO users (id, email, password_hash, display_name) VALUES ($1, $2, $3, $4)",
    )
    .bind(user_id)
    .bind(&email)
    .bind(&password_hash)
    .bind(&display_name)
    .execute(&mut *tx)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            return AppError::Conflict {
                code: edutrack_core::error::codes::CONFLICT,
                message: "This email is already registered. Please use a different email or sign in."
                    .to_string(),
                docs_hint: Some("POST /v1/auth/login signs in an existing account.".to_string()),
            };
        }
        AppError::Database(e)
    })?;

    sqlx::query(
        "INSERT INTO profiles (user_id, email, display_name, role) VALUES ($1, $2, $3, $4)",
    )
    .bind(user_id)
    .bind(&email)
    .bind(&display_name)
    .bind(req.role.as_str())
    .execute(&mut *tx)
    .await?;

    let tokens = issue_tokens(&mut tx, user_id).await?;
    tx.commit().await?;

    tracing::info!(user_id = %user_id, role = %req.role, "user registered");

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            user_id,
            email,
            display_name,
            role: req.role,
            tokens,
        }),
    ))
}

// ──────────────────────────────────────────────
// POST /v1/auth/login
// ──────────────────────────────────────────────

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    password_hash: String,
}

fn invalid_credentials() -> AppError {
    AppError::Unauthorized {
        message: "Invalid email or password".to_string(),
        docs_hint: Some("POST /v1/auth/password-reset sends a reset link.".to_string()),
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Signed in", body = TokenResponse),
        (status = 401, description = "Invalid credentials", body = edutrack_core::error::ApiError)
    ),
    tag = "auth"
)]
pub async fn login(
    State(state): State<AppState>,
    AppJson(req): AppJson<LoginRequest>,
) -> Result<Json<TokenResponse>, AppError> {
    let email = auth::normalize_email(&req.email);

    let user = sqlx::query_as::<_, UserRow>(
        "SELECT id, password_hash FROM users WHERE email = $1 AND is_active = TRUE",
    )
    .bind(&email)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(invalid_credentials)?;

    let valid = auth::verify_password(&req.password, &user.password_hash)
        .map_err(AppError::Internal)?;
    if !valid {
        tracing::info!(user_id = %user.id, "login rejected");
        return Err(invalid_credentials());
    }

    let mut conn = state.db.acquire().await?;
    let tokens = issue_tokens(&mut conn, user.id).await?;
    tracing::info!(user_id = %user.id, "user signed in");
    Ok(Json(tokens))
}

// ──────────────────────────────────────────────
// POST /v1/auth/token
// ──────────────────────────────────────────────

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct TokenRequest {
    pub refresh_token: String,
}

#[derive(sqlx::FromRow)]
struct RefreshTokenRow {
    id: Uuid,
    user_id: Uuid,
    access_token_id: Uuid,
    expires_at: chrono::DateTime<Utc>,
}

/// Exchange a refresh token for a fresh pair. The old pair is revoked.
#[utoipa::path(
    post,
    path = "/v1/auth/token",
    request_body = TokenRequest,
    responses(
        (status = 200, description = "New token pair", body = TokenResponse),
        (status = 401, description = "Invalid or expired refresh token", body = edutrack_core::error::ApiError)
    ),
    tag = "auth"
)]
pub async fn token(
    State(state): State<AppState>,
    AppJson(req): AppJson<TokenRequest>,
) -> Result<Json<TokenResponse>, AppError> {
    let token_hash = auth::hash_token(&req.refresh_token);
    let mut tx = state.db.begin().await?;

    let rt = sqlx::query_as::<_, RefreshTokenRow>(
        "SELECT id, user_id, access_token_id, expires_at \
         FROM refresh_tokens WHERE token_hash = $1 AND is_revoked = FALSE \
         FOR UPDATE",
    )
    .bind(&token_hash)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| AppError::Unauthorized {
        message: "Invalid refresh token".to_string(),
        docs_hint: Some("The refresh token may have been revoked. Sign in again.".to_string()),
    })?;

    if Utc::now() > rt.expires_at {
        return Err(AppError::Unauthorized {
            message: "Refresh token has expired".to_string(),
            docs_hint: Some("Sign in again to get new tokens.".to_string()),
        });
    }

    sqlx::query("UPDATE access_tokens SET is_revoked = TRUE WHERE id = $1")
        .bind(rt.access_token_id)
        .execute(&mut *tx)
        .await?;

    sqlx::query("UPDATE refresh_tokens SET is_revoked = TRUE WHERE id = $1")
        .bind(rt.id)
        .execute(&mut *tx)
        .await?;

    let tokens = issue_tokens(&mut tx, rt.user_id).await?;
    tx.commit().await?;
    Ok(Json(tokens))
}

// ──────────────────────────────────────────────
// POST /v1/auth/logout
// ──────────────────────────────────────────────

#[utoipa::path(
    post,
    path = "/v1/auth/logout",
    responses(
        (status = 200, description = "Signed out on every device", body = StatusResponse),
        (status = 401, description = "Not signed in", body = edutrack_core::error::ApiError)
    ),
    security(("bearer_auth" = [])),
    tag = "auth"
)]
pub async fn logout(
    user: AuthenticatedUser,
    State(state): State<AppState>,
) -> Result<Json<StatusResponse>, AppError> {
    let mut tx = state.db.begin().await?;
    let revoked = revoke_all_tokens(&mut tx, user.user_id).await?;
    tx.commit().await?;

    let closed = state.chats.close_all_for(user.user_id).await;
    tracing::info!(
        user_id = %user.user_id,
        tokens_revoked = revoked,
        chats_closed = closed,
        "user signed out everywhere"
    );

    Ok(Json(StatusResponse {
        status: "signed_out".to_string(),
    }))
}

// ──────────────────────────────────────────────
// POST /v1/auth/password-reset
// ──────────────────────────────────────────────

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct PasswordResetRequest {
    pub email: String,
}

/// Always answers `202` so the endpoint does not reveal which emails exist.
#[utoipa::path(
    post,
    path = "/v1/auth/password-reset",
    request_body = PasswordResetRequest,
    responses(
        (status = 202, description = "Reset email queued if the account exists", body = StatusResponse),
        (status = 400, description = "Validation error", body = edutrack_core::error::ApiError)
    ),
    tag = "auth"
)]
pub async fn request_password_reset(
    State(state): State<AppState>,
    AppJson(req): AppJson<PasswordResetRequest>,
) -> Result<impl IntoResponse, AppError> {
    let email = auth::normalize_email(&req.email);
    if !auth::is_plausible_email(&email) {
        return Err(AppError::validation("email", "email must be a valid address"));
    }

    let user_id: Option<Uuid> =
        sqlx::query_scalar("SELECT id FROM users WHERE email = $1 AND is_active = TRUE")
            .bind(&email)
            .fetch_optional(&state.db)
            .await?;

    if let Some(user_id) = user_id {
        let (token, token_hash) = auth::generate_password_reset_token();
        let expires_at = Utc::now() + Duration::hours(RESET_TOKEN_TTL_HOURS);

        sqlx::query(
            "INSERT INTO password_reset_tokens (id, user_id, token_hash, expires_at) \
             VALUES ($1, $2, $3, $4)",
        )
        .bind(Uuid::now_v7())
        .bind(user_id)
        .bind(&token_hash)
        .bind(expires_at)
        .execute(&state.db)
        .await?;

        let link = mailer::reset_link(&state.app_url.0, &token)
            .map_err(|e| AppError::Internal(format!("invalid EDUTRACK_APP_URL: {e}")))?;
        let sent = mailer::send_password_reset_email(&email, &link, &expires_at).await;
        tracing::info!(user_id = %user_id, email_sent = sent, "password reset requested");
    } else {
        tracing::debug!("password reset requested for unknown email");
    }

    Ok((
        StatusCode::ACCEPTED,
        Json(StatusResponse {
            status: "accepted".to_string(),
        }),
    ))
}

// ──────────────────────────────────────────────
// POST /v1/auth/password-reset/confirm
// ──────────────────────────────────────────────

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct PasswordResetConfirm {
    pub token: String,
    pub new_password: String,
}

#[derive(sqlx::FromRow)]
struct ResetTokenRow {
    id: Uuid,
    user_id: Uuid,
    expires_at: chrono::DateTime<Utc>,
    used_at: Option<chrono::DateTime<Utc>>,
}

/// Set a new password with a reset token. Every session of the user ends.
#[utoipa::path(
    post,
    path = "/v1/auth/password-reset/confirm",
    request_body = PasswordResetConfirm,
    responses(
        (status = 200, description = "Password changed", body = StatusResponse),
        (status = 400, description = "Invalid token or weak password", body = edutrack_core::error::ApiError)
    ),
    tag = "auth"
)]
pub async fn confirm_password_reset(
    State(state): State<AppState>,
    AppJson(req): AppJson<PasswordResetConfirm>,
) -> Result<Json<StatusResponse>, AppError> {
    validate_password(&req.new_password, "new_password")?;

    let invalid_token = || AppError::Validation {
        message: "Reset token is invalid or has expired".to_string(),
        field: Some("token".to_string()),
        received: None,
        docs_hint: Some("Request a new link via POST /v1/auth/password-reset.".to_string()),
    };

    let token_hash = auth::hash_token(&req.token);
    let mut tx = state.db.begin().await?;

    let row = sqlx::query_as::<_, ResetTokenRow>(
        "SELECT id, user_id, expires_at, used_at FROM password_reset_tokens \
         WHERE token_hash = $1 FOR UPDATE",
    )
    .bind(&token_hash)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(invalid_token)?;

    if row.used_at.is_some() || Utc::now() > row.expires_at {
        return Err(invalid_token());
    }

    let password_hash = auth::hash_password(&req.new_password).map_err(AppError::Internal)?;

    sqlx::query("UPDATE users SET password_hash = $1 WHERE id = $2")
        .bind(&password_hash)
        .bind(row.user_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("UPDATE password_reset_tokens SET used_at = NOW() WHERE id = $1")
        .bind(row.id)
        .execute(&mut *tx)
        .await?;
    revoke_all_tokens(&mut tx, row.user_id).await?;

    tx.commit().await?;

    state.chats.close_all_for(row.user_id).await;
    tracing::info!(user_id = %row.user_id, "password reset completed");

    Ok(Json(StatusResponse {
        status: "password_changed".to_string(),
    }))
}

// ──────────────────────────────────────────────
// Token issuance
// ──────────────────────────────────────────────

/// Revokes every access and refresh token of `user_id`. Returns how many
/// access tokens were still live.
async fn revoke_all_tokens(
    conn: &mut sqlx::PgConnection,
    user_id: Uuid,
) -> Result<u64, sqlx::Error> {
    let revoked = sqlx::query(
        "UPDATE access_tokens SET is_revoked = TRUE WHERE user_id = $1 AND is_revoked = FALSE",
    )
    .bind(user_id)
    .execute(&mut *conn)
    .await?
    .rows_affected();
    sqlx::query("UPDATE refresh_tokens SET is_revoked = TRUE WHERE user_id = $1")
        .bind(user_id)
        .execute(&mut *conn)
        .await?;
    Ok(revoked)
}

async fn issue_tokens(
    conn: &mut sqlx::PgConnection,
    user_id: Uuid,
) -> Result<TokenResponse, AppError> {
    let access_token_id = Uuid::now_v7();
    let (access_token, access_hash) = auth::generate_access_token();
    let access_expires = Utc::now() + Duration::seconds(ACCESS_TOKEN_TTL_SECS);

    sqlx::query(
        "INSERT INTO access_tokens (id, user_id, token_hash, expires_at) VALUES ($1, $2, $3, $4)",
    )
    .bind(access_token_id)
    .bind(user_id)
    .bind(&access_hash)
    .bind(access_expires)
    .execute(&mut *conn)
    .await?;

    let (refresh_token, refresh_hash) = auth::generate_refresh_token();
    let refresh_expires = Utc::now() + Duration::days(REFRESH_TOKEN_TTL_DAYS);

    sqlx::query(
        "INSERT INTO refresh_tokens (id, user_id, token_hash, access_token_id, expires_at) \
         VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(Uuid::now_v7())
    .bind(user_id)
    .bind(&refresh_hash)
    .bind(access_token_id)
    .bind(refresh_expires)
    .execute(&mut *conn)
    .await?;

    Ok(TokenResponse {
        access_token,
        refresh_token,
        token_type: "Bearer".to_string(),
        expires_in: ACCESS_TOKEN_TTL_SECS,
    })
}
