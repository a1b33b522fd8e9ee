use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use axum::extract::{FromRequestParts, OptionalFromRequestParts, Request};
use axum::http::HeaderMap;
use axum::http::request::Parts;
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use edutrack_core::auth::ACCESS_TOKEN_PREFIX;
use edutrack_core::session::AuthUser;
use tower::{Layer, Service, ServiceExt};
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

/// Signed-in caller, resolved from `Authorization: Bearer edu_at_...`.
///
/// `InjectAuthLayer` validates the token once per request and stores the
/// result in the request extensions; extractors read it from there and only
/// fall back to the database when the layer did not run.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
    pub token_id: Uuid,
    pub display_name: Option<String>,
}

impl AuthenticatedUser {
    /// What the auth provider reports about this caller.
    pub fn auth_user(&self) -> AuthUser {
        AuthUser {
            user_id: self.user_id,
            display_name: self.display_name.clone(),
        }
    }
}

// --- Tower Layer/Service for auth injection ---

/// Injects `AuthenticatedUser` into request extensions. Requests without a
/// valid token pass through untouched.
#[derive(Clone)]
pub struct InjectAuthLayer {
    pool: sqlx::PgPool,
}

impl InjectAuthLayer {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

impl<S> Layer<S> for InjectAuthLayer {
    type Service = InjectAuthService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        InjectAuthService {
            inner,
            pool: self.pool.clone(),
        }
    }
}

#[derive(Clone)]
pub struct InjectAuthService<S> {
    inner: S,
    pool: sqlx::PgPool,
}

impl<S> Service<Request> for InjectAuthService<S>
where
    S: Service<Request, Response = Response, Error = Infallible> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Response, Infallible>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request) -> Self::Future {
        let not_ready = self.inner.clone();
        let ready = std::mem::replace(&mut self.inner, not_ready);
        let pool = self.pool.clone();

        // Body is not Send-safe, so pull the token out before going async
        let token = bearer_token(req.headers()).map(str::to_owned);

        Box::pin(async move {
            if let Some(token) = token {
                match authenticate_access_token(&token, &pool).await {
                    Ok(user) => {
                        req.extensions_mut().insert(user);
                    }
                    Err(err) => {
                        tracing::debug!(error = ?err, "bearer token rejected");
                    }
                }
            }
            Ok(ready.oneshot(req).await.into_response())
        })
    }
}

/// Token from an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get("authorization")?.to_str().ok()?;
    value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

// --- Extractors (used by handlers) ---

impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<AuthenticatedUser>() {
            return Ok(user.clone());
        }

        let token = bearer_token(&parts.headers).ok_or_else(|| AppError::Unauthorized {
            message: "Missing or malformed Authorization header".to_string(),
            docs_hint: Some(
                "Sign in via POST /v1/auth/login and send 'Authorization: Bearer <access_token>'."
                    .to_string(),
            ),
        })?;

        authenticate_access_token(token, &state.db).await
    }
}

/// Anonymous callers resolve to `None` instead of a 401.
impl OptionalFromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &AppState,
    ) -> Result<Option<Self>, Self::Rejection> {
        Ok(parts.extensions.get::<AuthenticatedUser>().cloned())
    }
}

async fn authenticate_access_token(
    token: &str,
    pool: &sqlx::PgPool,
) -> Result<AuthenticatedUser, AppError> {
    if !token.starts_with(ACCESS_TOKEN_PREFIX) {
        return Err(AppError::Unauthorized {
            message: "Invalid token format".to_string(),
            docs_hint: Some(format!(
                "Access tokens start with '{ACCESS_TOKEN_PREFIX}'."
            )),
        });
    }

    let token_hash = edutrack_core::auth::hash_token(token);

    let row = sqlx::query_as::<_, AccessTokenRow>(
        "SELECT t.id, t.user_id, t.expires_at, u.display_name \
         FROM access_tokens t \
         JOIN users u ON u.id = t.user_id \
         WHERE t.token_hash = $1 \
           AND t.is_revoked = FALSE \
           AND u.is_active = TRUE",
    )
    .bind(&token_hash)
    .fetch_optional(pool)
    .await
    .map_err(AppError::Database)?
    .ok_or_else(|| AppError::Unauthorized {
        message: "Invalid access token".to_string(),
        docs_hint: Some(
            "The token may have been revoked by a sign-out. Sign in again.".to_string(),
        ),
    })?;

    if Utc::now() > row.expires_at {
        return Err(AppError::Unauthorized {
            message: "Access token has expired".to_string(),
            docs_hint: Some(
                "Use your refresh token to obtain a new access token via POST /v1/auth/token."
                    .to_string(),
            ),
        });
    }

    Ok(AuthenticatedUser {
        user_id: row.user_id,
        token_id: row.id,
        display_name: row.display_name,
    })
}

#[derive(sqlx::FromRow)]
struct AccessTokenRow {
    id: Uuid,
    user_id: Uuid,
    expires_at: chrono::DateTime<Utc>,
    display_name: Option<String>,
}

#[cfg(test)]
mod tests {
    use axum::http::{HeaderMap, HeaderValue};

    use super::*;

    fn headers(value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static(value));
        headers
    }

    #[test]
    fn bearer_token_requires_scheme_and_value() {
        assert_eq!(bearer_token(&headers("Bearer edu_at_abc")), Some("edu_at_abc"));
        assert_eq!(bearer_token(&headers("Basic dXNlcjpwdw==")), None);
        assert_eq!(bearer_token(&headers("Bearer   ")), None);
        assert_eq!(bearer_token(&HeaderMap::new()), None);
    }

    #[test]
    fn auth_user_carries_provider_display_name() {
        let user = AuthenticatedUser {
            user_id: Uuid::now_v7(),
            token_id: Uuid::now_v7(),
            display_name: Some("Anna".to_string()),
        };
        let auth = user.auth_user();
        assert_eq!(auth.user_id, user.user_id);
        assert_eq!(auth.display_name.as_deref(), Some("Anna"));
    }
}
