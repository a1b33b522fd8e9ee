use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use edutrack_core::guard::{GuardDecision, navigate};
use edutrack_core::session::{AuthEvent, Session, SessionPhase, SessionResolver};
use serde::{Deserialize, Serialize};

use crate::auth::AuthenticatedUser;
use crate::state::AppState;
use crate::store::PgProfileStore;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/session", get(get_session))
        .route("/v1/pages/resolve", get(resolve_page))
}

/// Resolve the caller's session the way a client would after an auth
/// state change: anonymous callers sign out, known callers get their
/// profile joined in.
pub async fn resolve_session(state: &AppState, user: Option<&AuthenticatedUser>) -> Session {
    let resolver = SessionResolver::new(PgProfileStore::new(state.db.clone()));
    let event = AuthEvent::from(user.map(AuthenticatedUser::auth_user));
    resolver.on_session_change(event).await
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct SessionResponse {
    pub session: Session,
    pub phase: SessionPhase,
}

#[utoipa::path(
    get,
    path = "/v1/session",
    responses(
        (status = 200, description = "Resolved session; anonymous without a valid token", body = SessionResponse)
    ),
    tag = "session"
)]
pub async fn get_session(
    user: Option<AuthenticatedUser>,
    State(state): State<AppState>,
) -> Json<SessionResponse> {
    let session = resolve_session(&state, user.as_ref()).await;
    let phase = session.phase();
    Json(SessionResponse { session, phase })
}

#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct ResolvePageQuery {
    /// Client route, e.g. `/dashboard/student`.
    pub path: String,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct PageDecisionResponse {
    pub path: String,
    #[serde(flatten)]
    pub decision: GuardDecision,
}

/// What the client router should do with `path` for the calling session.
#[utoipa::path(
    get,
    path = "/v1/pages/resolve",
    params(ResolvePageQuery),
    responses(
        (status = 200, description = "Guard decision for the path", body = PageDecisionResponse)
    ),
    tag = "session"
)]
pub async fn resolve_page(
    user: Option<AuthenticatedUser>,
    State(state): State<AppState>,
    Query(query): Query<ResolvePageQuery>,
) -> Json<PageDecisionResponse> {
    let session = resolve_session(&state, user.as_ref()).await;
    let decision = navigate(&session, &query.path);
    tracing::debug!(path = %query.path, ?decision, "page resolved");
    Json(PageDecisionResponse {
        path: query.path,
        decision,
    })
}
