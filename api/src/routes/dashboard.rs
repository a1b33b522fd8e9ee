use axum::extract::{Path, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::get;
use axum::{Json, Router};
use edutrack_core::guard::{GuardDecision, HOME_PATH, LOGIN_PATH, authorize};
use edutrack_core::profile::{Role, UserProfile};
use serde::Serialize;
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::error::AppError;
use crate::routes::session::resolve_session;
use crate::state::AppState;
use crate::store::PgProfileStore;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/dashboard", get(my_dashboard))
        .route("/v1/dashboard/{role}", get(role_dashboard))
}

/// A student as shown on a parent or school dashboard.
#[derive(Debug, Clone, PartialEq, Serialize, utoipa::ToSchema)]
pub struct StudentSummary {
    pub user_id: Uuid,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl From<UserProfile> for StudentSummary {
    fn from(profile: UserProfile) -> Self {
        Self {
            user_id: profile.user_id,
            email: profile.email,
            display_name: profile.display_name,
        }
    }
}

/// Dashboard content, one variant per role.
#[derive(Debug, Serialize, utoipa::ToSchema)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum DashboardView {
    Student {
        profile: UserProfile,
    },
    Parent {
        profile: UserProfile,
        children: Vec<StudentSummary>,
    },
    School {
        profile: UserProfile,
        students: Vec<StudentSummary>,
    },
}

impl DashboardView {
    pub fn role(&self) -> Role {
        match self {
            DashboardView::Student { .. } => Role::Student,
            DashboardView::Parent { .. } => Role::Parent,
            DashboardView::School { .. } => Role::School,
        }
    }
}

/// Turn a non-render guard outcome into the HTTP answer.
fn guard_response(decision: GuardDecision) -> Option<Response> {
    match decision {
        GuardDecision::Render => None,
        GuardDecision::Redirect { to } => Some(Redirect::to(to).into_response()),
        GuardDecision::Loading => Some(
            (StatusCode::SERVICE_UNAVAILABLE, [(header::RETRY_AFTER, "1")]).into_response(),
        ),
    }
}

/// The one place a role picks its dashboard.
async fn build_dashboard(
    store: &PgProfileStore,
    role: Role,
    profile: UserProfile,
) -> Result<DashboardView, sqlx::Error> {
    let view = match role {
        Role::Student => DashboardView::Student { profile },
        Role::Parent => {
            let children = store.students_for_parent(profile.user_id).await?;
            DashboardView::Parent {
                profile,
                children: children.into_iter().map(StudentSummary::from).collect(),
            }
        }
        Role::School => {
            let students = store.students_for_school(profile.user_id).await?;
            DashboardView::School {
                profile,
                students: students.into_iter().map(StudentSummary::from).collect(),
            }
        }
    };
    Ok(view)
}

async fn render_for(
    state: &AppState,
    user: Option<AuthenticatedUser>,
    required: Option<Role>,
) -> Result<Response, AppError> {
    let session = resolve_session(state, user.as_ref()).await;
    if let Some(response) = guard_response(authorize(&session, required)) {
        return Ok(response);
    }

    let Some(user_id) = session.user_id else {
        return Ok(Redirect::to(LOGIN_PATH).into_response());
    };
    let Some(role) = session.role else {
        return Err(AppError::Forbidden {
            message: "Your profile has no role, so there is no dashboard to show".to_string(),
            docs_hint: Some("GET /v1/profile shows the stored profile.".to_string()),
        });
    };

    let store = PgProfileStore::new(state.db.clone());
    let profile = store.fetch(user_id).await?.ok_or_else(|| AppError::NotFound {
        resource: format!("profile {user_id}"),
    })?;
    let view = build_dashboard(&store, role, profile).await?;
    tracing::debug!(user_id = %user_id, role = %view.role(), "dashboard rendered");
    Ok(Json(view).into_response())
}

/// The caller's own dashboard, chosen by their role.
#[utoipa::path(
    get,
    path = "/v1/dashboard",
    responses(
        (status = 200, description = "Dashboard for the caller's role", body = DashboardView),
        (status = 303, description = "Redirect to the login page"),
        (status = 403, description = "Profile has no role", body = edutrack_core::error::ApiError)
    ),
    security(("bearer_auth" = [])),
    tag = "dashboard"
)]
pub async fn my_dashboard(
    user: Option<AuthenticatedUser>,
    State(state): State<AppState>,
) -> Result<Response, AppError> {
    render_for(&state, user, None).await
}

/// A specific role's dashboard. Callers with another role are sent home.
#[utoipa::path(
    get,
    path = "/v1/dashboard/{role}",
    params(("role" = String, Path, description = "student, parent or school")),
    responses(
        (status = 200, description = "Dashboard for the role", body = DashboardView),
        (status = 303, description = "Redirect to the login page or home")
    ),
    security(("bearer_auth" = [])),
    tag = "dashboard"
)]
pub async fn role_dashboard(
    user: Option<AuthenticatedUser>,
    State(state): State<AppState>,
    Path(role): Path<String>,
) -> Result<Response, AppError> {
    let Ok(required) = role.parse::<Role>() else {
        return Ok(Redirect::to(HOME_PATH).into_response());
    };
    render_for(&state, user, Some(required)).await
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn profile(role: Role) -> UserProfile {
        UserProfile {
            user_id: Uuid::now_v7(),
            email: format!("{role}@example.org"),
            display_name: Some("Someone".to_string()),
            role: Some(role),
            parent_id: None,
            school_id: None,
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    #[test]
    fn redirects_use_see_other_with_location() {
        let response = guard_response(GuardDecision::Redirect { to: LOGIN_PATH }).unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()[header::LOCATION], LOGIN_PATH);
    }

    #[test]
    fn render_has_no_override_and_loading_asks_to_retry() {
        assert!(guard_response(GuardDecision::Render).is_none());

        let response = guard_response(GuardDecision::Loading).unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.headers()[header::RETRY_AFTER], "1");
    }

    #[test]
    fn dashboard_view_is_tagged_by_role() {
        let kid = profile(Role::Student);
        let view = DashboardView::Parent {
            profile: profile(Role::Parent),
            children: vec![StudentSummary::from(kid.clone())],
        };
        assert_eq!(view.role(), Role::Parent);

        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["role"], "parent");
        assert_eq!(json["children"][0]["user_id"], kid.user_id.to_string());
        assert!(json.get("students").is_none());
    }

    async fn db_pool_if_available() -> Option<sqlx::PgPool> {
        let Ok(url) = std::env::var("DATABASE_URL") else {
            return None;
        };

        sqlx::postgres::PgPoolOptions::new()
            .max_connections(1)
            .connect(&url)
            .await
            .ok()
    }

    async fn insert_user(pool: &sqlx::PgPool, role: Role, parent_id: Option<Uuid>) -> Uuid {
        let user_id = Uuid::now_v7();
        let email = format!("{role}-{user_id}@example.org");
        sqlx::query("INSERT INTO users (id, email, password_hash) VALUES ($1, $2, 'x')")
            .bind(user_id)
            .bind(&email)
            .execute(pool)
            .await
            .expect("insert user");
        sqlx::query(
            "INSERT INTO profiles (user_id, email, display_name, role, parent_id) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(user_id)
        .bind(&email)
        .bind(role.as_str())
        .bind(role.as_str())
        .bind(parent_id)
        .execute(pool)
        .await
        .expect("insert profile");
        user_id
    }

    #[tokio::test]
    async fn parent_dashboard_lists_linked_students() {
        let Some(pool) = db_pool_if_available().await else {
            return;
        };

        sqlx::migrate!("../migrations")
            .run(&pool)
            .await
            .expect("migrations should run");

        let parent = insert_user(&pool, Role::Parent, None).await;
        let child = insert_user(&pool, Role::Student, Some(parent)).await;
        insert_user(&pool, Role::Student, None).await;

        let store = PgProfileStore::new(pool.clone());
        let profile = store.fetch(parent).await.unwrap().expect("parent profile");
        let view = build_dashboard(&store, Role::Parent, profile).await.unwrap();

        match view {
            DashboardView::Parent { children, .. } => {
                assert_eq!(children.len(), 1);
                assert_eq!(children[0].user_id, child);
            }
            other => panic!("unexpected dashboard: {other:?}"),
        }
    }

    #[tokio::test]
    async fn every_role_dispatches_to_its_own_view() {
        let Some(pool) = db_pool_if_available().await else {
            return;
        };

        sqlx::migrate!("../migrations")
            .run(&pool)
            .await
            .expect("migrations should run");

        let store = PgProfileStore::new(pool.clone());
        for role in Role::ALL {
            let user_id = insert_user(&pool, role, None).await;
            let profile = store.fetch(user_id).await.unwrap().expect("profile");
            let view = build_dashboard(&store, role, profile).await.unwrap();
            assert_eq!(view.role(), role);
        }
    }
}
