use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use edutrack_core::profile::{Role, UserProfile};
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::error::AppError;
use crate::extract::AppJson;
use crate::routes::auth::validate_display_name;
use crate::state::AppState;
use crate::store::{PgProfileStore, ProfileUpdate};

pub fn router() -> Router<AppState> {
    Router::new().route("/v1/profile", get(get_profile).patch(update_profile))
}

#[utoipa::path(
    get,
    path = "/v1/profile",
    responses(
        (status = 200, description = "The caller's profile", body = UserProfile),
        (status = 401, description = "Not signed in", body = edutrack_core::error::ApiError),
        (status = 404, description = "No profile document", body = edutrack_core::error::ApiError)
    ),
    security(("bearer_auth" = [])),
    tag = "profile"
)]
pub async fn get_profile(
    user: AuthenticatedUser,
    State(state): State<AppState>,
) -> Result<Json<UserProfile>, AppError> {
    let profile = PgProfileStore::new(state.db.clone())
        .fetch(user.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound {
            resource: format!("profile {}", user.user_id),
        })?;
    Ok(Json(profile))
}

/// Ensure a link target exists and has the expected role.
async fn check_link(
    store: &PgProfileStore,
    field: &str,
    target: Uuid,
    expected: Role,
) -> Result<(), AppError> {
    let role = store.fetch(target).await?.and_then(|p| p.role);
    if role != Some(expected) {
        return Err(AppError::Validation {
            message: format!("{field} must reference a {expected} account"),
            field: Some(field.to_string()),
            received: Some(serde_json::Value::String(target.to_string())),
            docs_hint: None,
        });
    }
    Ok(())
}

/// Update display name and parent/school links. Role is fixed at registration.
#[utoipa::path(
    patch,
    path = "/v1/profile",
    request_body = ProfileUpdate,
    responses(
        (status = 200, description = "Updated profile", body = UserProfile),
        (status = 400, description = "Validation error", body = edutrack_core::error::ApiError),
        (status = 401, description = "Not signed in", body = edutrack_core::error::ApiError)
    ),
    security(("bearer_auth" = [])),
    tag = "profile"
)]
pub async fn update_profile(
    user: AuthenticatedUser,
    State(state): State<AppState>,
    AppJson(mut update): AppJson<ProfileUpdate>,
) -> Result<Json<UserProfile>, AppError> {
    if let Some(name) = update.display_name.as_deref() {
        update.display_name = Some(validate_display_name(name)?);
    }

    let store = PgProfileStore::new(state.db.clone());
    if let Some(parent_id) = update.parent_id {
        check_link(&store, "parent_id", parent_id, Role::Parent).await?;
    }
    if let Some(school_id) = update.school_id {
        check_link(&store, "school_id", school_id, Role::School).await?;
    }

    let profile = store
        .update(user.user_id, &update)
        .await?
        .ok_or_else(|| AppError::NotFound {
            resource: format!("profile {}", user.user_id),
        })?;

    tracing::info!(user_id = %user.user_id, "profile updated");
    Ok(Json(profile))
}
