use chrono::{DateTime, Utc};
use edutrack_core::profile::{ProfileStore, ProfileStoreError, Role, UserProfile};
use serde::Deserialize;
use sqlx::PgPool;
use uuid::Uuid;

const PROFILE_COLUMNS: &str =
    "user_id, email, display_name, role, parent_id, school_id, created_at, updated_at";

/// Profile documents in the `profiles` table.
#[derive(Clone)]
pub struct PgProfileStore {
    pool: PgPool,
}

/// Partial update of the caller's own profile. Absent fields stay unchanged.
#[derive(Debug, Default, Deserialize, utoipa::ToSchema)]
#[serde(deny_unknown_fields)]
pub struct ProfileUpdate {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub parent_id: Option<Uuid>,
    #[serde(default)]
    pub school_id: Option<Uuid>,
}

#[derive(sqlx::FromRow)]
struct ProfileRow {
    user_id: Uuid,
    email: String,
    display_name: Option<String>,
    role: Option<String>,
    parent_id: Option<Uuid>,
    school_id: Option<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: Option<DateTime<Utc>>,
}

impl From<ProfileRow> for UserProfile {
    fn from(row: ProfileRow) -> Self {
        let role = row.role.as_deref().and_then(|raw| match raw.parse::<Role>() {
            Ok(role) => Some(role),
            Err(err) => {
                tracing::warn!(user_id = %row.user_id, error = %err, "ignoring stored role");
                None
            }
        });

        UserProfile {
            user_id: row.user_id,
            email: row.email,
            display_name: row.display_name,
            role,
            parent_id: row.parent_id,
            school_id: row.school_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

impl PgProfileStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn fetch(&self, user_id: Uuid) -> Result<Option<UserProfile>, sqlx::Error> {
        let row = sqlx::query_as::<_, ProfileRow>(&format!(
            "SELECT {PROFILE_COLUMNS} FROM profiles WHERE user_id = $1"
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(UserProfile::from))
    }

    /// Apply `update` and stamp `updated_at`. `None` if the profile is gone.
    pub async fn update(
        &self,
        user_id: Uuid,
        update: &ProfileUpdate,
    ) -> Result<Option<UserProfile>, sqlx::Error> {
        let row = sqlx::query_as::<_, ProfileRow>(&format!(
            "UPDATE profiles SET \
               display_name = COALESCE($2, display_name), \
               parent_id = COALESCE($3, parent_id), \
               school_id = COALESCE($4, school_id), \
               updated_at = NOW() \
             WHERE user_id = $1 \
             RETURNING {PROFILE_COLUMNS}"
        ))
        .bind(user_id)
        .bind(update.display_name.as_deref())
        .bind(update.parent_id)
        .bind(update.school_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(UserProfile::from))
    }

    pub async fn students_for_parent(&self, parent_id: Uuid) -> Result<Vec<UserProfile>, sqlx::Error> {
        self.students_where("parent_id", parent_id).await
    }

    pub async fn students_for_school(&self, school_id: Uuid) -> Result<Vec<UserProfile>, sqlx::Error> {
        self.students_where("school_id", school_id).await
    }

    async fn students_where(
        &self,
        link_column: &'static str,
        id: Uuid,
    ) -> Result<Vec<UserProfile>, sqlx::Error> {
        let rows = sqlx::query_as::<_, ProfileRow>(&format!(
            "SELECT {PROFILE_COLUMNS} FROM profiles \
             WHERE {link_column} = $1 AND role = 'student' \
             ORDER BY display_name NULLS LAST, created_at"
        ))
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(UserProfile::from).collect())
    }
}

impl ProfileStore for PgProfileStore {
    async fn get_profile(&self, user_id: Uuid) -> Result<Option<UserProfile>, ProfileStoreError> {
        self.fetch(user_id).await.map_err(ProfileStoreError::backend)
    }
}
