use std::sync::Arc;

use edutrack_core::assistant::GeminiClient;
use sqlx::PgPool;

use crate::chats::ChatRegistry;

/// Where password-reset links point. Read from `EDUTRACK_APP_URL`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppUrl(pub String);

impl AppUrl {
    pub fn from_env() -> Self {
        let base = std::env::var("EDUTRACK_APP_URL")
            .ok()
            .map(|v| v.trim().trim_end_matches('/').to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| "http://localhost:5173".to_string());
        Self(base)
    }
}

#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub assistant: Arc<GeminiClient>,
    pub chats: ChatRegistry,
    pub app_url: AppUrl,
}
