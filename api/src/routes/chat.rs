use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use edutrack_core::assistant::AssistantMode;
use edutrack_core::chat::{ChatError, ChatMessage};
use edutrack_core::error::codes;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::chats::SharedChat;
use crate::error::AppError;
use crate::extract::AppJson;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/chat/sessions", post(start_chat))
        .route("/v1/chat/sessions/{id}", get(get_chat))
}

/// Sending is split out so it can carry its own rate limit.
pub fn send_router() -> Router<AppState> {
    Router::new().route("/v1/chat/sessions/{id}/messages", post(send_message))
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ChatSessionResponse {
    pub id: Uuid,
    pub mode: AssistantMode,
    pub messages: Vec<ChatMessage>,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct SendMessageRequest {
    pub text: String,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct SendMessageResponse {
    pub reply: ChatMessage,
    /// Mode after this turn. Once `degraded`, it stays so for the session.
    pub mode: AssistantMode,
}

async fn owned_chat(state: &AppState, id: Uuid, owner: Uuid) -> Result<SharedChat, AppError> {
    state
        .chats
        .get(id, owner)
        .await
        .ok_or_else(|| AppError::NotFound {
            resource: format!("chat session {id}"),
        })
}

/// Open a chat with the learning assistant. It starts with a greeting.
#[utoipa::path(
    post,
    path = "/v1/chat/sessions",
    responses(
        (status = 201, description = "Chat session opened", body = ChatSessionResponse),
        (status = 401, description = "Not signed in", body = edutrack_core::error::ApiError)
    ),
    security(("bearer_auth" = [])),
    tag = "chat"
)]
pub async fn start_chat(
    user: AuthenticatedUser,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let (id, chat) = state
        .chats
        .open(user.user_id, Arc::clone(&state.assistant))
        .await;
    let chat = chat.lock().await;

    (
        StatusCode::CREATED,
        Json(ChatSessionResponse {
            id,
            mode: chat.mode().clone(),
            messages: chat.messages().to_vec(),
        }),
    )
}

#[utoipa::path(
    get,
    path = "/v1/chat/sessions/{id}",
    params(("id" = Uuid, Path, description = "Chat session id")),
    responses(
        (status = 200, description = "Transcript and assistant mode", body = ChatSessionResponse),
        (status = 404, description = "Unknown chat session", body = edutrack_core::error::ApiError),
        (status = 409, description = "A reply is still being generated", body = edutrack_core::error::ApiError)
    ),
    security(("bearer_auth" = [])),
    tag = "chat"
)]
pub async fn get_chat(
    user: AuthenticatedUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ChatSessionResponse>, AppError> {
    let chat = owned_chat(&state, id, user.user_id).await?;
    let chat = chat.try_lock().map_err(|_| busy())?;

    Ok(Json(ChatSessionResponse {
        id,
        mode: chat.mode().clone(),
        messages: chat.messages().to_vec(),
    }))
}

fn busy() -> AppError {
    AppError::Conflict {
        code: codes::CHAT_BUSY,
        message: "The assistant is still answering the previous message".to_string(),
        docs_hint: Some("Wait for the pending reply before sending another message.".to_string()),
    }
}

/// Send one message and wait for the reply. Assistant failures never fail
/// the request: the reply then comes from the fallback pool and `mode`
/// reports `degraded`.
#[utoipa::path(
    post,
    path = "/v1/chat/sessions/{id}/messages",
    params(("id" = Uuid, Path, description = "Chat session id")),
    request_body = SendMessageRequest,
    responses(
        (status = 200, description = "Assistant reply", body = SendMessageResponse),
        (status = 400, description = "Empty message", body = edutrack_core::error::ApiError),
        (status = 404, description = "Unknown chat session", body = edutrack_core::error::ApiError),
        (status = 409, description = "Previous message still in flight", body = edutrack_core::error::ApiError)
    ),
    security(("bearer_auth" = [])),
    tag = "chat"
)]
pub async fn send_message(
    user: AuthenticatedUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    AppJson(req): AppJson<SendMessageRequest>,
) -> Result<Json<SendMessageResponse>, AppError> {
    let chat = owned_chat(&state, id, user.user_id).await?;
    let mut chat = chat.try_lock().map_err(|_| busy())?;

    let reply = chat.send(&req.text).await.map_err(|err| match err {
        ChatError::EmptyMessage => AppError::Validation {
            message: err.to_string(),
            field: Some("text".to_string()),
            received: Some(serde_json::Value::String(req.text.clone())),
            docs_hint: None,
        },
    })?;

    Ok(Json(SendMessageResponse {
        reply,
        mode: chat.mode().clone(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn busy_is_a_chat_busy_conflict() {
        let err = busy();
        assert_eq!(err.status(), StatusCode::CONFLICT);
        match err {
            AppError::Conflict { code, .. } => assert_eq!(code, codes::CHAT_BUSY),
            other => panic!("unexpected error variant: {other:?}"),
        }
    }

    #[test]
    fn send_response_reports_mode_tag() {
        let response = SendMessageResponse {
            reply: ChatMessage {
                id: Uuid::now_v7(),
                text: "Try factoring first.".to_string(),
                sender: edutrack_core::chat::Sender::Assistant,
                timestamp: chrono::Utc::now(),
            },
            mode: AssistantMode::Live,
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["mode"]["mode"], "live");
        assert_eq!(json["reply"]["sender"], "assistant");
    }
}
