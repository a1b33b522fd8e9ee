use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::assistant::{Assistant, AssistantMode, DegradeReason, fallback_reply, is_soft_failure};

pub const GREETING: &str = "Hi! I'm your learning assistant. How can I help you today?";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Sender {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct ChatMessage {
    pub id: Uuid,
    pub text: String,
    pub sender: Sender,
    pub timestamp: DateTime<Utc>,
}

/// Append-only transcript. Timestamps strictly increase with insertion order.
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    messages: Vec<ChatMessage>,
}

impl Conversation {
    pub fn push(&mut self, sender: Sender, text: impl Into<String>) -> &ChatMessage {
        let now = Utc::now();
        let timestamp = match self.messages.last() {
            Some(last) if now <= last.timestamp => {
                last.timestamp + chrono::Duration::microseconds(1)
            }
            _ => now,
        };

        self.messages.push(ChatMessage {
            id: Uuid::now_v7(),
            text: text.into(),
            sender,
            timestamp,
        });
        &self.messages[self.messages.len() - 1]
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ChatError {
    #[error("message must not be empty")]
    EmptyMessage,
}

/// One chat widget: transcript, assistant handle and fallback latch.
///
/// `send` takes `&mut self`, so a session can never have two turns in flight.
pub struct ChatSession<A> {
    assistant: Arc<A>,
    conversation: Conversation,
    mode: AssistantMode,
}

impl<A: Assistant> ChatSession<A> {
    /// New session opening with the assistant greeting.
    pub fn new(assistant: Arc<A>) -> Self {
        let mut conversation = Conversation::default();
        conversation.push(Sender::Assistant, GREETING);
        Self {
            assistant,
            conversation,
            mode: AssistantMode::Live,
        }
    }

    pub fn mode(&self) -> &AssistantMode {
        &self.mode
    }

    pub fn messages(&self) -> &[ChatMessage] {
        self.conversation.messages()
    }

    /// Run one turn and return the assistant's message.
    ///
    /// Assistant failures never surface here: they trip the latch and the
    /// turn is answered from the canned pool.
    pub async fn send(&mut self, text: &str) -> Result<ChatMessage, ChatError> {
        let prompt = text.trim();
        if prompt.is_empty() {
            return Err(ChatError::EmptyMessage);
        }

        self.conversation.push(Sender::User, prompt);
        let reply = self.reply_to(prompt).await;
        Ok(self.conversation.push(Sender::Assistant, reply).clone())
    }

    async fn reply_to(&mut self, prompt: &str) -> String {
        if !self.mode.is_live() {
            tracing::debug!("assistant degraded, answering from fallback pool");
            return fallback_reply().to_string();
        }

        match self.assistant.ask(prompt).await {
            Ok(reply) if is_soft_failure(&reply) => {
                tracing::warn!("assistant reply reports an upstream error, switching to fallback");
                self.mode.trip(DegradeReason::ErrorReply);
                fallback_reply().to_string()
            }
            Ok(reply) => reply,
            Err(err) => {
                tracing::warn!(error = %err, "assistant call failed, switching to fallback");
                self.mode.trip(DegradeReason::CallFailed);
                fallback_reply().to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::assistant::{
        AssistantConfig, AssistantError, FALLBACK_REPLIES, GeminiClient, NOT_CONFIGURED_REPLY,
    };

    #[derive(Default)]
    struct ScriptedAssistant {
        replies: Mutex<VecDeque<Result<String, AssistantError>>>,
        calls: AtomicUsize,
    }

    impl ScriptedAssistant {
        fn with(replies: Vec<Result<String, AssistantError>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl Assistant for ScriptedAssistant {
        async fn ask(&self, _prompt: &str) -> Result<String, AssistantError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok("scripted".to_string()))
        }
    }

    fn unavailable() -> Result<String, AssistantError> {
        Err(AssistantError::Status {
            status: reqwest::StatusCode::SERVICE_UNAVAILABLE,
        })
    }

    #[tokio::test]
    async fn live_reply_is_appended_after_user_message() {
        let assistant = ScriptedAssistant::with(vec![Ok("Roots solve ax² + bx + c = 0.".into())]);
        let mut chat = ChatSession::new(assistant.clone());

        let reply = chat.send("  What is a quadratic equation?  ").await.unwrap();
        assert_eq!(reply.sender, Sender::Assistant);
        assert_eq!(reply.text, "Roots solve ax² + bx + c = 0.");
        assert!(chat.mode().is_live());

        let messages = chat.messages();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].text, GREETING);
        assert_eq!(messages[1].sender, Sender::User);
        assert_eq!(messages[1].text, "What is a quadratic equation?");
        assert_eq!(assistant.calls(), 1);
    }

    #[tokio::test]
    async fn empty_input_is_rejected_without_side_effects() {
        let assistant = ScriptedAssistant::with(vec![]);
        let mut chat = ChatSession::new(assistant.clone());

        assert_eq!(chat.send("   \n").await.unwrap_err(), ChatError::EmptyMessage);
        assert_eq!(chat.messages().len(), 1);
        assert_eq!(assistant.calls(), 0);
    }

    #[tokio::test]
    async fn call_failure_latches_fallback_for_later_turns() {
        let assistant = ScriptedAssistant::with(vec![unavailable(), Ok("live again".into())]);
        let mut chat = ChatSession::new(assistant.clone());

        let first = chat.send("What is a verb?").await.unwrap();
        assert!(FALLBACK_REPLIES.contains(&first.text.as_str()));
        assert!(matches!(
            chat.mode(),
            AssistantMode::Degraded { reason: DegradeReason::CallFailed, .. }
        ));

        let second = chat.send("Explain fractions").await.unwrap();
        assert!(FALLBACK_REPLIES.contains(&second.text.as_str()));
        assert_eq!(assistant.calls(), 1, "degraded sessions make no further calls");
    }

    #[tokio::test]
    async fn soft_failure_reply_is_replaced_and_latches() {
        let assistant =
            ScriptedAssistant::with(vec![Ok("An error occurred while talking to the model.".into())]);
        let mut chat = ChatSession::new(assistant.clone());

        let reply = chat.send("Hello").await.unwrap();
        assert!(FALLBACK_REPLIES.contains(&reply.text.as_str()));
        assert!(matches!(
            chat.mode(),
            AssistantMode::Degraded { reason: DegradeReason::ErrorReply, .. }
        ));

        chat.send("Anyone there?").await.unwrap();
        assert_eq!(assistant.calls(), 1);
    }

    #[tokio::test]
    async fn timestamps_strictly_increase() {
        let assistant = ScriptedAssistant::with(vec![]);
        let mut chat = ChatSession::new(assistant);
        for question in ["one", "two", "three"] {
            chat.send(question).await.unwrap();
        }
        let messages = chat.messages();
        assert_eq!(messages.len(), 7);
        assert!(messages.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
    }

    #[test]
    fn conversation_bumps_equal_timestamps() {
        let mut conversation = Conversation::default();
        let first = conversation.push(Sender::User, "a").timestamp;
        for _ in 0..100 {
            conversation.push(Sender::Assistant, "b");
        }
        assert!(conversation.messages()[1].timestamp > first);
        assert_eq!(conversation.len(), 101);
        assert!(!conversation.is_empty());
    }

    #[tokio::test]
    async fn unconfigured_client_answers_without_degrading() {
        let client = GeminiClient::new(AssistantConfig {
            api_key: None,
            endpoint: "http://127.0.0.1:9/never".to_string(),
            timeout: Duration::from_secs(1),
        })
        .unwrap();
        let mut chat = ChatSession::new(Arc::new(client));

        let reply = chat.send("Help me with algebra").await.unwrap();
        assert_eq!(reply.text, NOT_CONFIGURED_REPLY);
        assert!(chat.mode().is_live());
    }

    mod end_to_end {
        use std::sync::atomic::{AtomicUsize, Ordering};

        use axum::Router;
        use axum::http::StatusCode;
        use axum::response::IntoResponse;
        use axum::routing::post;

        use super::*;

        async fn spawn_endpoint(status: StatusCode, body: &'static str) -> (String, Arc<AtomicUsize>) {
            let hits = Arc::new(AtomicUsize::new(0));
            let counter = hits.clone();
            let app = Router::new().route(
                "/generate",
                post(move || {
                    let counter = counter.clone();
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        (status, [("content-type", "application/json")], body).into_response()
                    }
                }),
            );
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            tokio::spawn(async move {
                axum::serve(listener, app).await.unwrap();
            });
            (format!("http://{addr}/generate"), hits)
        }

        fn gemini(endpoint: String) -> Arc<GeminiClient> {
            Arc::new(
                GeminiClient::new(AssistantConfig {
                    api_key: Some("test-key".to_string()),
                    endpoint,
                    timeout: Duration::from_secs(5),
                })
                .unwrap(),
            )
        }

        #[tokio::test]
        async fn quadratic_question_gets_clean_reply() {
            let (endpoint, hits) = spawn_endpoint(
                StatusCode::OK,
                r#"{"candidates":[{"content":{"parts":[{"text":"Check the **discriminant** first."}]}}]}"#,
            )
            .await;
            let mut chat = ChatSession::new(gemini(endpoint));

            let reply = chat.send("What is a quadratic equation?").await.unwrap();
            assert_eq!(reply.text, "Check the discriminant first.");
            assert!(!reply.text.contains('*'));
            assert!(chat.mode().is_live());
            assert_eq!(hits.load(Ordering::SeqCst), 1);
        }

        #[tokio::test]
        async fn failing_endpoint_is_called_once_per_session() {
            let (endpoint, hits) =
                spawn_endpoint(StatusCode::INTERNAL_SERVER_ERROR, r#"{"error":"boom"}"#).await;
            let mut chat = ChatSession::new(gemini(endpoint));

            let first = chat.send("What is a quadratic equation?").await.unwrap();
            let second = chat.send("And a linear one?").await.unwrap();

            assert!(FALLBACK_REPLIES.contains(&first.text.as_str()));
            assert!(FALLBACK_REPLIES.contains(&second.text.as_str()));
            assert!(!chat.mode().is_live());
            assert_eq!(hits.load(Ordering::SeqCst), 1);
        }

        #[tokio::test]
        async fn unreachable_endpoint_degrades_the_session() {
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            drop(listener);

            let mut chat = ChatSession::new(gemini(format!("http://{addr}/generate")));
            let reply = chat.send("What is a quadratic equation?").await.unwrap();
            assert!(FALLBACK_REPLIES.contains(&reply.text.as_str()));
            assert!(matches!(
                chat.mode(),
                AssistantMode::Degraded { reason: DegradeReason::CallFailed, .. }
            ));
        }
    }
}
