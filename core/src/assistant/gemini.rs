use std::time::Duration;

use serde::Serialize;

use super::{
    Assistant, AssistantError, NOT_CONFIGURED_REPLY, UNEXPECTED_FORMAT_REPLY, build_prompt,
    strip_emphasis,
};

pub const DEFAULT_ENDPOINT: &str =
    "https://generativelanguage.googleapis.com/v1/models/gemini-pro:generateContent";

const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct AssistantConfig {
    pub api_key: Option<String>,
    pub endpoint: String,
    pub timeout: Duration,
}

impl AssistantConfig {
    /// Reads `GEMINI_API_KEY`, `GEMINI_ENDPOINT` and
    /// `EDUTRACK_ASSISTANT_TIMEOUT_SECS`. Blank values count as unset.
    pub fn from_env() -> Self {
        let api_key = non_empty_env("GEMINI_API_KEY");
        let endpoint =
            non_empty_env("GEMINI_ENDPOINT").unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());
        let timeout_secs = non_empty_env("EDUTRACK_ASSISTANT_TIMEOUT_SECS")
            .and_then(|value| value.parse().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        Self {
            api_key,
            endpoint,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[derive(Debug, Serialize)]
struct GenerateContentRequest<'a> {
    contents: [Content<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: [Part<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

/// Client for the Gemini `generateContent` endpoint.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    config: AssistantConfig,
}

impl GeminiClient {
    pub fn new(config: AssistantConfig) -> Result<Self, AssistantError> {
        let http = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &AssistantConfig {
        &self.config
    }
}

impl Assistant for GeminiClient {
    async fn ask(&self, prompt: &str) -> Result<String, AssistantError> {
        let Some(api_key) = self.config.api_key.as_deref() else {
            tracing::error!("assistant API key is not configured");
            return Ok(NOT_CONFIGURED_REPLY.to_string());
        };

        let text = build_prompt(prompt);
        let body = GenerateContentRequest {
            contents: [Content {
                parts: [Part { text: &text }],
            }],
        };

        tracing::debug!(prompt_chars = prompt.chars().count(), "sending assistant request");
        let response = self
            .http
            .post(self.config.endpoint.as_str())
            .query(&[("key", api_key)])
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(status = %status, "assistant endpoint returned non-success status");
            return Err(AssistantError::Status { status });
        }

        let bytes = response.bytes().await?;
        let payload: serde_json::Value =
            serde_json::from_slice(&bytes).map_err(AssistantError::Decode)?;

        match extract_reply(&payload) {
            Some(reply) => Ok(strip_emphasis(reply)),
            None => {
                tracing::warn!("assistant response is missing candidates[0].content.parts[0].text");
                Ok(UNEXPECTED_FORMAT_REPLY.to_string())
            }
        }
    }
}

/// `candidates[0].content.parts[0].text`, if present and non-empty.
fn extract_reply(payload: &serde_json::Value) -> Option<&str> {
    payload
        .pointer("/candidates/0/content/parts/0/text")
        .and_then(serde_json::Value::as_str)
        .filter(|text| !text.is_empty())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use axum::Router;
    use axum::extract::RawQuery;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use axum::routing::post;
    use serde_json::json;

    use super::*;
    use crate::assistant::PREAMBLE;

    #[derive(Clone, Default)]
    struct Recorded {
        hits: Arc<AtomicUsize>,
        last_query: Arc<Mutex<Option<String>>>,
        last_body: Arc<Mutex<Option<String>>>,
    }

    async fn spawn_endpoint(status: StatusCode, body: &'static str) -> (String, Recorded) {
        let recorded = Recorded::default();
        let seen = recorded.clone();
        let app = Router::new().route(
            "/generate",
            post(move |RawQuery(query): RawQuery, request: String| {
                let seen = seen.clone();
                async move {
                    seen.hits.fetch_add(1, Ordering::SeqCst);
                    *seen.last_query.lock().unwrap() = query;
                    *seen.last_body.lock().unwrap() = Some(request);
                    (status, [("content-type", "application/json")], body).into_response()
                }
            }),
        );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        (format!("http://{addr}/generate"), recorded)
    }

    fn client(endpoint: &str, api_key: Option<&str>) -> GeminiClient {
        GeminiClient::new(AssistantConfig {
            api_key: api_key.map(str::to_string),
            endpoint: endpoint.to_string(),
            timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    const DISCRIMINANT_REPLY: &str = r#"{"candidates":[{"content":{"parts":[{"text":"  A quadratic equation has a **discriminant** that tells you *how many* roots exist.\n"}]}}]}"#;

    #[tokio::test]
    async fn missing_key_short_circuits_without_network() {
        let (endpoint, recorded) = spawn_endpoint(StatusCode::OK, DISCRIMINANT_REPLY).await;
        let reply = client(&endpoint, None).ask("What is a quadratic equation?").await.unwrap();
        assert_eq!(reply, NOT_CONFIGURED_REPLY);
        assert_eq!(recorded.hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn success_extracts_and_cleans_reply() {
        let (endpoint, recorded) = spawn_endpoint(StatusCode::OK, DISCRIMINANT_REPLY).await;
        let reply = client(&endpoint, Some("test-key"))
            .ask("What is a quadratic equation?")
            .await
            .unwrap();

        assert_eq!(
            reply,
            "A quadratic equation has a discriminant that tells you how many roots exist."
        );
        assert_eq!(recorded.hits.load(Ordering::SeqCst), 1);
        assert_eq!(recorded.last_query.lock().unwrap().as_deref(), Some("key=test-key"));

        let sent = recorded.last_body.lock().unwrap().clone().unwrap();
        let sent: serde_json::Value = serde_json::from_str(&sent).unwrap();
        let text = sent["contents"][0]["parts"][0]["text"].as_str().unwrap();
        assert!(text.starts_with(PREAMBLE));
        assert!(text.ends_with("What is a quadratic equation?"));
    }

    #[tokio::test]
    async fn missing_reply_path_is_unexpected_format() {
        let (endpoint, _) = spawn_endpoint(StatusCode::OK, r#"{"candidates":[]}"#).await;
        let reply = client(&endpoint, Some("k")).ask("hi").await.unwrap();
        assert_eq!(reply, UNEXPECTED_FORMAT_REPLY);

        let (endpoint, _) =
            spawn_endpoint(StatusCode::OK, r#"{"candidates":[{"content":{"parts":[{"text":""}]}}]}"#)
                .await;
        let reply = client(&endpoint, Some("k")).ask("hi").await.unwrap();
        assert_eq!(reply, UNEXPECTED_FORMAT_REPLY);
    }

    #[tokio::test]
    async fn non_success_status_is_an_error() {
        let (endpoint, recorded) =
            spawn_endpoint(StatusCode::SERVICE_UNAVAILABLE, r#"{"error":"overloaded"}"#).await;
        let err = client(&endpoint, Some("k")).ask("hi").await.unwrap_err();
        assert!(matches!(
            err,
            AssistantError::Status { status } if status == reqwest::StatusCode::SERVICE_UNAVAILABLE
        ));
        assert_eq!(recorded.hits.load(Ordering::SeqCst), 1, "no retry");
    }

    #[tokio::test]
    async fn non_json_body_is_a_decode_error() {
        let (endpoint, _) = spawn_endpoint(StatusCode::OK, "<html>oops</html>").await;
        let err = client(&endpoint, Some("k")).ask("hi").await.unwrap_err();
        assert!(matches!(err, AssistantError::Decode(_)));
    }

    #[tokio::test]
    async fn refused_connection_is_a_transport_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = client(&format!("http://{addr}/generate"), Some("k"))
            .ask("hi")
            .await
            .unwrap_err();
        assert!(matches!(err, AssistantError::Transport(_)));
    }

    #[tokio::test]
    async fn transport_errors_do_not_reveal_the_api_key() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = client(&format!("http://{addr}/generate"), Some("SUPERSECRET123"))
            .ask("hi")
            .await
            .unwrap_err();
        let shown = err.to_string();
        assert!(!shown.contains("SUPERSECRET123"), "key leaked: {shown}");
        assert!(!format!("{err:?}").contains("SUPERSECRET123"));
    }

    #[test]
    fn extract_reply_walks_the_nested_path() {
        let payload = json!({"candidates": [{"content": {"parts": [{"text": "hello"}]}}]});
        assert_eq!(extract_reply(&payload), Some("hello"));
        assert_eq!(extract_reply(&json!({"candidates": [{"content": {}}]})), None);
        assert_eq!(extract_reply(&json!({"candidates": [{"content": {"parts": [{"text": 5}]}}]})), None);
    }
}
