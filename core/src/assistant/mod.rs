//! Learning assistant: prompt construction, the Gemini client, reply cleanup
//! and the fallback latch used by chat sessions.

mod fallback;
mod gemini;
mod markdown;

use std::future::Future;

pub use fallback::{AssistantMode, DegradeReason, FALLBACK_REPLIES, fallback_reply};
pub use gemini::{AssistantConfig, DEFAULT_ENDPOINT, GeminiClient};
pub use markdown::strip_emphasis;

/// Returned without any network call when no API key is configured.
pub const NOT_CONFIGURED_REPLY: &str =
    "The assistant API key is not configured. Please check the configuration.";

/// Returned when the endpoint answers 2xx but the reply text is not where it should be.
pub const UNEXPECTED_FORMAT_REPLY: &str =
    "Sorry, the assistant returned a response in an unexpected format.";

/// Instructions sent ahead of every user question.
pub const PREAMBLE: &str = "\
You are the EduTrack learning assistant. Your job is to help students with their study questions.
Follow these principles:
1. Give clear and accurate answers about school subjects.
2. For school students, simplify complex concepts and use understandable examples.
3. Help with homework, but do not solve it completely; guide the student toward the solution.
4. Take age into account: use simple language for younger students.
5. If you do not know the answer, say so honestly.
6. Keep answers short and to the point, no more than 2-3 paragraphs.
7. Support Russian and English; answer in the language the question was asked in.
8. Motivate students to explore the subject more deeply.";

/// Phrases that mean the upstream model itself failed to answer.
const ERROR_MARKERS: [&str; 4] = [
    "произошла ошибка",
    "не удалось получить",
    "an error occurred",
    "could not retrieve",
];

#[derive(Debug, thiserror::Error)]
pub enum AssistantError {
    #[error("assistant endpoint returned {status}")]
    Status { status: reqwest::StatusCode },
    #[error("assistant request failed: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("assistant response is not valid JSON: {0}")]
    Decode(#[source] serde_json::Error),
}

// The request URL carries the API key as a query parameter.
impl From<reqwest::Error> for AssistantError {
    fn from(err: reqwest::Error) -> Self {
        AssistantError::Transport(err.without_url())
    }
}

/// Something that turns a user question into a reply.
pub trait Assistant: Send + Sync {
    /// One attempt, no retry. `prompt` is already trimmed and non-empty.
    fn ask(&self, prompt: &str) -> impl Future<Output = Result<String, AssistantError>> + Send;
}

/// Full text sent upstream for one question.
pub fn build_prompt(question: &str) -> String {
    format!("{PREAMBLE}\n\nStudent question: {question}")
}

/// Heuristic check for a well-formed reply that reports an upstream failure.
pub fn is_soft_failure(reply: &str) -> bool {
    let lowered = reply.to_lowercase();
    ERROR_MARKERS.iter().any(|marker| lowered.contains(marker))
}
