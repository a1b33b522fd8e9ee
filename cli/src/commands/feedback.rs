use serde_json::json;

use crate::util::{api_request, resolve_token};

/// Send a contact-page message. Signed-in users are linked to it.
pub async fn run(api_url: &str, email: &str, subject: &str, message: &str) -> i32 {
    let token = resolve_token(api_url).await.ok();
    api_request(
        api_url,
        reqwest::Method::POST,
        "/v1/feedback",
        token.as_deref(),
        Some(json!({
            "email": email,
            "subject": subject,
            "message": message
        })),
        &[],
    )
    .await
}
