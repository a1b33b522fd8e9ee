use chrono::{DateTime, Utc};

const RESEND_ENDPOINT: &str = "https://api.resend.com/emails";

/// Link the reset email points at: `<app>/auth/reset-password?token=...`.
pub fn reset_link(app_url: &str, token: &str) -> Result<String, url::ParseError> {
    let mut url = url::Url::parse(app_url)?.join("/auth/reset-password")?;
    url.query_pairs_mut().append_pair("token", token);
    Ok(url.to_string())
}

/// Send the password-reset email through Resend.
///
/// Returns whether the mail was handed off. Missing `RESEND_API_KEY` skips
/// delivery with a warning so local setups keep working.
pub async fn send_password_reset_email(
    to_email: &str,
    reset_url: &str,
    expires_at: &DateTime<Utc>,
) -> bool {
    let api_key = match std::env::var("RESEND_API_KEY") {
        Ok(k) if !k.trim().is_empty() => k,
        _ => {
            tracing::warn!(to = %to_email, "RESEND_API_KEY not set, skipping password reset email");
            return false;
        }
    };

    let from = std::env::var("EMAIL_FROM")
        .unwrap_or_else(|_| "EduTrack <noreply@edutrack.app>".to_string());
    let expires_formatted = expires_at.format("%Y-%m-%d %H:%M UTC").to_string();

    let body = format!(
        "Hello,\n\n\
         someone asked to reset the password of your EduTrack account.\n\n\
         Choose a new password here: {reset_url}\n\n\
         The link can be used once and is valid until {expires_formatted}.\n\n\
         If this was not you, ignore this email. Your password stays unchanged.\n\n\
         -- EduTrack"
    );

    let result = reqwest::Client::new()
        .post(RESEND_ENDPOINT)
        .header("Authorization", format!("Bearer {api_key}"))
        .json(&serde_json::json!({
            "from": from,
            "to": [to_email],
            "subject": "Reset your EduTrack password",
            "text": body
        }))
        .send()
        .await;

    match result {
        Ok(resp) if resp.status().is_success() => {
            tracing::info!(to = %to_email, "password reset email sent");
            true
        }
        Ok(resp) => {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            tracing::error!(to = %to_email, %status, body = %body, "password reset email rejected");
            false
        }
        Err(e) => {
            tracing::error!(to = %to_email, error = %e, "password reset email failed");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::reset_link;

    #[test]
    fn reset_link_encodes_token_under_app_url() {
        let link = reset_link("https://edutrack.example", "edu_rst_abc+/=").unwrap();
        assert_eq!(
            link,
            "https://edutrack.example/auth/reset-password?token=edu_rst_abc%2B%2F%3D"
        );
    }

    #[test]
    fn reset_link_rejects_relative_base() {
        assert!(reset_link("edutrack.example", "t").is_err());
    }
}
