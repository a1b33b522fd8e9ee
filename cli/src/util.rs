use std::io::Write;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Refresh this long before the access token actually expires.
const REFRESH_MARGIN_MINUTES: i64 = 5;

/// Credentials persisted by `edutrack login` / `edutrack register`.
#[derive(Debug, Serialize, Deserialize)]
pub struct StoredCredentials {
    pub api_url: String,
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
}

impl StoredCredentials {
    pub fn from_tokens(api_url: &str, tokens: TokenResponse) -> Self {
        Self {
            api_url: api_url.to_string(),
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            expires_at: Utc::now() + chrono::Duration::seconds(tokens.expires_in),
        }
    }

    pub fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        now + chrono::Duration::minutes(REFRESH_MARGIN_MINUTES) >= self.expires_at
    }
}

pub fn client() -> reqwest::Client {
    reqwest::Client::new()
}

fn print_json(value: &serde_json::Value, to_stderr: bool) {
    let text = serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string());
    if to_stderr {
        eprintln!("{text}");
    } else {
        println!("{text}");
    }
}

/// Print a structured usage error and exit with code 4.
pub fn exit_error(message: &str, docs_hint: Option<&str>) -> ! {
    let mut err = json!({
        "error": "cli_error",
        "message": message
    });
    if let Some(hint) = docs_hint {
        err["docs_hint"] = json!(hint);
    }
    print_json(&err, true);
    std::process::exit(4);
}

pub fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("edutrack")
        .join("config.json")
}

pub fn load_credentials() -> Option<StoredCredentials> {
    let data = std::fs::read_to_string(config_path()).ok()?;
    serde_json::from_str(&data).ok()
}

pub fn save_credentials(creds: &StoredCredentials) -> Result<(), Box<dyn std::error::Error>> {
    let path = config_path();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let data = serde_json::to_string_pretty(creds)?;

    // Tokens grant account access: owner read/write only
    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(&path)?;
    file.write_all(data.as_bytes())?;

    Ok(())
}

/// Remove stored credentials. Returns whether a file was deleted.
pub fn clear_credentials() -> std::io::Result<bool> {
    let path = config_path();
    if !path.exists() {
        return Ok(false);
    }
    std::fs::remove_file(path)?;
    Ok(true)
}

/// Resolve a Bearer token for API requests (priority order):
/// 1. `EDUTRACK_TOKEN` env var
/// 2. stored credentials, refreshed when close to expiry
pub async fn resolve_token(api_url: &str) -> Result<String, Box<dyn std::error::Error>> {
    if let Ok(token) = std::env::var("EDUTRACK_TOKEN") {
        if !token.trim().is_empty() {
            return Ok(token.trim().to_string());
        }
    }

    let Some(creds) = load_credentials() else {
        return Err("No credentials found. Run `edutrack login` or set EDUTRACK_TOKEN.".into());
    };

    if !creds.needs_refresh(Utc::now()) {
        return Ok(creds.access_token);
    }

    tracing::debug!("access token close to expiry, refreshing");
    match refresh_stored_token(api_url, &creds).await {
        Ok(new_creds) => {
            save_credentials(&new_creds)?;
            Ok(new_creds.access_token)
        }
        Err(err) => {
            tracing::warn!(error = %err, "token refresh failed");
            Err("Access token expired and refresh failed. Run `edutrack login` again.".into())
        }
    }
}

/// Token or exit with a usage error.
pub async fn require_token(api_url: &str) -> String {
    match resolve_token(api_url).await {
        Ok(token) => token,
        Err(e) => exit_error(
            &e.to_string(),
            Some("Sign in with `edutrack login --email <email>`."),
        ),
    }
}

async fn refresh_stored_token(
    api_url: &str,
    creds: &StoredCredentials,
) -> Result<StoredCredentials, Box<dyn std::error::Error>> {
    let resp = client()
        .post(format!("{api_url}/v1/auth/token"))
        .json(&json!({ "refresh_token": creds.refresh_token }))
        .send()
        .await?;

    if !resp.status().is_success() {
        let body: serde_json::Value = resp.json().await?;
        return Err(format!("Token refresh failed: {body}").into());
    }

    let tokens: TokenResponse = resp.json().await?;
    Ok(StoredCredentials::from_tokens(&creds.api_url, tokens))
}

/// Exit codes: 0=success (2xx), 1=client error (4xx), 2=server error (5xx).
/// Redirects count as success: they carry a guard decision, not a failure.
pub fn exit_code_for_status(status: u16) -> i32 {
    match status {
        200..=399 => 0,
        400..=499 => 1,
        _ => 2,
    }
}

/// Send a request and return status plus JSON body, without printing.
///
/// Redirects are not followed so guard decisions stay visible; a redirect
/// comes back as `{"redirect": "<location>"}`.
pub async fn send_json(
    api_url: &str,
    method: reqwest::Method,
    path: &str,
    token: Option<&str>,
    body: Option<&serde_json::Value>,
    query: &[(&str, &str)],
) -> Result<(u16, serde_json::Value), String> {
    let mut url = reqwest::Url::parse(&format!("{api_url}{path}"))
        .map_err(|e| format!("Invalid URL: {api_url}{path}: {e}"))?;
    if !query.is_empty() {
        let mut pairs = url.query_pairs_mut();
        for (k, v) in query {
            pairs.append_pair(k, v);
        }
    }

    let http = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .map_err(|e| e.to_string())?;
    let mut req = http.request(method, url);
    if let Some(t) = token {
        req = req.header("Authorization", format!("Bearer {t}"));
    }
    if let Some(b) = body {
        req = req.json(b);
    }

    let resp = req.send().await.map_err(|e| e.to_string())?;
    let status = resp.status();

    if status.is_redirection() {
        let location = resp
            .headers()
            .get(reqwest::header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        return Ok((status.as_u16(), json!({ "redirect": location })));
    }

    let text = resp.text().await.map_err(|e| e.to_string())?;
    let value = if text.trim().is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_str(&text)
            .unwrap_or_else(|e| json!({"raw_error": format!("Failed to parse response as JSON: {e}")}))
    };
    Ok((status.as_u16(), value))
}

/// Execute an API request, print the response, return the exit code.
///
/// Exit codes: 0=success, 1=client error (4xx), 2=server error (5xx),
///             3=connection error, 4=usage error
pub async fn api_request(
    api_url: &str,
    method: reqwest::Method,
    path: &str,
    token: Option<&str>,
    body: Option<serde_json::Value>,
    query: &[(&str, &str)],
) -> i32 {
    match send_json(api_url, method, path, token, body.as_ref(), query).await {
        Ok((status, value)) => {
            let code = exit_code_for_status(status);
            print_json(&value, code != 0);
            code
        }
        Err(e) => {
            let err = json!({
                "error": "connection_error",
                "message": e,
                "docs_hint": "Is the API server running? Check EDUTRACK_API_URL."
            });
            print_json(&err, true);
            3
        }
    }
}

// Unix-specific imports for file permissions
#[cfg(unix)]
use std::os::unix::fs::OpenOptionsExt;

// No-op on non-unix
#[cfg(not(unix))]
trait OpenOptionsExt {
    fn mode(&mut self, _mode: u32) -> &mut Self;
}

#[cfg(not(unix))]
impl OpenOptionsExt for std::fs::OpenOptions {
    fn mode(&mut self, _mode: u32) -> &mut Self {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classes_map_to_exit_codes() {
        assert_eq!(exit_code_for_status(200), 0);
        assert_eq!(exit_code_for_status(201), 0);
        assert_eq!(exit_code_for_status(303), 0);
        assert_eq!(exit_code_for_status(401), 1);
        assert_eq!(exit_code_for_status(409), 1);
        assert_eq!(exit_code_for_status(500), 2);
        assert_eq!(exit_code_for_status(503), 2);
    }

    #[test]
    fn refresh_kicks_in_five_minutes_early() {
        let now = Utc::now();
        let creds = |expires_at| StoredCredentials {
            api_url: "http://localhost:3000".to_string(),
            access_token: "edu_at_x".to_string(),
            refresh_token: "edu_rt_x".to_string(),
            expires_at,
        };
        assert!(!creds(now + chrono::Duration::minutes(30)).needs_refresh(now));
        assert!(creds(now + chrono::Duration::minutes(4)).needs_refresh(now));
        assert!(creds(now - chrono::Duration::minutes(1)).needs_refresh(now));
    }

    #[test]
    fn token_response_becomes_expiring_credentials() {
        let before = Utc::now();
        let creds = StoredCredentials::from_tokens(
            "http://localhost:3000",
            TokenResponse {
                access_token: "edu_at_a".to_string(),
                refresh_token: "edu_rt_b".to_string(),
                expires_in: 3600,
            },
        );
        assert_eq!(creds.access_token, "edu_at_a");
        assert!(creds.expires_at >= before + chrono::Duration::seconds(3600));
    }

    #[test]
    fn config_lives_under_edutrack_dir() {
        let path = config_path();
        assert!(path.ends_with("edutrack/config.json"));
    }
}
