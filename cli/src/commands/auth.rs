use edutrack_core::profile::Role;
use serde_json::{Value, json};

use crate::util::{
    StoredCredentials, TokenResponse, clear_credentials, config_path, exit_code_for_status,
    load_credentials, save_credentials, send_json,
};

fn print_failure(status: u16, body: &Value) -> i32 {
    eprintln!(
        "{}",
        serde_json::to_string_pretty(body).unwrap_or_else(|_| body.to_string())
    );
    exit_code_for_status(status)
}

fn connection_failure(message: String) -> i32 {
    let err = json!({
        "error": "connection_error",
        "message": message,
        "docs_hint": "Is the API server running? Check EDUTRACK_API_URL."
    });
    eprintln!("{err}");
    3
}

fn store_tokens(api_url: &str, tokens: Value) -> Result<StoredCredentials, String> {
    let tokens: TokenResponse =
        serde_json::from_value(tokens).map_err(|e| format!("Unexpected token response: {e}"))?;
    let creds = StoredCredentials::from_tokens(api_url, tokens);
    save_credentials(&creds).map_err(|e| format!("Failed to save credentials: {e}"))?;
    Ok(creds)
}

fn report_signed_in(status: &str, creds: &StoredCredentials, extra: Option<Value>) -> i32 {
    let mut output = json!({
        "status": status,
        "expires_at": creds.expires_at,
        "config_path": config_path().to_string_lossy()
    });
    if let Some(extra) = extra {
        output["account"] = extra;
    }
    println!(
        "{}",
        serde_json::to_string_pretty(&output).unwrap_or_else(|_| output.to_string())
    );
    0
}

pub async fn register(
    api_url: &str,
    email: &str,
    password: &str,
    display_name: &str,
    role: Role,
) -> i32 {
    let body = json!({
        "email": email,
        "password": password,
        "display_name": display_name,
        "role": role,
    });

    let (status, mut value) = match send_json(
        api_url,
        reqwest::Method::POST,
        "/v1/auth/register",
        None,
        Some(&body),
        &[],
    )
    .await
    {
        Ok(r) => r,
        Err(e) => return connection_failure(e),
    };

    if exit_code_for_status(status) != 0 {
        return print_failure(status, &value);
    }

    let tokens = value
        .as_object_mut()
        .and_then(|obj| obj.remove("tokens"))
        .unwrap_or(Value::Null);
    match store_tokens(api_url, tokens) {
        Ok(creds) => report_signed_in("registered", &creds, Some(value)),
        Err(e) => {
            eprintln!("{}", json!({"error": "cli_error", "message": e}));
            2
        }
    }
}

pub async fn login(api_url: &str, email: &str, password: &str) -> i32 {
    let body = json!({ "email": email, "password": password });

    let (status, value) = match send_json(
        api_url,
        reqwest::Method::POST,
        "/v1/auth/login",
        None,
        Some(&body),
        &[],
    )
    .await
    {
        Ok(r) => r,
        Err(e) => return connection_failure(e),
    };

    if exit_code_for_status(status) != 0 {
        return print_failure(status, &value);
    }

    match store_tokens(api_url, value) {
        Ok(creds) => report_signed_in("authenticated", &creds, None),
        Err(e) => {
            eprintln!("{}", json!({"error": "cli_error", "message": e}));
            2
        }
    }
}

/// Revoke the stored session server-side (best effort) and forget it locally.
pub async fn logout(api_url: &str) -> i32 {
    let revoked = match load_credentials() {
        Some(creds) => matches!(
            send_json(
                api_url,
                reqwest::Method::POST,
                "/v1/auth/logout",
                Some(&creds.access_token),
                None,
                &[],
            )
            .await,
            Ok((200..=299, _))
        ),
        None => false,
    };

    let removed = match clear_credentials() {
        Ok(removed) => removed,
        Err(e) => {
            eprintln!("{}", json!({"error": "cli_error", "message": e.to_string()}));
            return 2;
        }
    };

    let output = json!({
        "status": "logged_out",
        "revoked": revoked,
        "credentials_removed": removed,
        "config_path": config_path().to_string_lossy()
    });
    println!(
        "{}",
        serde_json::to_string_pretty(&output).unwrap_or_else(|_| output.to_string())
    );
    0
}

/// Without a token: request a reset email. With one: set the new password.
pub async fn reset_password(
    api_url: &str,
    email: Option<&str>,
    token: Option<&str>,
    new_password: Option<&str>,
) -> i32 {
    let (path, body) = match (email, token, new_password) {
        (_, Some(token), Some(new_password)) => (
            "/v1/auth/password-reset/confirm",
            json!({ "token": token, "new_password": new_password }),
        ),
        (Some(email), None, _) => ("/v1/auth/password-reset", json!({ "email": email })),
        _ => crate::util::exit_error(
            "Pass --email to request a reset link, or --token with --new-password to confirm it",
            Some("edutrack reset-password --email you@example.org"),
        ),
    };

    crate::util::api_request(api_url, reqwest::Method::POST, path, None, Some(body), &[]).await
}
