use edutrack_core::profile::Role;

use crate::util::{api_request, resolve_token};

/// Session as the API resolves it. Works without credentials (anonymous).
pub async fn whoami(api_url: &str) -> i32 {
    let token = resolve_token(api_url).await.ok();
    api_request(
        api_url,
        reqwest::Method::GET,
        "/v1/session",
        token.as_deref(),
        None,
        &[],
    )
    .await
}

/// Guard decision for a client route, e.g. `/dashboard/parent`.
pub async fn open(api_url: &str, path: &str) -> i32 {
    let token = resolve_token(api_url).await.ok();
    api_request(
        api_url,
        reqwest::Method::GET,
        "/v1/pages/resolve",
        token.as_deref(),
        None,
        &[("path", path)],
    )
    .await
}

pub fn dashboard_path(role: Option<Role>) -> String {
    match role {
        Some(role) => format!("/v1/dashboard/{role}"),
        None => "/v1/dashboard".to_string(),
    }
}

/// The caller's dashboard, or a specific role's when `role` is given.
pub async fn dashboard(api_url: &str, role: Option<Role>) -> i32 {
    let token = resolve_token(api_url).await.ok();
    api_request(
        api_url,
        reqwest::Method::GET,
        &dashboard_path(role),
        token.as_deref(),
        None,
        &[],
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dashboard_path_picks_role_route() {
        assert_eq!(dashboard_path(None), "/v1/dashboard");
        assert_eq!(dashboard_path(Some(Role::School)), "/v1/dashboard/school");
    }
}
