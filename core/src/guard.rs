//! Route guard and page table.

use serde::Serialize;
use utoipa::ToSchema;

use crate::profile::Role;
use crate::session::Session;

pub const HOME_PATH: &str = "/";
pub const LOGIN_PATH: &str = "/auth/login";

/// Outcome of a guard check for one protected view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum GuardDecision {
    /// Session not resolved yet; show a placeholder, decide later.
    Loading,
    Render,
    Redirect {
        #[schema(value_type = String)]
        to: &'static str,
    },
}

/// Decide whether a protected view may render for `session`.
pub fn authorize(session: &Session, required_role: Option<Role>) -> GuardDecision {
    if session.is_loading {
        return GuardDecision::Loading;
    }
    if session.user_id.is_none() {
        return GuardDecision::Redirect { to: LOGIN_PATH };
    }
    match required_role {
        Some(required) if session.role != Some(required) => {
            GuardDecision::Redirect { to: HOME_PATH }
        }
        _ => GuardDecision::Render,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Page {
    Home,
    Contact,
    Login,
    Register,
    Dashboard(Role),
    Analytics,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Public,
    SignedIn,
    Role(Role),
}

impl Page {
    /// Map a client path to a page. Unknown paths have no page and send the
    /// visitor home.
    pub fn resolve(path: &str) -> Option<Page> {
        let path = path.split(['?', '#']).next().unwrap_or_default();
        let trimmed = path.trim_end_matches('/');
        let page = match trimmed {
            "" => Page::Home,
            "/contact" => Page::Contact,
            "/auth/login" => Page::Login,
            "/auth/register" => Page::Register,
            "/analytics" => Page::Analytics,
            other => {
                let role = other.strip_prefix("/dashboard/")?;
                Page::Dashboard(role.parse().ok()?)
            }
        };
        Some(page)
    }

    pub fn path(&self) -> String {
        match self {
            Page::Home => HOME_PATH.to_string(),
            Page::Contact => "/contact".to_string(),
            Page::Login => LOGIN_PATH.to_string(),
            Page::Register => "/auth/register".to_string(),
            Page::Dashboard(role) => format!("/dashboard/{role}"),
            Page::Analytics => "/analytics".to_string(),
        }
    }

    pub fn access(&self) -> Access {
        match self {
            Page::Home | Page::Contact | Page::Login | Page::Register => Access::Public,
            Page::Analytics => Access::SignedIn,
            Page::Dashboard(role) => Access::Role(*role),
        }
    }
}

/// Guard decision for navigating to `path`.
pub fn navigate(session: &Session, path: &str) -> GuardDecision {
    let Some(page) = Page::resolve(path) else {
        return GuardDecision::Redirect { to: HOME_PATH };
    };
    match page.access() {
        Access::Public => GuardDecision::Render,
        Access::SignedIn => authorize(session, None),
        Access::Role(role) => authorize(session, Some(role)),
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    fn signed_in(role: Option<Role>) -> Session {
        Session {
            user_id: Some(Uuid::now_v7()),
            role,
            display_name: None,
            is_loading: false,
        }
    }

    #[test]
    fn loading_session_always_waits() {
        let session = Session::loading();
        assert_eq!(authorize(&session, None), GuardDecision::Loading);
        for role in Role::ALL {
            assert_eq!(authorize(&session, Some(role)), GuardDecision::Loading);
        }
    }

    #[test]
    fn anonymous_session_goes_to_login() {
        let session = Session::anonymous();
        assert_eq!(
            authorize(&session, None),
            GuardDecision::Redirect { to: LOGIN_PATH }
        );
        for role in Role::ALL {
            assert_eq!(
                authorize(&session, Some(role)),
                GuardDecision::Redirect { to: LOGIN_PATH }
            );
        }
    }

    #[test]
    fn role_mismatch_goes_home() {
        let session = signed_in(Some(Role::Student));
        assert_eq!(
            authorize(&session, Some(Role::Parent)),
            GuardDecision::Redirect { to: HOME_PATH }
        );
        assert_eq!(authorize(&session, Some(Role::Student)), GuardDecision::Render);
    }

    #[test]
    fn missing_role_only_passes_role_free_views() {
        let session = signed_in(None);
        assert_eq!(authorize(&session, None), GuardDecision::Render);
        assert_eq!(
            authorize(&session, Some(Role::School)),
            GuardDecision::Redirect { to: HOME_PATH }
        );
    }

    #[test]
    fn pages_resolve_from_paths() {
        assert_eq!(Page::resolve("/"), Some(Page::Home));
        assert_eq!(Page::resolve(""), Some(Page::Home));
        assert_eq!(Page::resolve("/contact/"), Some(Page::Contact));
        assert_eq!(
            Page::resolve("/dashboard/parent?tab=grades"),
            Some(Page::Dashboard(Role::Parent))
        );
        assert_eq!(Page::resolve("/dashboard/teacher"), None);
        assert_eq!(Page::resolve("/nowhere"), None);
        for role in Role::ALL {
            let page = Page::Dashboard(role);
            assert_eq!(Page::resolve(&page.path()), Some(page));
        }
    }

    #[test]
    fn navigate_applies_page_access() {
        let anonymous = Session::anonymous();
        assert_eq!(navigate(&anonymous, "/contact"), GuardDecision::Render);
        assert_eq!(
            navigate(&anonymous, "/analytics"),
            GuardDecision::Redirect { to: LOGIN_PATH }
        );
        assert_eq!(
            navigate(&anonymous, "/missing"),
            GuardDecision::Redirect { to: HOME_PATH }
        );

        let parent = signed_in(Some(Role::Parent));
        assert_eq!(navigate(&parent, "/analytics"), GuardDecision::Render);
        assert_eq!(navigate(&parent, "/dashboard/parent"), GuardDecision::Render);
        assert_eq!(
            navigate(&parent, "/dashboard/school"),
            GuardDecision::Redirect { to: HOME_PATH }
        );
    }
}
