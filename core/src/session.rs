//! Session/role resolution.
//!
//! A [`SessionResolver`] owns the single source of truth for who is signed in
//! and which role they have. Auth events come in, the profile document is
//! looked up, and the resulting [`Session`] is published on a `watch`
//! channel so every consumer sees each transition.

use serde::Serialize;
use tokio::sync::{Mutex, watch};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::profile::{ProfileStore, Role};

/// Identity handed over by the auth provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    SignedIn(AuthUser),
    SignedOut,
}

impl From<Option<AuthUser>> for AuthEvent {
    fn from(user: Option<AuthUser>) -> Self {
        match user {
            Some(user) => AuthEvent::SignedIn(user),
            None => AuthEvent::SignedOut,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct Session {
    pub user_id: Option<Uuid>,
    pub role: Option<Role>,
    pub display_name: Option<String>,
    pub is_loading: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Uninitialized,
    Authenticated,
    Anonymous,
}

impl Session {
    /// State before the first auth event arrives.
    pub fn loading() -> Self {
        Self {
            user_id: None,
            role: None,
            display_name: None,
            is_loading: true,
        }
    }

    pub fn anonymous() -> Self {
        Self {
            is_loading: false,
            ..Self::loading()
        }
    }

    pub fn phase(&self) -> SessionPhase {
        match (self.is_loading, self.user_id) {
            (true, _) => SessionPhase::Uninitialized,
            (false, Some(_)) => SessionPhase::Authenticated,
            (false, None) => SessionPhase::Anonymous,
        }
    }
}

pub struct SessionResolver<P> {
    store: P,
    tx: watch::Sender<Session>,
    // applies events one at a time, in arrival order
    events: Mutex<()>,
}

impl<P: ProfileStore> SessionResolver<P> {
    pub fn new(store: P) -> Self {
        let (tx, _rx) = watch::channel(Session::loading());
        Self {
            store,
            tx,
            events: Mutex::new(()),
        }
    }

    /// Snapshot of the current session.
    pub fn current(&self) -> Session {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.tx.subscribe()
    }

    /// Back to the loading state, as if the resolver had just started.
    pub fn reinitialize(&self) {
        self.tx.send_replace(Session::loading());
    }

    /// Re-evaluate the session for an auth state change.
    ///
    /// Never fails: a profile lookup error only leaves role and display name
    /// unset while the identity stays populated.
    pub async fn on_session_change(&self, event: AuthEvent) -> Session {
        let _guard = self.events.lock().await;

        let session = match event {
            AuthEvent::SignedIn(user) => self.resolve_signed_in(user).await,
            AuthEvent::SignedOut => {
                tracing::debug!("auth state changed: signed out");
                Session::anonymous()
            }
        };

        self.tx.send_replace(session.clone());
        session
    }

    async fn resolve_signed_in(&self, user: AuthUser) -> Session {
        tracing::debug!(user_id = %user.user_id, "auth state changed: signed in");

        let auth_name = user.display_name.filter(|name| !name.trim().is_empty());
        let (role, display_name) = match self.store.get_profile(user.user_id).await {
            Ok(Some(profile)) => (profile.role, auth_name.or(profile.display_name)),
            Ok(None) => (None, auth_name),
            Err(err) => {
                tracing::warn!(
                    user_id = %user.user_id,
                    error = %err,
                    "profile lookup failed, continuing without role"
                );
                (None, None)
            }
        };

        Session {
            user_id: Some(user.user_id),
            role,
            display_name,
            is_loading: false,
        }
    }
}
