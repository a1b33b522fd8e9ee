use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use serde::Serialize;
use utoipa::ToSchema;

/// Canned replies used once the assistant has degraded.
pub const FALLBACK_REPLIES: [&str; 5] = [
    "I understand your question. Unfortunately I can't reach my knowledge service right now, but I can help you later!",
    "Interesting question! I'd like to answer, but I'm having temporary server trouble. Please try again later.",
    "Thanks for your question. I'm working offline for the moment, but I'll be back soon!",
    "I've noted your question. Right now I can't give a full answer because of technical problems.",
    "I appreciate your curiosity! I'm running in a limited mode at the moment, but all features will be back soon.",
];

/// Uniformly random member of [`FALLBACK_REPLIES`].
pub fn fallback_reply() -> &'static str {
    FALLBACK_REPLIES
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(FALLBACK_REPLIES[0])
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DegradeReason {
    /// The call itself failed (transport, status, decode).
    CallFailed,
    /// The call succeeded but the reply text reports an upstream error.
    ErrorReply,
}

/// Whether a chat session still talks to the live assistant.
///
/// `Live -> Degraded` happens at most once and is terminal for the session.
/// There is no timer and no probe back to `Live`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, ToSchema)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum AssistantMode {
    #[default]
    Live,
    Degraded {
        since: DateTime<Utc>,
        reason: DegradeReason,
    },
}

impl AssistantMode {
    pub fn is_live(&self) -> bool {
        matches!(self, AssistantMode::Live)
    }

    /// Latch into `Degraded`. Returns `true` only on the transition itself.
    pub fn trip(&mut self, reason: DegradeReason) -> bool {
        if !self.is_live() {
            return false;
        }
        *self = AssistantMode::Degraded {
            since: Utc::now(),
            reason,
        };
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_reply_comes_from_pool() {
        for _ in 0..50 {
            assert!(FALLBACK_REPLIES.contains(&fallback_reply()));
        }
    }

    #[test]
    fn trip_is_one_shot_and_keeps_first_reason() {
        let mut mode = AssistantMode::default();
        assert!(mode.is_live());

        assert!(mode.trip(DegradeReason::ErrorReply));
        assert!(!mode.is_live());
        assert!(!mode.trip(DegradeReason::CallFailed));

        match mode {
            AssistantMode::Degraded { reason, .. } => assert_eq!(reason, DegradeReason::ErrorReply),
            AssistantMode::Live => panic!("mode must stay degraded"),
        }
    }

    #[test]
    fn mode_serializes_with_tag() {
        let live = serde_json::to_value(AssistantMode::Live).unwrap();
        assert_eq!(live["mode"], "live");

        let mut mode = AssistantMode::Live;
        mode.trip(DegradeReason::CallFailed);
        let degraded = serde_json::to_value(&mode).unwrap();
        assert_eq!(degraded["mode"], "degraded");
        assert_eq!(degraded["reason"], "call_failed");
    }
}
