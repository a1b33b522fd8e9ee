use std::collections::HashMap;
use std::sync::Arc;

use edutrack_core::assistant::{Assistant, GeminiClient};
use edutrack_core::chat::ChatSession;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

/// Open chats one user may hold. Opening another drops their oldest.
pub const MAX_CHATS_PER_OWNER: usize = 8;

/// One open chat. The mutex is held for a whole send/reply turn.
pub type SharedChat<A = GeminiClient> = Arc<Mutex<ChatSession<A>>>;

struct ChatEntry<A> {
    owner: Uuid,
    opened: u64,
    chat: SharedChat<A>,
}

struct Sessions<A> {
    next_seq: u64,
    entries: HashMap<Uuid, ChatEntry<A>>,
}

/// In-memory chat sessions, keyed by id and scoped to their owner.
///
/// The fallback latch is per session, so a fresh session is the way back to
/// live replies. Each owner keeps at most [`MAX_CHATS_PER_OWNER`] sessions.
pub struct ChatRegistry<A = GeminiClient> {
    sessions: Arc<RwLock<Sessions<A>>>,
}

impl<A> Clone for ChatRegistry<A> {
    fn clone(&self) -> Self {
        Self {
            sessions: Arc::clone(&self.sessions),
        }
    }
}

impl<A> Default for ChatRegistry<A> {
    fn default() -> Self {
        Self {
            sessions: Arc::new(RwLock::new(Sessions {
                next_seq: 0,
                entries: HashMap::new(),
            })),
        }
    }
}

impl<A: Assistant> ChatRegistry<A> {
    pub async fn open(&self, owner: Uuid, assistant: Arc<A>) -> (Uuid, SharedChat<A>) {
        let id = Uuid::now_v7();
        let chat = Arc::new(Mutex::new(ChatSession::new(assistant)));

        let mut sessions = self.sessions.write().await;
        let mut owned: Vec<(u64, Uuid)> = sessions
            .entries
            .iter()
            .filter(|(_, entry)| entry.owner == owner)
            .map(|(id, entry)| (entry.opened, *id))
            .collect();
        if owned.len() >= MAX_CHATS_PER_OWNER {
            owned.sort_unstable();
            let excess = owned.len() + 1 - MAX_CHATS_PER_OWNER;
            for (_, evicted) in owned.into_iter().take(excess) {
                sessions.entries.remove(&evicted);
                tracing::debug!(chat_id = %evicted, user_id = %owner, "oldest chat session evicted");
            }
        }

        let opened = sessions.next_seq;
        sessions.next_seq += 1;
        sessions.entries.insert(
            id,
            ChatEntry {
                owner,
                opened,
                chat: Arc::clone(&chat),
            },
        );
        tracing::debug!(chat_id = %id, user_id = %owner, "chat session opened");
        (id, chat)
    }

    /// `None` when the session does not exist or belongs to someone else.
    pub async fn get(&self, id: Uuid, owner: Uuid) -> Option<SharedChat<A>> {
        let sessions = self.sessions.read().await;
        sessions
            .entries
            .get(&id)
            .filter(|entry| entry.owner == owner)
            .map(|entry| Arc::clone(&entry.chat))
    }

    /// Drops every session owned by `owner`. Returns how many were closed.
    pub async fn close_all_for(&self, owner: Uuid) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.entries.len();
        sessions.entries.retain(|_, entry| entry.owner != owner);
        before - sessions.entries.len()
    }
}
