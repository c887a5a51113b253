//! Per-user conversation history.
//!
//! Each user owns one transcript. The system prompt always sits at index 0
//! and is pinned: trimming to the history bound only ever removes the oldest
//! non-system messages. The bound counts the non-system tail, so a bound of
//! ten keeps at most eleven messages in total.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::llm_client::{ChatMessage, Role};

/// Keep the system prompt plus the newest `max_history` messages.
pub fn push_bounded(history: &mut Vec<ChatMessage>, message: ChatMessage, max_history: usize) {
    history.push(message);

    let pinned = usize::from(matches!(history.first(), Some(m) if m.role == Role::System));
    while history.len() > pinned + max_history {
        history.remove(pinned);
    }
}

/// Install or replace the pinned system prompt without touching the rest of
/// the transcript.
pub fn ensure_system_prompt(history: &mut Vec<ChatMessage>, prompt: String) {
    match history.first_mut() {
        Some(first) if first.role == Role::System => first.content = prompt,
        _ => history.insert(0, ChatMessage::system(prompt)),
    }
}

/// Shared map of per-user transcripts. Each transcript has its own lock so
/// one user's long turn never blocks another's.
#[derive(Clone, Default)]
pub struct Conversations {
    users: Arc<Mutex<HashMap<i64, Arc<Mutex<Vec<ChatMessage>>>>>>,
}

impl Conversations {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn for_user(&self, user_id: i64) -> Arc<Mutex<Vec<ChatMessage>>> {
        self.users
            .lock()
            .await
            .entry(user_id)
            .or_default()
            .clone()
    }

    pub async fn reset(&self, user_id: i64) {
        self.users.lock().await.remove(&user_id);
    }
}
