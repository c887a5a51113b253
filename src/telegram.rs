//! Telegram front end.
//!
//! A long-polling task receives messages and hands each one to the agent
//! loop on its own spawned task, so a slow turn for one user never blocks
//! polling or other users. Same-user messages still run one at a time: the
//! turn holds that user's history lock for its whole duration.
//!
//! Replies flow only through the `replyUser` tool, delivered by a
//! [`TelegramReplier`] bound to the originating chat.

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

use crate::agent::AgentLoop;
use crate::history::{push_bounded, Conversations};
use crate::llm_client::ChatMessage;
use crate::store::NoteStore;
use crate::tools::notes::user_toolset;
use crate::tools::Replier;

const WELCOME: &str = "Hi! I'm your note-taking assistant. Tell me anything you want to \
remember, or ask me to find something you saved earlier.";

const RESET_CONFIRMATION: &str = "Conversation cleared. Your saved notes are untouched.";

const APOLOGY: &str = "Sorry, something went wrong while handling that. Please try again.";

// Telegram enforces a 4096-character limit per message.
const MAX_MESSAGE_CHARS: usize = 4096;

// Long-poll requests hold for 30 s server-side; the client timeout must
// comfortably outlast them.
const POLL_HOLD_SECS: u64 = 30;
const HTTP_TIMEOUT_SECS: u64 = 90;

// ─── Telegram API types ──────────────────────────────────────────────────────

#[derive(Deserialize)]
struct TelegramResponse<T> {
    ok: bool,
    result: Option<T>,
}

#[derive(Deserialize)]
struct Update {
    update_id: i64,
    message: Option<TelegramMessage>,
}

#[derive(Deserialize)]
struct TelegramMessage {
    chat: TelegramChat,
    from: Option<TelegramUser>,
    text: Option<String>,
}

#[derive(Deserialize)]
struct TelegramChat {
    id: i64,
}

#[derive(Deserialize)]
struct TelegramUser {
    id: i64,
    first_name: Option<String>,
}

// ─── Shared services ─────────────────────────────────────────────────────────

/// Everything a turn needs, shared by all in-flight turns.
pub struct Services {
    pub agent: AgentLoop,
    pub store: Arc<NoteStore>,
    pub conversations: Conversations,
    pub max_history: usize,
}

// ─── Reply channel ───────────────────────────────────────────────────────────

/// Delivers `replyUser` output to the chat a turn came from. Delivery
/// failure is surfaced so the agent loop can abort the turn.
pub struct TelegramReplier {
    client: reqwest::Client,
    api_base: String,
    chat_id: i64,
}

#[async_trait]
impl Replier for TelegramReplier {
    async fn reply(&self, text: &str) -> Result<()> {
        send_message(&self.client, &self.api_base, self.chat_id, text)
            .await
            .map_err(|e| anyhow::anyhow!("telegram delivery to chat {} failed: {}", self.chat_id, e))
    }
}

// ─── Public entry point ──────────────────────────────────────────────────────

/// Spawn the long-polling bot task. Set `TELEGRAM_CHAT_ID` to restrict the
/// bot to a single authorized chat.
pub fn spawn_bot(token: String, services: Arc<Services>) {
    let allowed_chat_id: Option<i64> = std::env::var("TELEGRAM_CHAT_ID")
        .ok()
        .and_then(|s| s.trim().parse().ok());

    tokio::spawn(async move {
        tracing::info!(
            "Telegram bot active (allowed_chat_id: {:?})",
            allowed_chat_id
        );
        run_bot(token, services, allowed_chat_id).await;
    });
}

// ─── Bot loop ────────────────────────────────────────────────────────────────

fn chat_allowed(allowed_chat_id: Option<i64>, chat_id: i64) -> bool {
    match allowed_chat_id {
        Some(allowed) => chat_id == allowed,
        None => true,
    }
}

async fn run_bot(token: String, services: Arc<Services>, allowed_chat_id: Option<i64>) {
    let api_base = format!("https://api.telegram.org/bot{}", token);
    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(HTTP_TIMEOUT_SECS))
        .build()
        .unwrap_or_else(|_| reqwest::Client::new());
    let mut offset: i64 = 0;

    loop {
        let updates = match poll_updates(&client, &api_base, offset).await {
            Some(u) => u,
            None => continue,
        };

        for update in updates {
            offset = update.update_id + 1;

            let msg = match update.message {
                Some(m) => m,
                None => continue,
            };

            let text = match msg.text {
                Some(t) if !t.trim().is_empty() => t.trim().to_string(),
                _ => continue,
            };

            let chat_id = msg.chat.id;
            if !chat_allowed(allowed_chat_id, chat_id) {
                tracing::warn!(
                    "Telegram: ignoring message from unauthorized chat {}",
                    chat_id
                );
                continue;
            }

            let (user_id, user_name) = match msg.from {
                Some(user) => (
                    user.id,
                    user.first_name.unwrap_or_else(|| "there".to_string()),
                ),
                None => continue,
            };

            tracing::info!("Telegram [user {} chat {}]: {:?}", user_id, chat_id, text);

            if text == "/start" {
                if let Err(e) = send_message(&client, &api_base, chat_id, WELCOME).await {
                    tracing::warn!("welcome delivery failed: {}", e);
                }
                continue;
            }

            if text == "/reset" {
                services.conversations.reset(user_id).await;
                if let Err(e) =
                    send_message(&client, &api_base, chat_id, RESET_CONFIRMATION).await
                {
                    tracing::warn!("reset confirmation delivery failed: {}", e);
                }
                continue;
            }

            let services = services.clone();
            let client = client.clone();
            let api_base = api_base.clone();
            tokio::spawn(async move {
                handle_message(services, client, api_base, chat_id, user_id, user_name, text)
                    .await;
            });
        }
    }
}

async fn handle_message(
    services: Arc<Services>,
    client: reqwest::Client,
    api_base: String,
    chat_id: i64,
    user_id: i64,
    user_name: String,
    text: String,
) {
    let replier = Arc::new(TelegramReplier {
        client: client.clone(),
        api_base: api_base.clone(),
        chat_id,
    });
    let tools = user_toolset(services.store.clone(), user_id, replier);

    // Holding the history lock for the whole turn serializes this user's
    // messages without blocking anyone else's.
    let history = services.conversations.for_user(user_id).await;
    let mut history = history.lock().await;
    push_bounded(&mut history, ChatMessage::user(text), services.max_history);

    if let Err(e) = services.agent.run(&mut history, &user_name, &tools).await {
        tracing::error!(user_id, "turn failed: {}", e);
        if let Err(e) = send_message(&client, &api_base, chat_id, APOLOGY).await {
            tracing::warn!("apology delivery failed: {}", e);
        }
    }
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

async fn poll_updates(
    client: &reqwest::Client,
    api_base: &str,
    offset: i64,
) -> Option<Vec<Update>> {
    let url = format!("{}/getUpdates", api_base);
    let params = serde_json::json!({
        "offset": offset,
        "timeout": POLL_HOLD_SECS,
        "allowed_updates": ["message"]
    });

    let resp = match client.post(&url).json(&params).send().await {
        Ok(r) => r,
        Err(e) => {
            tracing::warn!("Telegram getUpdates error: {}", e);
            tokio::time::sleep(tokio::time::Duration::from_secs(5)).await;
            return None;
        }
    };

    let body: TelegramResponse<Vec<Update>> = match resp.json().await {
        Ok(b) => b,
        Err(e) => {
            tracing::warn!("Telegram getUpdates parse error: {}", e);
            tokio::time::sleep(tokio::time::Duration::from_secs(5)).await;
            return None;
        }
    };

    if !body.ok {
        tracing::warn!("Telegram API returned ok=false");
        tokio::time::sleep(tokio::time::Duration::from_secs(10)).await;
        return None;
    }

    Some(body.result.unwrap_or_default())
}

async fn send_message(
    client: &reqwest::Client,
    api_base: &str,
    chat_id: i64,
    text: &str,
) -> Result<()> {
    let text = truncate_chars(text, MAX_MESSAGE_CHARS);

    let url = format!("{}/sendMessage", api_base);
    let payload = serde_json::json!({ "chat_id": chat_id, "text": text });

    let resp = client.post(&url).json(&payload).send().await?;
    if !resp.status().is_success() {
        anyhow::bail!("sendMessage failed: HTTP {}", resp.status());
    }
    tracing::debug!("Telegram: sent reply to chat {}", chat_id);
    Ok(())
}

fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
