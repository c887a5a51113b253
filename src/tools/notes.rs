//! The note-taking toolset bound to one user and one reply channel.
//!
//! Every tool here closes over the user id it serves, so a turn can never
//! reach into another user's notes. Tool output is plain text destined for
//! the model's next context window, so results are rendered compactly and
//! failures come back as readable strings rather than errors where the model
//! can reasonably react to them.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;

use crate::store::{NoteMeta, NoteStore};

use super::{ParamKind, ParamSpec, Replier, Tool, ToolParams, ToolRegistry, ToolReply};

const DEFAULT_SEARCH_LIMIT: usize = 5;

fn render_meta_list(notes: &[NoteMeta]) -> String {
    if notes.is_empty() {
        return "No notes found.".to_string();
    }
    let mut out = format!("{} note(s):\n", notes.len());
    for meta in notes {
        out.push_str(&format!(
            "- [{}] {} (tags: {}, created: {})\n",
            meta.cid,
            meta.title,
            if meta.tags.is_empty() {
                "none".to_string()
            } else {
                meta.tags.join(", ")
            },
            meta.created_at.format("%Y-%m-%d %H:%M UTC"),
        ));
    }
    out
}

// ─── saveNote ────────────────────────────────────────────────────────────────

pub struct SaveNoteTool {
    store: Arc<NoteStore>,
    user_id: i64,
}

#[async_trait]
impl Tool for SaveNoteTool {
    fn name(&self) -> &str {
        "saveNote"
    }

    fn description(&self) -> &str {
        "Save a new note with a title, content, and optional comma-separated tags"
    }

    fn params(&self) -> &[ParamSpec] {
        const PARAMS: &[ParamSpec] = &[
            ParamSpec::required("title", ParamKind::Text),
            ParamSpec::required("content", ParamKind::Text),
            ParamSpec::optional("tags", ParamKind::List),
        ];
        PARAMS
    }

    async fn execute(&self, params: &ToolParams) -> Result<ToolReply> {
        let title = params.text("title").context("title parameter missing")?;
        let content = params.text("content").context("content parameter missing")?;
        let tags = params.list("tags").unwrap_or(&[]).to_vec();

        let saved = self
            .store
            .add_note(self.user_id, title.to_string(), content.to_string(), tags)
            .await?;

        Ok(ToolReply::Text(if saved.index_degraded {
            format!(
                "Note saved with id {}. Warning: semantic indexing failed, so this note may not appear in searches.",
                saved.cid
            )
        } else {
            format!("Note saved with id {}.", saved.cid)
        }))
    }
}

// ─── listNotes ───────────────────────────────────────────────────────────────

pub struct ListNotesTool {
    store: Arc<NoteStore>,
    user_id: i64,
}

#[async_trait]
impl Tool for ListNotesTool {
    fn name(&self) -> &str {
        "listNotes"
    }

    fn description(&self) -> &str {
        "List all saved notes, optionally filtered by a single tag"
    }

    fn params(&self) -> &[ParamSpec] {
        const PARAMS: &[ParamSpec] = &[ParamSpec::optional("tag", ParamKind::Text)];
        PARAMS
    }

    async fn execute(&self, params: &ToolParams) -> Result<ToolReply> {
        let notes = match params.text("tag") {
            Some(tag) if !tag.is_empty() => {
                self.store.list_notes_by_tag(self.user_id, tag).await
            }
            _ => self.store.list_notes(self.user_id).await,
        };
        Ok(ToolReply::Text(render_meta_list(&notes)))
    }
}

// ─── searchNotes ─────────────────────────────────────────────────────────────

pub struct SearchNotesTool {
    store: Arc<NoteStore>,
    user_id: i64,
}

#[async_trait]
impl Tool for SearchNotesTool {
    fn name(&self) -> &str {
        "searchNotes"
    }

    fn description(&self) -> &str {
        "Find notes semantically similar to a query, most similar first"
    }

    fn params(&self) -> &[ParamSpec] {
        const PARAMS: &[ParamSpec] = &[
            ParamSpec::required("query", ParamKind::Text),
            ParamSpec::optional("limit", ParamKind::Text),
        ];
        PARAMS
    }

    async fn execute(&self, params: &ToolParams) -> Result<ToolReply> {
        let query = params.text("query").context("query parameter missing")?;
        let limit = params
            .text("limit")
            .and_then(|raw| raw.trim().parse::<usize>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_SEARCH_LIMIT);

        let results = self.store.search_similar(self.user_id, query, limit).await?;
        if results.is_empty() {
            return Ok(ToolReply::Text("No matching notes found.".to_string()));
        }

        let mut out = format!("{} match(es):\n", results.len());
        for hit in &results {
            out.push_str(&format!(
                "- [{}] {} (distance {:.3})\n  {}\n",
                hit.cid, hit.note.title, hit.score, hit.note.content,
            ));
        }
        Ok(ToolReply::Text(out))
    }
}

// ─── viewNote ────────────────────────────────────────────────────────────────

pub struct ViewNoteTool {
    store: Arc<NoteStore>,
    user_id: i64,
}

#[async_trait]
impl Tool for ViewNoteTool {
    fn name(&self) -> &str {
        "viewNote"
    }

    fn description(&self) -> &str {
        "Read the full content of one note by its id"
    }

    fn params(&self) -> &[ParamSpec] {
        const PARAMS: &[ParamSpec] = &[ParamSpec::required("id", ParamKind::Text)];
        PARAMS
    }

    async fn execute(&self, params: &ToolParams) -> Result<ToolReply> {
        let cid = params.text("id").context("id parameter missing")?;
        Ok(ToolReply::Text(
            match self.store.get_note(self.user_id, cid).await {
                Some(note) => format!(
                    "{}\nTags: {}\nCreated: {}\n\n{}",
                    note.title,
                    if note.tags.is_empty() {
                        "none".to_string()
                    } else {
                        note.tags.join(", ")
                    },
                    note.created_at.format("%Y-%m-%d %H:%M UTC"),
                    note.content,
                ),
                None => format!("No note with id {} exists.", cid),
            },
        ))
    }
}

// ─── replyUser ───────────────────────────────────────────────────────────────

pub struct ReplyUserTool {
    replier: Arc<dyn Replier>,
}

#[async_trait]
impl Tool for ReplyUserTool {
    fn name(&self) -> &str {
        "replyUser"
    }

    fn description(&self) -> &str {
        "Send a message to the user. This is the only way the user sees text"
    }

    fn params(&self) -> &[ParamSpec] {
        const PARAMS: &[ParamSpec] = &[ParamSpec::required("message", ParamKind::Text)];
        PARAMS
    }

    async fn execute(&self, params: &ToolParams) -> Result<ToolReply> {
        let message = params.text("message").context("message parameter missing")?;
        self.replier.reply(message).await?;
        Ok(ToolReply::Text("Message delivered.".to_string()))
    }
}

// ─── complete ────────────────────────────────────────────────────────────────

pub struct CompleteTool;

#[async_trait]
impl Tool for CompleteTool {
    fn name(&self) -> &str {
        "complete"
    }

    fn description(&self) -> &str {
        "Signal that the user's request is fully handled and end the turn"
    }

    fn params(&self) -> &[ParamSpec] {
        &[]
    }

    async fn execute(&self, _params: &ToolParams) -> Result<ToolReply> {
        Ok(ToolReply::TaskComplete)
    }
}

/// The full toolset for one user's turn, bound to their reply channel.
pub fn user_toolset(
    store: Arc<NoteStore>,
    user_id: i64,
    replier: Arc<dyn Replier>,
) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(SaveNoteTool {
        store: store.clone(),
        user_id,
    }));
    registry.register(Arc::new(ListNotesTool {
        store: store.clone(),
        user_id,
    }));
    registry.register(Arc::new(SearchNotesTool {
        store: store.clone(),
        user_id,
    }));
    registry.register(Arc::new(ViewNoteTool { store, user_id }));
    registry.register(Arc::new(ReplyUserTool { replier }));
    registry.register(Arc::new(CompleteTool));
    registry
}
