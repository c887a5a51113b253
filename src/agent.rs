//! The agent turn loop.
//!
//! One incoming user message drives an iterative loop: regenerate the system
//! prompt, ask the model, parse tool invocations out of its reply, and run
//! them strictly in parse order. The loop ends only through the completion
//! sentinel or the hard turn ceiling; a model that keeps talking without
//! completing burns through its turns and the caller hears about it as
//! `TurnLimitExceeded` rather than an unbounded spin.
//!
//! Tool results go back into the history as `system` messages so the model
//! sees them next turn. A reply that parses to zero invocations still costs
//! a turn.

use chrono::Utc;
use std::sync::Arc;

use crate::error::AgentError;
use crate::history::{ensure_system_prompt, push_bounded};
use crate::llm_client::{ChatMessage, ChatModel};
use crate::parser::ToolCallParser;
use crate::tools::{bind_params, ToolRegistry, ToolReply};

const PROMPT_PREAMBLE: &str = "You are a personal note-taking assistant. You act only through tool \
invocations; plain text outside an invocation block is never shown to the \
user. Use replyUser to talk to the user, and call complete once their \
request is fully handled.";

pub struct AgentLoop {
    chat: Arc<dyn ChatModel>,
    parser: ToolCallParser,
    max_turns: usize,
    max_history: usize,
}

impl AgentLoop {
    pub fn new(chat: Arc<dyn ChatModel>, max_turns: usize, max_history: usize) -> Self {
        Self {
            chat,
            parser: ToolCallParser::new(),
            max_turns,
            max_history,
        }
    }

    fn build_system_prompt(&self, user_name: &str, tools: &ToolRegistry) -> String {
        format!(
            "{}\n\nCurrent time: {}\nYou are assisting: {}\n\nAvailable tools:\n{}",
            PROMPT_PREAMBLE,
            Utc::now().format("%Y-%m-%d %H:%M UTC"),
            user_name,
            tools.prompt_blocks(),
        )
    }

    /// Drive one user message to completion. On success the history holds the
    /// full exchange; on error it holds whatever was exchanged before the
    /// failure, so the next message still has context.
    pub async fn run(
        &self,
        history: &mut Vec<ChatMessage>,
        user_name: &str,
        tools: &ToolRegistry,
    ) -> Result<(), AgentError> {
        for turn in 0..self.max_turns {
            ensure_system_prompt(history, self.build_system_prompt(user_name, tools));

            let response = self.chat.complete(history).await?;
            push_bounded(history, ChatMessage::assistant(response.clone()), self.max_history);

            let calls = self.parser.parse(&response);
            tracing::debug!(turn, calls = calls.len(), "model turn parsed");

            for call in calls {
                let Some(tool) = tools.get(&call.name) else {
                    tracing::warn!(tool = %call.name, "model invoked unknown tool, skipping");
                    continue;
                };

                let params = match bind_params(tool.params(), &call.params) {
                    Ok(params) => params,
                    Err(reason) => {
                        tracing::warn!(tool = %call.name, "invalid invocation skipped: {}", reason);
                        continue;
                    }
                };

                match tool.execute(&params).await {
                    Ok(ToolReply::TaskComplete) => {
                        tracing::debug!(turn, "task complete");
                        return Ok(());
                    }
                    Ok(ToolReply::Text(result)) => {
                        push_bounded(
                            history,
                            ChatMessage::system(format!(
                                "Tool result ({}): {}",
                                call.name, result
                            )),
                            self.max_history,
                        );
                    }
                    Err(source) => {
                        return Err(AgentError::ToolFailed {
                            tool: call.name,
                            source,
                        });
                    }
                }
            }
        }

        Err(AgentError::TurnLimitExceeded(self.max_turns))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm_client::Role;
    use crate::store::{NoteStore, PersistentIndex, StoreSettings};
    use crate::testutil::{
        CapturingReplier, FakeContentStore, FakeEmbedder, FakeVectorIndex, ScriptedChatModel,
    };
    use crate::tools::notes::user_toolset;
    use tempfile::tempdir;

    const USER: i64 = 9;

    struct Fixture {
        store: Arc<NoteStore>,
        replier: Arc<CapturingReplier>,
        tools: ToolRegistry,
        _dir: tempfile::TempDir,
    }

    fn fixture() -> Fixture {
        let dir = tempdir().unwrap();
        let index = PersistentIndex::load(&dir.path().join("index.json")).unwrap();
        let store = Arc::new(NoteStore::new(
            Arc::new(FakeContentStore::new()),
            Arc::new(FakeEmbedder::new()),
            Arc::new(FakeVectorIndex::new()),
            index,
            StoreSettings::default(),
        ));
        let replier = Arc::new(CapturingReplier::new());
        let tools = user_toolset(store.clone(), USER, replier.clone());
        Fixture {
            store,
            replier,
            tools,
            _dir: dir,
        }
    }

    fn loop_with(script: Vec<&str>, max_turns: usize) -> (AgentLoop, Arc<ScriptedChatModel>) {
        let chat = Arc::new(ScriptedChatModel::new(script));
        (AgentLoop::new(chat.clone(), max_turns, 10), chat)
    }

    #[tokio::test]
    async fn completes_in_one_turn_with_reply() {
        let f = fixture();
        let (agent, chat) = loop_with(
            vec![
                r#"<invoke name="replyUser"><parameter name="message">Hi there</parameter></invoke>
                   <invoke name="complete"></invoke>"#,
            ],
            8,
        );

        let mut history = vec![ChatMessage::user("hello".to_string())];
        agent.run(&mut history, "Alice", &f.tools).await.unwrap();

        assert_eq!(chat.calls(), 1);
        assert_eq!(f.replier.messages(), vec!["Hi there"]);
        assert_eq!(history[0].role, Role::System);
    }

    #[tokio::test]
    async fn save_then_confirm_across_turns() {
        let f = fixture();
        let (agent, chat) = loop_with(
            vec![
                r#"<invoke name="saveNote">
                     <parameter name="title">Meeting</parameter>
                     <parameter name="content">5pm Friday</parameter>
                     <parameter name="tags">work, calendar</parameter>
                   </invoke>"#,
                r#"<invoke name="replyUser"><parameter name="message">Saved your meeting note.</parameter></invoke>
                   <invoke name="complete"></invoke>"#,
            ],
            8,
        );

        let mut history = vec![ChatMessage::user("remember my meeting".to_string())];
        agent.run(&mut history, "Alice", &f.tools).await.unwrap();

        assert_eq!(chat.calls(), 2);
        assert_eq!(f.replier.messages(), vec!["Saved your meeting note."]);

        let notes = f.store.list_notes(USER).await;
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].title, "Meeting");
        assert_eq!(notes[0].tags, vec!["work", "calendar"]);

        // The save's tool result was fed back before the second model call.
        assert!(history
            .iter()
            .any(|m| m.role == Role::System && m.content.contains("Tool result (saveNote)")));
    }

    #[tokio::test]
    async fn turn_ceiling_stops_a_model_that_never_completes() {
        let f = fixture();
        let (agent, chat) = loop_with(vec!["thinking out loud, no tools"; 10], 3);

        let mut history = vec![ChatMessage::user("hello".to_string())];
        let err = agent.run(&mut history, "Alice", &f.tools).await.unwrap_err();

        assert!(matches!(err, AgentError::TurnLimitExceeded(3)));
        assert_eq!(chat.calls(), 3);
    }

    #[tokio::test]
    async fn completion_discards_queued_calls() {
        let f = fixture();
        let (agent, _) = loop_with(
            vec![
                r#"<invoke name="complete"></invoke>
                   <invoke name="replyUser"><parameter name="message">too late</parameter></invoke>"#,
            ],
            8,
        );

        let mut history = vec![ChatMessage::user("hello".to_string())];
        agent.run(&mut history, "Alice", &f.tools).await.unwrap();

        assert!(f.replier.messages().is_empty());
    }

    #[tokio::test]
    async fn unknown_tool_and_bad_params_are_skipped_not_fatal() {
        let f = fixture();
        let (agent, chat) = loop_with(
            vec![
                // Unknown tool, then a saveNote missing required content.
                r#"<invoke name="teleport"></invoke>
                   <invoke name="saveNote"><parameter name="title">half</parameter></invoke>"#,
                r#"<invoke name="complete"></invoke>"#,
            ],
            8,
        );

        let mut history = vec![ChatMessage::user("hello".to_string())];
        agent.run(&mut history, "Alice", &f.tools).await.unwrap();

        assert_eq!(chat.calls(), 2);
        assert!(f.store.list_notes(USER).await.is_empty());
        // Skips leave no tool-result message behind.
        assert!(!history.iter().any(|m| m.content.contains("Tool result")));
    }

    #[tokio::test]
    async fn tool_failure_aborts_with_the_tool_name() {
        let f = fixture();
        let (agent, _) = loop_with(
            vec![
                r#"<invoke name="replyUser"><parameter name="message">hi</parameter></invoke>"#,
            ],
            8,
        );
        f.replier.fail_next(true);

        let mut history = vec![ChatMessage::user("hello".to_string())];
        let err = agent.run(&mut history, "Alice", &f.tools).await.unwrap_err();

        match err {
            AgentError::ToolFailed { tool, .. } => assert_eq!(tool, "replyUser"),
            other => panic!("expected ToolFailed, got {:?}", other),
        }
        // Partial history survives the abort.
        assert!(history.iter().any(|m| m.role == Role::Assistant));
    }

    #[tokio::test]
    async fn system_prompt_lists_every_tool() {
        let f = fixture();
        let (agent, _) = loop_with(vec![], 1);
        let prompt = agent.build_system_prompt("Alice", &f.tools);

        for name in ["saveNote", "listNotes", "searchNotes", "viewNote", "replyUser", "complete"] {
            assert!(prompt.contains(name), "prompt missing {}", name);
        }
        assert!(prompt.contains("Alice"));
        assert!(prompt.contains("Current time:"));
    }
}
