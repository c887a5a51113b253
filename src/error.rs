//! Error taxonomy for the collaborator boundaries and the agent loop.
//!
//! Parse and dispatch anomalies are absorbed where they occur and only
//! logged; the types here cover the failures that are allowed to escape:
//! provider/storage faults and agent-level aborts.

use thiserror::Error;

/// Failure talking to the chat model, embedding model, or vector index.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("provider returned {status}: {body}")]
    Api { status: u16, body: String },
    #[error("provider returned an empty response")]
    EmptyResponse,
}

/// Failure talking to the content-addressed blob store, or persisting the
/// note index that fronts it.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("storage returned {status}: {body}")]
    Api { status: u16, body: String },
    #[error("no content stored under cid '{0}'")]
    NotFound(String),
    #[error("malformed storage payload: {0}")]
    Malformed(String),
    #[error("note index persistence failed: {0}")]
    Index(#[from] std::io::Error),
}

/// Failures that abort an agent turn. The caller converts these into a
/// generic user-visible message; the turn's partial history is kept.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("turn limit of {0} reached without a completion signal")]
    TurnLimitExceeded(usize),
    #[error("tool '{tool}' failed")]
    ToolFailed {
        tool: String,
        #[source]
        source: anyhow::Error,
    },
    #[error(transparent)]
    Provider(#[from] ProviderError),
}
