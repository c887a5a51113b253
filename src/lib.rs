//! Archivist: a Telegram assistant that decides on its own which parts of a
//! conversation to persist as notes in a content-addressed store, and finds
//! them again later by semantic similarity.
//!
//! The crate is organized around two cores:
//! - the agent turn loop (`agent`, `parser`, `tools`): drive an LLM
//!   conversation, parse tool invocations out of untrusted model output, and
//!   execute them until the model signals completion;
//! - the note store (`store`, `limiter`): a per-user TTL+LRU cache in front
//!   of a remote blob store plus a vector index for similarity search.
//!
//! External collaborators (chat model, embeddings, blob store, vector index,
//! Telegram) are trait seams with plain HTTP implementations.

pub mod agent;
pub mod config;
pub mod content_store;
pub mod error;
pub mod history;
pub mod limiter;
pub mod llm_client;
pub mod parser;
pub mod store;
pub mod telegram;
pub mod tools;
pub mod vector_index;

#[cfg(test)]
pub mod testutil;
