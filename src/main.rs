use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::EnvFilter;

use archivist::agent::AgentLoop;
use archivist::config::Config;
use archivist::content_store::HttpContentStore;
use archivist::history::Conversations;
use archivist::llm_client::LlmClient;
use archivist::store::{NoteStore, PersistentIndex, StoreSettings};
use archivist::telegram::{self, Services};
use archivist::vector_index::HttpVectorIndex;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,archivist=debug")),
        )
        .init();

    tracing::info!("Archivist starting...");

    let config = Config::load();

    let token = match std::env::var("TELEGRAM_BOT_TOKEN") {
        Ok(t) if !t.trim().is_empty() => t.trim().to_string(),
        _ => anyhow::bail!("TELEGRAM_BOT_TOKEN is not set"),
    };

    let timeout = Duration::from_secs(config.request_timeout_secs);

    let llm = Arc::new(LlmClient::new(
        config.llm_api_url.clone(),
        config.llm_api_key.clone(),
        config.llm_model.clone(),
        config.embedding_model.clone(),
        timeout,
    ));
    let content = Arc::new(HttpContentStore::new(
        config.content_store_url.clone(),
        config.content_store_api_key.clone(),
        timeout,
    ));
    let vectors = Arc::new(HttpVectorIndex::new(config.vector_index_url.clone(), timeout));

    let index = PersistentIndex::load(Path::new(&config.index_path))?;
    tracing::info!("Note index loaded from {}", config.index_path);

    let store = Arc::new(NoteStore::new(
        content,
        llm.clone(),
        vectors,
        index,
        StoreSettings {
            cache_capacity: config.cache_capacity,
            cache_max_age: Duration::from_secs(config.cache_max_age_secs),
            fetch_concurrency: config.fetch_concurrency,
        },
    ));

    let services = Arc::new(Services {
        agent: AgentLoop::new(llm, config.max_turns, config.max_history),
        store,
        conversations: Conversations::new(),
        max_history: config.max_history,
    });

    telegram::spawn_bot(token, services);

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");
    Ok(())
}
