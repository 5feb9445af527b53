use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::watch;

use remedi_core::config::Config;
use remedi_core::{ChatPipeline, Retriever, RetrieverConfig, SessionStore};
use remedi_gateway::GatewayServer;
use remedi_llm::LlmProvider;
use remedi_llm::cohere::{CohereOptions, CohereProvider};
use remedi_memory::{QdrantStore, VectorStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_subscriber();

    let config_path = resolve_config_path();
    let config = Config::load(&config_path)?;
    config.validate()?;
    tracing::info!(config = %config_path.display(), "configuration loaded");

    let api_key = config
        .secrets
        .cohere_api_key
        .as_ref()
        .context("REMEDI_COHERE_API_KEY not set")?
        .expose()
        .to_owned();

    let provider = Arc::new(CohereProvider::new(
        api_key,
        config.llm.base_url.clone(),
        CohereOptions {
            model: config.llm.model.clone(),
            embedding_model: config.llm.embedding_model.clone(),
            temperature: config.llm.temperature,
            max_tokens: config.llm.max_tokens,
            max_retries: config.llm.max_retries,
            request_timeout: Duration::from_secs(config.llm.request_timeout_secs),
        },
    ));
    tracing::info!(model = %config.llm.model, provider = provider.name(), "LLM provider ready");

    let store = Arc::new(QdrantStore::new(
        &config.index.qdrant_url,
        config.secrets.qdrant_api_key.as_ref().map(|k| k.expose()),
    )?);

    // The index is populated out of band; this only verifies reachability
    // and creates an empty collection on fresh deployments.
    match store
        .ensure_collection(&config.index.collection, config.index.vector_size)
        .await
    {
        Ok(()) => tracing::info!(collection = %config.index.collection, "vector index ready"),
        Err(e) => tracing::warn!("vector index not reachable at startup: {e}"),
    }

    let retriever = Retriever::new(
        store,
        Arc::clone(&provider) as Arc<dyn LlmProvider>,
        RetrieverConfig {
            collection: config.index.collection.clone(),
            top_k: config.index.top_k,
        },
    );
    let pipeline = Arc::new(ChatPipeline::new(retriever, provider));

    let sessions = Arc::new(SessionStore::new(
        config.session.max_turns,
        config.session.max_sessions,
        Duration::from_secs(config.session.idle_ttl_secs),
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for ctrl-c: {e:#}");
            return;
        }
        tracing::info!("received shutdown signal");
        let _ = shutdown_tx.send(true);
    });

    GatewayServer::new(
        &config.server.bind,
        config.server.port,
        pipeline,
        sessions,
        shutdown_rx,
    )
    .with_rate_limit(config.server.rate_limit)
    .with_max_body_size(config.server.max_body_size)
    .serve()
    .await?;

    Ok(())
}

fn init_subscriber() {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Priority: CLI --config > `REMEDI_CONFIG` env > config/default.toml
fn resolve_config_path() -> PathBuf {
    let args: Vec<String> = std::env::args().collect();
    if let Some(path) = args.windows(2).find(|w| w[0] == "--config").map(|w| &w[1]) {
        return PathBuf::from(path);
    }
    if let Ok(path) = std::env::var("REMEDI_CONFIG") {
        return PathBuf::from(path);
    }
    PathBuf::from("config/default.toml")
}
