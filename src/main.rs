use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod cache;
mod config;
mod http;
mod ingest;
mod lookup;
mod messaging;
mod metrics;
mod models;
mod preload;
mod store;
mod utils;

use cache::OrderCache;
use config::Config;
use messaging::KafkaClient;
use metrics::Metrics;
use store::{OrderStore, PgOrderStore};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Structured logging with environment-based filtering. Default to INFO,
    // override with RUST_LOG (e.g. RUST_LOG=debug cargo run).
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,orderflow=debug")),
        )
        .init();

    let config = Config::from_env()?;
    // The database URL may carry credentials, so it stays out of the logs.
    tracing::info!(
        kafka_brokers = %config.kafka_brokers,
        kafka_topic = %config.kafka_topic,
        http_port = config.http_port,
        "🚀 starting orderflow"
    );

    // Durable store first: an unreachable database is fatal at startup,
    // unlike every later failure which is handled per message or request.
    let store = PgOrderStore::connect(&config.database_url).await?;
    store.ensure_schema().await?;
    let store: Arc<dyn OrderStore> = Arc::new(store);

    let metrics = Arc::new(Metrics::new()?);
    let kafka = Arc::new(KafkaClient::new(&config.kafka_brokers)?);
    let cache = Arc::new(OrderCache::new(cache::DEFAULT_CAPACITY));

    // Warm the cache before lookup traffic is accepted.
    preload::warm_cache(store.as_ref(), &cache, preload::PRELOAD_LIMIT).await;

    // Background ingestion task: drains the channel for the process
    // lifetime, isolated from the request-serving path.
    let consumer = messaging::build_consumer(&config)?;
    tokio::spawn(ingest::run(
        consumer,
        Arc::clone(&store),
        Arc::clone(&cache),
        Arc::clone(&metrics),
    ));

    let state = http::AppState {
        cache,
        store,
        kafka,
        metrics,
        topic: config.kafka_topic.clone(),
    };

    http::serve(state, config.http_port).await?;

    Ok(())
}
