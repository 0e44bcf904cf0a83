use cascade_orchestrator::config::{Config, UpstreamMode};
use cascade_orchestrator::redis_client::RedisClient;
use cascade_orchestrator::upstream::cache::CachedEmbeddingProvider;
use cascade_orchestrator::upstream::http::{HttpEmbeddingClient, HttpVectorIndexClient};
use cascade_orchestrator::upstream::memory::{HashingEmbedder, InMemoryIndex};
use cascade_orchestrator::upstream::{EmbeddingProvider, VectorIndex};
use cascade_orchestrator::{api, metrics, middleware, Orchestrator, RateLimiter};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use warp::Filter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .json()
        .init();

    info!("Starting cascade retrieval orchestrator");

    // Load and validate configuration; misconfiguration stops startup here.
    let config = Config::load()?;
    let cascade_config = Arc::new(config.cascade()?);
    let limiter = Arc::new(RateLimiter::new(config.rate_limiter()?)?);
    info!(
        themes = cascade_config.themes().len(),
        mode = ?config.upstream_mode,
        "Configuration loaded"
    );

    let (embedder, index) = build_upstream(&config).await?;
    let orchestrator = Arc::new(Orchestrator::new(embedder, index, limiter.clone())?);
    orchestrator.verify_embedding_width().await?;

    if config.rate_limit.idle_retention_secs.is_some() {
        let _janitor = limiter.spawn_janitor(Duration::from_secs(60));
    }

    let api_routes = api::routes(orchestrator, cascade_config)
        .with(warp::log("api"))
        .with(middleware::cors());

    // Health check route
    let health = warp::path("health")
        .and(warp::get())
        .map(|| warp::reply::json(&serde_json::json!({"status": "healthy"})));

    // Metrics route
    let metrics_route = warp::path("metrics")
        .and(warp::get())
        .map(|| match metrics::render() {
            Ok((buffer, content_type)) => warp::http::Response::builder()
                .header("Content-Type", content_type)
                .body(buffer),
            Err(e) => warp::http::Response::builder()
                .status(warp::http::StatusCode::INTERNAL_SERVER_ERROR)
                .body(e.to_string().into_bytes()),
        });

    let routes = health.or(metrics_route).or(api_routes);

    let addr = ([0, 0, 0, 0], config.port);
    info!("Server listening on {}", addr.1);

    warp::serve(routes).run(addr).await;

    Ok(())
}

async fn build_upstream(
    config: &Config,
) -> anyhow::Result<(Arc<dyn EmbeddingProvider>, Arc<dyn VectorIndex>)> {
    let dimension = config.embedding_dimension;

    let (embedder, index) = match config.upstream_mode {
        UpstreamMode::Memory => {
            warn!("Using in-memory embedder and index; nothing is persisted");
            let embedder: Arc<dyn EmbeddingProvider> = Arc::new(HashingEmbedder::new(dimension));
            let index: Arc<dyn VectorIndex> = Arc::new(InMemoryIndex::new(dimension));
            (embedder, index)
        }
        UpstreamMode::Http => {
            let http = config.http_client();
            let embedder: Arc<dyn EmbeddingProvider> = Arc::new(HttpEmbeddingClient::new(
                &config.embedding_service_url,
                dimension,
                &http,
            )?);
            let index: Arc<dyn VectorIndex> = Arc::new(HttpVectorIndexClient::new(
                &config.vector_db_service_url,
                dimension,
                &http,
            )?);
            (embedder, index)
        }
    };

    let Some(redis_url) = &config.redis_url else {
        return Ok((embedder, index));
    };
    let redis_client = RedisClient::new(redis_url).await?;
    info!("Redis connection established; caching embeddings");
    let cached: Arc<dyn EmbeddingProvider> = Arc::new(CachedEmbeddingProvider::new(
        embedder,
        Arc::new(redis_client),
        Duration::from_secs(config.embedding_cache_ttl_secs),
    ));
    Ok((cached, index))
}
