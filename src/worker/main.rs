/**
 * Shell Worker Entry Point
 *
 * Installs and activates the app-shell worker, then serves it as a local
 * caching proxy in front of the configured origin.
 */

use punchqueue::shared::config::EngineConfig;
use punchqueue::worker::proxy::{router, ProxyState};
use punchqueue::worker::cache::SHELL_CACHE_FILE;
use punchqueue::worker::{spawn_worker, CacheManifest, CacheStorage, Interceptor, Upstream};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables from .env file if present
    dotenv::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(&env_filter))
        .init();

    let config = EngineConfig::load()?;
    let upstream = Upstream::new(&config)?;
    let manifest = CacheManifest::from_config(&config);
    tracing::info!(
        "Shell worker for {} (generation {})",
        config.origin,
        manifest.generation
    );

    let caches = CacheStorage::persistent(&config.origin_dir().join(SHELL_CACHE_FILE)).await?;
    let worker = spawn_worker(Interceptor::new(manifest, caches, upstream.clone()));
    let lifecycle = worker.ready().await;
    tracing::info!("Worker is {:?}", lifecycle);

    let app = router(ProxyState { worker, upstream });

    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    tracing::info!("Listening on http://{}", config.listen_addr);
    axum::serve(listener, app).await?;

    Ok(())
}
