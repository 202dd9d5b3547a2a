use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod config;
mod inference;
mod summarize;
mod web;

use config::AppConfig;
use inference::loader::ModelLoader;
use inference::Summarizer;
use web::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------
    // Logging
    // -----------------------------
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // -----------------------------
    // Config + writable model cache
    // -----------------------------
    let cfg = AppConfig::from_env()?;
    cfg.apply_cache_env();
    info!(
        model = %cfg.model_label(),
        cache_dir = %cfg.cache_dir.display(),
        device = %cfg.device,
        max_length = cfg.generation.max_length,
        min_length = cfg.generation.min_length,
        "🚀 Starting GenAI summarizer"
    );

    // -----------------------------
    // Shared state
    // -----------------------------
    let loader = Arc::new(ModelLoader::from_config(&cfg));
    let state = AppState {
        loader: loader.clone(),
        params: cfg.generation.clone(),
        model_label: Arc::from(cfg.model_label()),
        max_body_bytes: cfg.max_body_bytes,
    };

    if cfg.preload {
        tokio::spawn(async move {
            info!("🔄 Initializing AI engine...");
            match loader.get().await {
                Ok(model) => info!(model = model.name(), "AI engine ready"),
                Err(e) => warn!("warmup failed, will retry on first request: {e:#}"),
            }
        });
    }

    let app = web::router(state);

    let listener = TcpListener::bind(cfg.bind).await?;
    info!("🌐 HTTP listening on http://{}", cfg.bind);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("failed to listen for ctrl-c: {e}");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
