use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use ffpipe::{Config, Engine, api};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("ffpipe=info,tower_http=info")),
        )
        .init();

    let config = Config::from_env().context("loading configuration")?;
    let addr = config.bind_addr;

    let engine = Engine::start(config).await.context("starting engine")?;
    let app = api::router(engine.clone());

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(%addr, "ffpipe listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving")?;

    engine.stop();
    info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
