use std::sync::Arc;

use anyhow::Context;

use retailops_api::app::{build_app, services::AppServices};
use retailops_api::config::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env().context("invalid configuration")?;
    retailops_observability::init(config.log_format);

    let services = match &config.database {
        Some(database) => AppServices::persistent(database)
            .await
            .context("failed to start persistent stores")?,
        None => AppServices::in_memory().context("failed to start in-memory stores")?,
    };
    let app = build_app(Arc::new(services), &config.jwt_secret);

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    tracing::info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}
