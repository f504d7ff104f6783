use anyhow::Context;

use sessiongate_api::app::{build_app, services::build_services};
use sessiongate_infra::config::{load_server_config, load_token_config};
use sessiongate_infra::refresh_registry::PurgeWorker;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    sessiongate_observability::init();

    let token_config = load_token_config().context("invalid token configuration")?;
    let server_config = load_server_config().context("invalid server configuration")?;
    tracing::info!(config = ?token_config, "token configuration loaded");

    let services = build_services(&token_config, &server_config)
        .await
        .context("failed to build services")?;

    let purge = PurgeWorker::spawn(
        services.registry.clone(),
        services.clock.clone(),
        server_config.gc_interval,
        token_config.leeway,
    );

    let app = build_app(services.state);

    let listener = tokio::net::TcpListener::bind(server_config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", server_config.bind_addr))?;
    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    purge.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}
