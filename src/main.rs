use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use storefront_api::{
    app_router, build_state,
    config::{init_tracing, load_config},
    db::{establish_connection, run_migrations},
    gateway::stripe::StripeGateway,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = load_config().context("failed to load configuration")?;
    init_tracing(&config.log_level, config.log_json);
    info!(environment = %config.environment, "starting storefront API");

    let db = establish_connection(&config)
        .await
        .context("failed to connect to database")?;
    if config.auto_migrate {
        run_migrations(&db).await.context("migration failed")?;
    }

    let secret_key = match &config.gateway_secret_key {
        Some(key) => key.clone(),
        None => {
            warn!("gateway secret key not configured, session creation will be rejected");
            String::new()
        }
    };
    let gateway = Arc::new(StripeGateway::new(
        secret_key,
        config.gateway_api_base.clone(),
    ));

    let addr = config.server_addr();
    let state = build_state(db, config, gateway);
    let app = app_router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("failed to install ctrl-c handler: {e}");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => warn!("failed to install SIGTERM handler: {e}"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received ctrl-c"),
        _ = terminate => info!("received SIGTERM"),
    }
}
