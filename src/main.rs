use anyhow::Result;
use bms_gateway::{api, app, config, telemetry};
use config::Config;
use telemetry::init_tracing;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cfg = Config::load()?;
    let addr = cfg.server.socket_addr()?;

    if cfg.server.host == "0.0.0.0" {
        warn!("REST API bound to 0.0.0.0 and reachable from the network");
    }

    let shutdown = CancellationToken::new();
    let (state, tasks) = app::start(cfg, shutdown.clone()).await?;

    let app = api::router(state);
    info!(%addr, "starting BMS gateway");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(telemetry::shutdown_signal())
        .await?;

    shutdown.cancel();
    for task in tasks {
        if let Err(e) = task.await {
            warn!(error = %e, "background task ended abnormally");
        }
    }

    info!("shutdown complete");
    Ok(())
}
