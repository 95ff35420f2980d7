mod args;

use std::sync::Arc;

use clap::Parser;

use vigil_repo::MemoryConfigRepository;
use vigil_sim::catalog::{default_services, simulated_gpus};
use vigil_sim::state::AppState;

use crate::args::Args;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let otel = vigil_common::telemetry::init_tracing(
        "vigil-sim",
        args.otlp_endpoint.as_deref(),
        args.otlp_token.as_deref(),
    );

    let repo = MemoryConfigRepository::new(simulated_gpus(args.gpus), default_services())
        .with_restart_ticks(args.restart_ticks);
    let st = AppState {
        repo: Arc::new(repo),
        token: args.token.filter(|t| !t.is_empty()),
    };

    let listener = tokio::net::TcpListener::bind(&args.listen_addr).await?;
    tracing::info!(
        addr = %args.listen_addr,
        gpus = args.gpus,
        restart_ticks = args.restart_ticks,
        "simulated backend listening"
    );
    axum::serve(listener, vigil_sim::app(st))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    vigil_common::telemetry::shutdown_tracing(otel);
    Ok(())
}
