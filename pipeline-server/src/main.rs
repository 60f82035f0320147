use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;
use pipeline_core::Config;
use pipeline_server::routes;
use pipeline_server::state::AppState;

/// HTTP edge for the media-extraction pipeline.
#[derive(Parser, Debug)]
#[command(name = "pipelined", version, about)]
struct Cli {
    /// Overrides PORT from the environment.
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() {
    env_logger::init();

    let cli = Cli::parse();
    let mut config = Config::from_env();
    if let Some(port) = cli.port {
        config.port = port;
    }

    let state = AppState::new(config);
    state.bus.clone().spawn_gc();
    spawn_scheduler_gc(state.scheduler.clone());

    let addr: SocketAddr = ([0, 0, 0, 0], state.config.port).into();
    let app = routes::build(state);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            log::error!("failed to bind {addr}: {e}");
            std::process::exit(1);
        }
    };

    log::info!("pipelined listening on http://{addr}");

    let result = axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await;

    if let Err(e) = result {
        log::error!("server error: {e}");
        std::process::exit(1);
    }
}

fn spawn_scheduler_gc(scheduler: std::sync::Arc<pipeline_core::Scheduler>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(5 * 60));
        loop {
            interval.tick().await;
            scheduler.gc();
        }
    });
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    log::info!("shutdown signal received, draining in-flight requests");
}
