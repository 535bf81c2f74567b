use std::net::SocketAddr;

use anyhow::Context;
use tokio::sync::watch;

mod app;
mod audit;
mod auth;
mod config;
mod grpc;
mod jobs;
mod state;
mod users;
mod validation;

use crate::{config::AppConfig, grpc::UserServiceServer, state::AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "userhub=debug,axum=info,tower_http=info".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let config = AppConfig::from_env().context("invalid configuration")?;
    let http_addr: SocketAddr = format!("{}:{}", config.host, config.http_port)
        .parse()
        .context("invalid APP_HOST/APP_PORT")?;
    let grpc_addr: SocketAddr = format!("{}:{}", config.host, config.grpc_port)
        .parse()
        .context("invalid APP_HOST/GRPC_PORT")?;

    let (app_state, db) = AppState::init(config).await?;

    sqlx::migrate!("./migrations")
        .run(&db)
        .await
        .context("failed to run migrations")?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        jobs::shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    let counter = jobs::spawn_user_counter(
        app_state.users.clone(),
        app_state.config.user_count_interval,
        shutdown_rx.clone(),
    );

    let grpc_service = grpc::UserGrpcService::new(app_state.users.clone());
    let grpc_shutdown = jobs::wait_for_shutdown(shutdown_rx.clone());
    let grpc_server = async move {
        tracing::info!("grpc listening on {}", grpc_addr);
        tonic::transport::Server::builder()
            .add_service(UserServiceServer::new(grpc_service))
            .serve_with_shutdown(grpc_addr, grpc_shutdown)
            .await
            .context("grpc server failed")?;
        tracing::info!("grpc server stopped");
        anyhow::Ok(())
    };

    let http_server = app::serve(app::build_app(app_state), http_addr, shutdown_rx);

    tokio::try_join!(http_server, grpc_server)?;
    if let Err(e) = counter.await {
        tracing::warn!(error = %e, "user counter task panicked");
    }

    tracing::info!("shutdown complete");
    Ok(())
}
