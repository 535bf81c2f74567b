use std::net::SocketAddr;

use axum::{middleware, routing::get, Router};
use tokio::sync::watch;
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};

use crate::{audit, jobs::wait_for_shutdown, state::AppState, users};

pub fn build_app(state: AppState) -> Router {
    let request_timeout = state.config.request_timeout;
    Router::new()
        .merge(users::user_routes())
        .route("/health", get(|| async { "ok" }))
        .layer(TimeoutLayer::new(request_timeout))
        .layer(middleware::from_fn_with_state(
            state.audit.clone(),
            audit::record_requests,
        ))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    let method = req.method().clone();
                    let uri = req.uri().clone();
                    tracing::info_span!("http_request", %method, uri = %uri, status = tracing::field::Empty)
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     span: &tracing::Span| {
                        let status = res.status();
                        span.record("status", tracing::field::display(status));
                        let latency_ms = latency.as_millis() as u64;
                        if status.is_server_error() {
                            tracing::error!(%status, latency_ms, "response");
                        } else {
                            tracing::info!(%status, latency_ms, "response");
                        }
                    },
                ),
        )
}

pub async fn serve(app: Router, addr: SocketAddr, shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
    tracing::info!("http listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(wait_for_shutdown(shutdown))
    .await?;
    tracing::info!("http server stopped");
    Ok(())
}
