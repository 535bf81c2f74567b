//! Per-request audit trail.
//!
//! The middleware records one [`RequestLog`] per HTTP request after the
//! response is built. Writes happen on a detached task with their own deadline,
//! so a slow or broken sink never delays or alters a response.

use std::{
    net::SocketAddr,
    sync::Arc,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use axum::{
    extract::{ConnectInfo, Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use sqlx::PgPool;
use time::OffsetDateTime;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

pub const SINK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct RequestLog {
    pub id: Uuid,
    pub method: String,
    pub path: String,
    pub status: u16,
    pub latency_ms: i64,
    pub client_ip: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: OffsetDateTime,
}

#[async_trait]
pub trait RequestLogSink: Send + Sync {
    async fn write(&self, entry: &RequestLog) -> anyhow::Result<()>;
}

#[derive(Clone)]
pub struct PgRequestLogSink {
    db: PgPool,
}

impl PgRequestLogSink {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl RequestLogSink for PgRequestLogSink {
    async fn write(&self, entry: &RequestLog) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO request_logs (id, method, path, status, latency_ms, client_ip, user_agent, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(entry.id)
        .bind(&entry.method)
        .bind(&entry.path)
        .bind(i32::from(entry.status))
        .bind(entry.latency_ms)
        .bind(&entry.client_ip)
        .bind(&entry.user_agent)
        .bind(entry.created_at)
        .execute(&self.db)
        .await?;
        Ok(())
    }
}

/// Keeps entries in memory for `AppState::fake`.
#[cfg(test)]
#[derive(Clone, Default)]
pub struct MemoryRequestLogSink {
    entries: Arc<tokio::sync::Mutex<Vec<RequestLog>>>,
}

#[cfg(test)]
impl MemoryRequestLogSink {
    pub async fn entries(&self) -> Vec<RequestLog> {
        self.entries.lock().await.clone()
    }
}

#[cfg(test)]
#[async_trait]
impl RequestLogSink for MemoryRequestLogSink {
    async fn write(&self, entry: &RequestLog) -> anyhow::Result<()> {
        self.entries.lock().await.push(entry.clone());
        Ok(())
    }
}

#[derive(Clone)]
pub struct AuditLogger {
    sink: Arc<dyn RequestLogSink>,
    timeout: Duration,
}

impl AuditLogger {
    pub fn new(sink: Arc<dyn RequestLogSink>) -> Self {
        Self {
            sink,
            timeout: SINK_TIMEOUT,
        }
    }

    /// Fire-and-forget write. Failures are logged and dropped.
    pub fn submit(&self, entry: RequestLog) -> JoinHandle<()> {
        let sink = self.sink.clone();
        let timeout = self.timeout;
        tokio::spawn(async move {
            match tokio::time::timeout(timeout, sink.write(&entry)).await {
                Ok(Ok(())) => debug!(request_id = %entry.id, "request log stored"),
                Ok(Err(e)) => warn!(error = %e, path = %entry.path, "failed to store request log"),
                Err(_) => warn!(path = %entry.path, "request log write timed out"),
            }
        })
    }
}

fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> Option<String> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };
    header("x-forwarded-for")
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .or_else(|| header("x-real-ip").map(str::to_string))
        .or_else(|| peer.map(|p| p.ip().to_string()))
}

pub async fn record_requests(
    State(audit): State<AuditLogger>,
    request: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let client_ip = client_ip(request.headers(), peer);
    let user_agent = request
        .headers()
        .get(axum::http::header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let response = next.run(request).await;

    audit.submit(RequestLog {
        id: Uuid::new_v4(),
        method,
        path,
        status: response.status().as_u16(),
        latency_ms: start.elapsed().as_millis() as i64,
        client_ip,
        user_agent,
        created_at: OffsetDateTime::now_utc(),
    });
    response
}
