//! HTTP surface: router, shared state, request logging.

pub mod error;
pub mod handlers;
pub mod payload;

use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::body::Body;
use axum::http::Request;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, patch, post};
use log::info;
use notion_client::endpoints::Client as NotionClient;

use crate::config::ServerConfig;
use crate::notion_ext::NotionHttp;

#[derive(Debug, thiserror::Error)]
pub enum ServeError {
    #[error("notion client init failed: {0}")]
    NotionClient(#[from] notion_client::NotionClientError),

    #[error("notion http init failed: {0}")]
    NotionHttp(#[from] crate::notion_ext::NotionHttpError),

    #[error("http client init failed: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Process-wide shared state. The Notion clients are the only cross-request
/// resources; conversion state stays per request.
#[derive(Clone)]
pub struct AppState {
    pub notion: NotionClient,
    pub ext: NotionHttp,
    pub http: reqwest::Client,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Result<Self, ServeError> {
        let notion = NotionClient::new(config.notion_token.clone(), None)?;
        let ext = NotionHttp::new(config.notion_token.clone(), config.notion_version.clone())?;
        let http = reqwest::Client::builder().build()?;
        Ok(Self {
            notion,
            ext,
            http,
            config: Arc::new(config),
        })
    }
}

/// Build the service router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/W2N", post(handlers::convert))
        .route("/api/W2N/{pageId}", patch(handlers::update))
        .route("/api/databases/{id}", get(handlers::database_schema))
        .route("/api/health", get(handlers::health))
        .route("/health", get(handlers::health_legacy))
        .route("/api/fetch-and-upload", post(handlers::fetch_and_upload))
        .route("/api/upload-to-notion", post(handlers::upload_to_notion))
        .route("/api/validate", post(handlers::validate))
        .route("/api/compare/{pageId}", post(handlers::compare))
        .route("/api/cleanup/{pageId}", post(handlers::cleanup))
        .layer(middleware::from_fn(log_requests))
        .with_state(state)
}

/// Bind and serve until ctrl-c.
pub async fn serve(state: AppState) -> Result<(), ServeError> {
    let port = state.config.port;
    let app = router(state);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("listening on {addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutdown requested");
    }
}

async fn log_requests(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let started = Instant::now();
    let response = next.run(request).await;
    info!(
        "{method} {path} -> {} in {}ms",
        response.status(),
        started.elapsed().as_millis()
    );
    response
}
