//! Dotfile HTTP API
//!
//! Exposes a [`SqliteStore`] over the JSON sync protocol used by the
//! `dotfile` client.

pub mod api;

pub use api::{handle_api_request, status_for, ApiRequest};

use bytes::Bytes;
use dotfile_core::{ErrorBody, SqliteStore};
use http_body_util::{BodyExt, Full, Limited};
use hyper::body::Incoming;
use hyper::header::AUTHORIZATION;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Prefix every API route lives under
pub const API_PREFIX: &str = "/api/v1";

/// API server configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Maximum request body size (bytes)
    pub max_body_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_body_size: 10 * 1024 * 1024, // 10 MB
        }
    }
}

/// API request handler
pub struct ApiHandler {
    store: Arc<SqliteStore>,
    config: Config,
}

impl ApiHandler {
    pub fn new(store: Arc<SqliteStore>) -> Self {
        Self::with_config(store, Config::default())
    }

    pub fn with_config(store: Arc<SqliteStore>, config: Config) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &Arc<SqliteStore> {
        &self.store
    }

    /// Handle an incoming HTTP request
    pub async fn handle(&self, req: Request<Incoming>) -> Response<Full<Bytes>> {
        let (parts, body) = req.into_parts();
        tracing::debug!("Request: {} {}", parts.method, parts.uri);

        let Some(path) = parts.uri.path().strip_prefix(API_PREFIX) else {
            return api::json_error(
                StatusCode::NOT_FOUND,
                &ErrorBody {
                    error: format!("no such path {}", parts.uri.path()),
                    kind: "not_found".into(),
                    ..ErrorBody::default()
                },
            );
        };

        let body = match Limited::new(body, self.config.max_body_size).collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) => {
                tracing::warn!("Failed to read request body: {}", e);
                return api::json_error(
                    StatusCode::PAYLOAD_TOO_LARGE,
                    &ErrorBody {
                        error: format!("request body rejected: {}", e),
                        kind: "validation".into(),
                        ..ErrorBody::default()
                    },
                );
            }
        };

        let authorization = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok());
        let request = ApiRequest {
            method: parts.method.as_str(),
            path,
            query: parts.uri.query().unwrap_or(""),
            authorization,
            body: &body,
        };
        let response = handle_api_request(&request, &self.store).await;
        tracing::debug!("Response: {}", response.status());
        response
    }
}

/// Accept connections on `listener` until it fails
pub async fn serve(listener: TcpListener, handler: Arc<ApiHandler>) -> std::io::Result<()> {
    loop {
        let (stream, peer) = listener.accept().await?;
        let handler = handler.clone();
        let io = TokioIo::new(stream);

        tokio::spawn(async move {
            let service = service_fn(move |req| {
                let handler = handler.clone();
                async move { Ok::<_, hyper::Error>(handler.handle(req).await) }
            });
            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                tracing::error!("Error serving connection from {}: {:?}", peer, e);
            }
        });
    }
}
