//! ---
//! logd_section: "05-networking-external-interfaces"
//! logd_subsection: "module"
//! logd_type: "source"
//! logd_scope: "code"
//! logd_description: "HTTP API for log ingestion and retrieval."
//! logd_version: "v0.1.0"
//! logd_owner: "platform-observability"
//! ---

use std::fmt;
use std::net::{SocketAddr, TcpListener as StdTcpListener};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::http::{header, HeaderName, HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use logd_common::ApiConfig;
use logd_persistence::Ingestor;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

mod error;
mod handlers;

pub use error::ApiError;

const CORS_MAX_AGE: Duration = Duration::from_secs(300);

/// Shared state handed to every handler.
pub struct ApiState {
    ingestor: Ingestor,
}

impl ApiState {
    pub fn new(ingestor: Ingestor) -> Self {
        Self { ingestor }
    }

    pub(crate) fn ingestor(&self) -> &Ingestor {
        &self.ingestor
    }
}

impl fmt::Debug for ApiState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiState")
            .field("ingestor", &self.ingestor)
            .finish()
    }
}

/// Handle to the running API server.
#[derive(Debug)]
pub struct ApiServer {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<Result<()>>,
}

impl ApiServer {
    /// Address the listener is bound to. Differs from the requested one when
    /// port 0 was used.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Stop accepting connections, let in-flight requests finish, and wait.
    pub async fn shutdown(mut self) -> Result<()> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        match self.task.await {
            Ok(result) => result,
            Err(err) => Err(err.into()),
        }
    }
}

/// Build the router with every route and middleware layer.
pub fn router(state: Arc<ApiState>, config: &ApiConfig) -> Result<Router> {
    let routes = Router::new()
        .route("/log", post(handlers::post_log))
        .route("/logs", get(handlers::get_logs_by_service))
        .route("/logs/all", get(handlers::get_all_logs))
        .route("/ping", get(handlers::ping))
        .route("/metrics", get(handlers::metrics))
        .with_state(state);

    Ok(routes
        .layer(CatchPanicLayer::new())
        .layer(cors_layer(config)?)
        .layer(TraceLayer::new_for_http()))
}

fn cors_layer(config: &ApiConfig) -> Result<CorsLayer> {
    let origins = config
        .cors_allowed_origins
        .iter()
        .map(|origin| {
            if origin.trim() == "*" {
                anyhow::bail!(
                    "api.cors_allowed_origins may not contain \"*\": credentialed CORS needs explicit origins"
                );
            }
            HeaderValue::from_str(origin)
                .with_context(|| format!("invalid CORS origin {origin:?}"))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::ACCEPT,
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            HeaderName::from_static("x-csrf-token"),
        ])
        .expose_headers([header::LINK])
        .allow_credentials(true)
        .max_age(CORS_MAX_AGE))
}

/// Bind `addr` and serve the API on a new task.
pub fn spawn_api_server(
    state: Arc<ApiState>,
    config: &ApiConfig,
    addr: SocketAddr,
) -> Result<ApiServer> {
    let router = router(state, config)?;

    let listener = StdTcpListener::bind(addr)
        .with_context(|| format!("failed to bind API listener {addr}"))?;
    listener
        .set_nonblocking(true)
        .context("failed to configure API listener as non-blocking")?;
    let addr = listener
        .local_addr()
        .context("failed to read API listener address")?;
    let tcp_listener =
        TcpListener::from_std(listener).context("failed to create tokio listener")?;

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let task: JoinHandle<Result<()>> = tokio::spawn(async move {
        info!(address = %addr, "api server listening");
        if let Err(err) = axum::serve(tcp_listener, router)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            })
            .await
        {
            error!(address = %addr, error = %err, "api server exited with error");
            return Err(err.into());
        }
        info!(address = %addr, "api server stopped");
        Ok(())
    });

    Ok(ApiServer {
        addr,
        shutdown: Some(shutdown_tx),
        task,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unusable_origin() {
        let config = ApiConfig {
            cors_allowed_origins: vec!["http://ok.example".into(), "bad\norigin".into()],
        };
        assert!(cors_layer(&config).is_err());
    }

    #[test]
    fn wildcard_origin_is_an_error() {
        let config = ApiConfig {
            cors_allowed_origins: vec!["http://ok.example".into(), "*".into()],
        };
        let err = cors_layer(&config).unwrap_err();
        assert!(err.to_string().contains("cors_allowed_origins"));
    }
}
