//! Application startup and lifecycle management.
//!
//! The model is loaded before the listener is bound, so a process that fails
//! to load never accepts traffic.

use crate::config::TextgenConfig;
use crate::handlers;
use crate::services::{InferencePool, T5Generator, TextGenerator};
use axum::{middleware::from_fn, routing::get, Router};
use service_core::error::AppError;
use service_core::middleware::{
    metrics::metrics_middleware,
    tracing::{make_request_span, request_id_middleware},
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::trace::TraceLayer;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: TextgenConfig,
    pub pool: InferencePool,
}

impl AppState {
    pub fn new(config: TextgenConfig, generator: Arc<dyn TextGenerator>) -> Self {
        let pool = InferencePool::new(
            generator,
            config.inference.max_concurrency,
            config.inference.max_queue_depth,
        );
        Self { config, pool }
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::welcome))
        .route("/generate", get(handlers::generate))
        .with_state(state)
        .layer(from_fn(metrics_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(make_request_span::<axum::body::Body>),
        )
        .layer(from_fn(request_id_middleware))
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    router: Router,
}

impl Application {
    /// Load the configured model, then bind the listener.
    pub async fn build(config: TextgenConfig) -> Result<Self, AppError> {
        let settings = config.model.clone();
        tracing::info!(
            model_id = %settings.model_id,
            revision = %settings.revision,
            "Loading model"
        );

        let generator = tokio::task::spawn_blocking(move || T5Generator::load(&settings))
            .await
            .map_err(|e| AppError::InternalError(anyhow::Error::new(e)))?
            .map_err(|e| {
                tracing::error!("Failed to load model: {}", e);
                AppError::InternalError(anyhow::Error::new(e))
            })?;

        Self::build_with_generator(config, Arc::new(generator)).await
    }

    /// Build around an already constructed generator.
    pub async fn build_with_generator(
        config: TextgenConfig,
        generator: Arc<dyn TextGenerator>,
    ) -> Result<Self, AppError> {
        let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
        let state = AppState::new(config, generator);
        let router = build_router(state);

        // Port 0 = random port for testing
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!("Failed to bind TCP listener to {}: {}", addr, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!("Text generation service listening on port {}", port);

        Ok(Self {
            port,
            listener,
            router,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Serve until Ctrl-C or SIGTERM.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(shutdown_signal())
            .await
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
