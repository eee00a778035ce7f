//! HTTP server setup.
//!
//! # Responsibilities
//! - Create the Axum router: gated upload routes plus the admin API
//! - Wire up middleware (admission, body limit, timeout, tracing)
//! - Serve with graceful shutdown and live config updates

use arc_swap::ArcSwap;
use axum::{body::Body, middleware, routing::post, Router};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower_http::{limit::RequestBodyLimitLayer, timeout::TimeoutLayer, trace::TraceLayer};

use crate::admission::AdmissionService;
use crate::config::GateConfig;
use crate::http::admin::admin_router;
use crate::http::upload::{admission_middleware, upload_handler};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ArcSwap<GateConfig>>,
    pub admission: Arc<AdmissionService>,
    pub client: Client<HttpConnector, Body>,
}

/// HTTP server for the upload gate.
pub struct GateServer {
    router: Router,
    config: Arc<ArcSwap<GateConfig>>,
}

impl GateServer {
    /// Create a new server with the given configuration.
    pub fn new(config: GateConfig, admission: Arc<AdmissionService>) -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        let config = Arc::new(ArcSwap::from_pointee(config));

        let state = AppState {
            config: Arc::clone(&config),
            admission,
            client,
        };

        let initial = config.load_full();
        let router = Self::build_router(&initial, state);
        Self { router, config }
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(config: &GateConfig, state: AppState) -> Router {
        let uploads = Router::new()
            .route("/api/upload", post(upload_handler))
            .route("/api/upload/{*path}", post(upload_handler))
            .layer(middleware::from_fn_with_state(
                state.clone(),
                admission_middleware,
            ))
            .layer(RequestBodyLimitLayer::new(config.security.max_body_size))
            .with_state(state.clone());

        Router::new()
            .merge(uploads)
            .merge(admin_router(state))
            .layer(TimeoutLayer::new(Duration::from_secs(
                config.timeouts.request_secs,
            )))
            .layer(TraceLayer::new_for_http())
    }

    /// Run the server until the shutdown signal fires.
    ///
    /// Config reloads arriving on `config_updates` are swapped in live;
    /// a changed listener address still requires a restart.
    pub async fn run(
        self,
        listener: TcpListener,
        mut config_updates: mpsc::UnboundedReceiver<GateConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "Upload gate listening");

        let config = Arc::clone(&self.config);
        tokio::spawn(async move {
            while let Some(new_config) = config_updates.recv().await {
                tracing::info!("Configuration reloaded");
                config.store(Arc::new(new_config));
            }
        });

        let app = self
            .router
            .into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
            })
            .await?;

        tracing::info!("Upload gate stopped");
        Ok(())
    }
}
