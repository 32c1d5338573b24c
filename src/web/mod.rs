//! Web server module: HTTP control API and report hosting.

mod handlers;

pub use handlers::*;

use crate::state::AppState;

use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
    Router,
};
use std::future::Future;
use std::net::SocketAddr;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

/// Web server for pingwatch.
pub struct Server {
    state: AppState,
}

impl Server {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    /// Build the router with all routes.
    fn routes(&self) -> Router {
        let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any);

        Router::new()
            .route("/", get(handlers::handle_root))
            // API endpoints
            .route("/api/endpoints", get(handlers::handle_list_endpoints))
            .route("/api/endpoints", post(handlers::handle_add_endpoint))
            .route("/api/endpoints/{endpoint}", delete(handlers::handle_remove_endpoint))
            .route("/api/endpoints/{endpoint}/checks", get(handlers::handle_get_checks))
            .route("/api/log", get(handlers::handle_get_log))
            .route("/api/monitoring", get(handlers::handle_monitoring_status))
            .route("/api/monitoring/start", post(handlers::handle_start_monitoring))
            .route("/api/monitoring/stop", post(handlers::handle_stop_monitoring))
            // Rendered report and its stylesheets
            .nest_service("/reports", ServeDir::new(self.state.renderer.dir()))
            .route("/assets/{*path}", get(handlers::handle_asset))
            .layer(cors)
            .layer(TraceLayer::new_for_http())
            .layer(DefaultBodyLimit::max(64 * 1024))
            .with_state(self.state.clone())
    }

    /// Serve on the configured port until `shutdown` resolves.
    pub async fn start<F>(&self, shutdown: F) -> Result<(), Box<dyn std::error::Error + Send + Sync>>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.state.config.http_port));
        let router = self.routes();

        tracing::info!("Web server listening on {}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await?;

        Ok(())
    }
}
