//! API server — HTTP router assembly, Swagger UI and metrics exporter.

use crate::rest::{self, AppState};
use crate::swagger::ApiDoc;
use axum::routing::{get, post, put};
use axum::Router;
use rotation_core::config::AppConfig;
use rotation_engine::RotationEngine;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Main API server managing the REST surface.
pub struct ApiServer {
    config: AppConfig,
    engine: Arc<RotationEngine>,
}

impl ApiServer {
    pub fn new(config: AppConfig, engine: Arc<RotationEngine>) -> Self {
        Self { config, engine }
    }

    /// Start the HTTP REST server (blocks until shutdown).
    pub async fn start_http(&self) -> anyhow::Result<()> {
        let state = AppState {
            engine: self.engine.clone(),
            node_id: self.config.node_id.clone(),
            start_time: Instant::now(),
        };

        let app = Router::new()
            // Selection and event recording
            .route(
                "/v1/contexts/:context_id/selection",
                post(rest::handle_selection),
            )
            .route(
                "/v1/contexts/:context_id/candidates/:candidate_id/engagements",
                post(rest::handle_engagement),
            )
            .route(
                "/v1/contexts/:context_id/candidates/:candidate_id/exposures",
                post(rest::handle_exposure),
            )
            // Rotation administration
            .route(
                "/v1/contexts/:context_id/candidates/:candidate_id",
                put(rest::handle_add_candidate).delete(rest::handle_remove_candidate),
            )
            // Operational endpoints
            .route("/health", get(rest::health_check))
            .route("/ready", get(rest::readiness))
            .route("/live", get(rest::liveness))
            // API documentation
            .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
            // Middleware
            .layer(CompressionLayer::new())
            .layer(CorsLayer::permissive())
            .layer(TraceLayer::new_for_http())
            .with_state(state);

        let addr = SocketAddr::new(self.config.api.host.parse()?, self.config.api.http_port);

        info!(addr = %addr, "Starting HTTP server");

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app).await?;

        Ok(())
    }

    /// Start the metrics server on a separate port.
    pub async fn start_metrics(&self) -> anyhow::Result<()> {
        let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
        builder
            .with_http_listener(SocketAddr::new(
                self.config.api.host.parse()?,
                self.config.metrics.port,
            ))
            .install()?;

        info!(port = self.config.metrics.port, "Metrics exporter started");

        Ok(())
    }
}
