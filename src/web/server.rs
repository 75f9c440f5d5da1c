use std::future::Future;
use std::sync::Arc;

use axum::{routing::delete, routing::get, routing::post, routing::put, Router};
use parking_lot::RwLock;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::config::Config;
use crate::orbit::TleCatalog;
use crate::service::SatellitePositionService;

use super::api::satellites as satellite_handlers;
use super::api_doc::ApiDoc;
use super::auth::AppState;

pub fn router(
    config: Arc<Config>,
    service: Arc<SatellitePositionService>,
    catalog: Arc<RwLock<TleCatalog>>,
) -> Router {
    let state = AppState {
        config,
        service,
        catalog,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Position endpoints
        .route(
            "/api/satellites/positions",
            get(satellite_handlers::list_positions),
        )
        .route(
            "/api/satellites/positions/batch",
            post(satellite_handlers::batch_update),
        )
        .route(
            "/api/satellites/in-range",
            get(satellite_handlers::in_range),
        )
        .route(
            "/api/satellites/{id}/position",
            get(satellite_handlers::get_position),
        )
        .route(
            "/api/satellites/{id}/position/refresh",
            post(satellite_handlers::refresh_position),
        )
        // Trajectory endpoints
        .route(
            "/api/satellites/{id}/trajectory",
            get(satellite_handlers::trajectory).post(satellite_handlers::propagate),
        )
        // Events and cache management
        .route(
            "/api/satellites/{id}/events",
            get(satellite_handlers::events),
        )
        .route(
            "/api/satellites/{id}/cache",
            delete(satellite_handlers::invalidate),
        )
        .route("/api/satellites/tle", put(satellite_handlers::update_tle))
        .route("/api/stats", get(satellite_handlers::stats))
        // OpenAPI / Swagger
        .merge(SwaggerUi::new("/swagger-ui").url("/api-doc/openapi.json", ApiDoc::openapi()))
        // Middleware
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run_server(
    config: Arc<Config>,
    service: Arc<SatellitePositionService>,
    catalog: Arc<RwLock<TleCatalog>>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let bind_addr = config.web.bind.clone();
    let app = router(config, service, catalog);

    log::info!("Starting server on {}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
}
