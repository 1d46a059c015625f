pub mod dto;
pub mod errors;
pub mod handlers;
pub mod payload;

use std::sync::Arc;

use axum::{
    routing::{delete, get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_axum::router::OpenApiRouter;

use crate::{ingest::IngestService, registry::RegistryService};
use handlers::ApiDoc;

/// Shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub ingest: Arc<IngestService>,
    pub registry: RegistryService,
    pub metrics: PrometheusHandle,
}

pub fn router(state: AppState) -> Router {
    let (router, api) = OpenApiRouter::with_openapi(ApiDoc::openapi())
        .route("/api/esp32/data", post(handlers::ingest_data))
        .route("/api/esp32/register", post(handlers::register_device))
        .route("/api/users", post(handlers::create_user))
        .route("/api/devices", delete(handlers::delete_device))
        .route("/api/measurements", get(handlers::user_measurements))
        .route("/api/measurements/{device_id}", get(handlers::device_measurements))
        .route("/metrics", get(handlers::metrics))
        .route("/health", get(handlers::health))
        .with_state(state)
        .split_for_parts();

    router
        .route(
            "/api-docs/openapi.json",
            get(move || async move { axum::Json(api) }),
        )
        .layer(TraceLayer::new_for_http())
}
