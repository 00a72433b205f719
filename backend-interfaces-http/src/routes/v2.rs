use axum::routing::{get, post};
use axum::Router;

use backend_application::AppState;

use crate::handlers::{ingest_handlers, ops_handlers, stream_handlers, visit_handlers};

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/v2/ingest/pings", post(ingest_handlers::ingest_pings))
        .route("/v2/ingest/check-in", post(ingest_handlers::check_in))
        .route("/v2/visits", get(visit_handlers::list_visits))
        .route("/v2/visits/current", get(visit_handlers::current_visit))
        .route("/v2/visits/transitions", get(visit_handlers::list_transitions))
        .route("/v2/visits/stream", get(stream_handlers::visit_stream))
        .route(
            "/v2/ops/detection-settings",
            get(ops_handlers::get_detection_settings).put(ops_handlers::update_detection_settings),
        )
        .route("/v2/ops/places/reload", post(ops_handlers::reload_places))
        .route("/v2/ops/health/live", get(ops_handlers::health_live))
        .route("/v2/ops/health/ready", get(ops_handlers::health_ready))
        .route(
            "/v2/ops/metrics/prometheus",
            get(ops_handlers::metrics_prometheus),
        )
        .with_state(state)
}
