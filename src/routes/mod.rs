pub mod health;
pub mod metrics;
pub mod predict;

use crate::server::SharedState;
use axum::{
    routing::{get, post},
    Router,
};

pub fn api_routes() -> Router<SharedState> {
    Router::new()
        .route("/health", get(health::healthcheck))
        .route("/predict", post(predict::predict))
        .route("/metrics", get(metrics::metrics_handler))
}
