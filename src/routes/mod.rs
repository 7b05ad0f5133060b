mod classify;
mod health;

use crate::{inference_service::InferenceService, model_service::ModelService};
use axum::{
    routing::{get, post},
    Router,
};

pub use classify::FILE_FIELD;

pub fn api_routes<M: ModelService>() -> Router<InferenceService<M>> {
    Router::new()
        .route("/classify/", post(classify::classify::<M>))
        .route("/health", get(health::healthcheck))
}
