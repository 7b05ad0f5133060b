mod error;
mod routes;

pub mod config;
pub mod decode;
pub mod inference_service;
pub mod logging;
pub mod model_service;
pub mod ort_service;
pub mod server;

pub use error::ClassifyError;
pub use inference_service::{DetectionRecord, InferenceService, MediaType, Predictions};
pub use model_service::{ModelError, ModelService, RawDetection};
pub use routes::FILE_FIELD;
pub use server::{create_router, start_server};
