use crate::decode::PixelArray;
use std::path::PathBuf;
use thiserror::Error;

/// One detection as emitted by the model: `[x1, y1, x2, y2, confidence, class_id]`.
pub type RawDetection = [f32; 6];

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("model file does not exist")]
    NotFound(PathBuf),
    #[error("failed to load model: {0}")]
    Load(String),
    #[error("{0}")]
    Inference(String),
}

/// Blocking detection capability shared by every request.
///
/// Implementations must be safe to call from several threads at once; the
/// service calls `predict` from Tokio's blocking pool.
pub trait ModelService: Send + Sync + 'static {
    fn predict(&self, image: &PixelArray) -> Result<Vec<RawDetection>, ModelError>;
}
