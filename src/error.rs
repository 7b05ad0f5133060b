use crate::{decode::DecodeError, model_service::ModelError};
use axum::{
    extract::multipart::{MultipartError, MultipartRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClassifyError {
    #[error("Invalid file type. Please upload a JPEG or PNG image.")]
    InvalidMediaType,
    #[error("No file field named 'file' in request")]
    MissingFile,
    #[error(transparent)]
    NotMultipart(#[from] MultipartRejection),
    #[error(transparent)]
    Multipart(#[from] MultipartError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Inference(#[from] ModelError),
    #[error("{0}")]
    Processing(String),
}

impl ClassifyError {
    pub fn status(&self) -> StatusCode {
        match self {
            ClassifyError::InvalidMediaType => StatusCode::BAD_REQUEST,
            ClassifyError::MissingFile => StatusCode::UNPROCESSABLE_ENTITY,
            ClassifyError::NotMultipart(err) => err.status(),
            ClassifyError::Multipart(err) => err.status(),
            ClassifyError::Decode(_)
            | ClassifyError::Inference(_)
            | ClassifyError::Processing(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    detail: String,
}

impl IntoResponse for ClassifyError {
    fn into_response(self) -> Response {
        let status = self.status();
        let detail = match &self {
            ClassifyError::Decode(_)
            | ClassifyError::Inference(_)
            | ClassifyError::Processing(_) => {
                tracing::error!("Classification failed: {}", self);
                format!("Error during classification: {}", self)
            }
            ClassifyError::NotMultipart(err) => {
                tracing::warn!("Rejected non-multipart request: {}", err);
                err.body_text()
            }
            ClassifyError::Multipart(err) => {
                tracing::warn!("Rejected multipart payload: {}", err);
                err.body_text()
            }
            ClassifyError::InvalidMediaType | ClassifyError::MissingFile => {
                tracing::warn!("Rejected request: {}", self);
                self.to_string()
            }
        };

        (status, Json(ErrorBody { detail })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_invalid_media_type_is_bad_request() {
        let response = ClassifyError::InvalidMediaType.into_response();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(response).await["detail"],
            "Invalid file type. Please upload a JPEG or PNG image."
        );
    }

    #[tokio::test]
    async fn test_server_errors_are_prefixed() {
        let response =
            ClassifyError::Inference(ModelError::Inference("boom".to_string())).into_response();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body_json(response).await["detail"],
            "Error during classification: boom"
        );
    }

    #[tokio::test]
    async fn test_missing_file_is_unprocessable() {
        let response = ClassifyError::MissingFile.into_response();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(
            body_json(response).await["detail"],
            "No file field named 'file' in request"
        );
    }
}
