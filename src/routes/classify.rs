use crate::{
    error::ClassifyError,
    inference_service::{InferenceService, MediaType, Predictions},
    model_service::ModelService,
};
use axum::{
    extract::{multipart::MultipartRejection, Multipart, State},
    Json,
};
use tracing::instrument;

/// Name of the multipart part carrying the image.
pub const FILE_FIELD: &str = "file";

#[instrument(skip(service, multipart))]
pub async fn classify<M: ModelService>(
    State(service): State<InferenceService<M>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<Predictions>, ClassifyError> {
    let mut multipart = multipart?;
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        // Checked before the part body is read.
        let media_type = MediaType::from_content_type(field.content_type())?;
        let image_data = field.bytes().await?;

        let predictions = service.classify(media_type, image_data).await?;
        return Ok(Json(predictions));
    }

    Err(ClassifyError::MissingFile)
}
