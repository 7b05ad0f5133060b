use crate::{
    decode::decode_image,
    error::ClassifyError,
    model_service::{ModelService, RawDetection},
};
use axum::body::Bytes;
use serde::Serialize;
use std::sync::Arc;
use tracing::instrument;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaType {
    Jpeg,
    Png,
}

impl MediaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Jpeg => "image/jpeg",
            MediaType::Png => "image/png",
        }
    }

    /// Accepts exactly `image/jpeg` or `image/png`; anything else, including a
    /// missing content type, is rejected.
    pub fn from_content_type(content_type: Option<&str>) -> Result<Self, ClassifyError> {
        match content_type {
            Some("image/jpeg") => Ok(MediaType::Jpeg),
            Some("image/png") => Ok(MediaType::Png),
            _ => Err(ClassifyError::InvalidMediaType),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionRecord {
    pub class_id: u32,
    pub confidence: f32,
    pub bbox: [f32; 4],
}

impl From<RawDetection> for DetectionRecord {
    fn from([x1, y1, x2, y2, confidence, class_id]: RawDetection) -> Self {
        Self {
            class_id: class_id as u32,
            confidence,
            bbox: [x1, y1, x2, y2],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Predictions {
    pub predictions: Vec<DetectionRecord>,
}

impl Predictions {
    /// Keeps the model's order.
    pub fn from_raw(detections: Vec<RawDetection>) -> Self {
        Self {
            predictions: detections.into_iter().map(DetectionRecord::from).collect(),
        }
    }
}

#[derive(Debug)]
pub struct InferenceService<M: ModelService> {
    model_service: Arc<M>,
}

impl<M: ModelService> Clone for InferenceService<M> {
    fn clone(&self) -> Self {
        Self {
            model_service: Arc::clone(&self.model_service),
        }
    }
}

impl<M: ModelService> InferenceService<M> {
    pub fn new(model_service: M) -> Self {
        Self {
            model_service: Arc::new(model_service),
        }
    }

    /// Decodes the upload and runs the model on the blocking pool.
    #[instrument(skip(self, image_data), fields(bytes = image_data.len()))]
    pub async fn classify(
        &self,
        media_type: MediaType,
        image_data: Bytes,
    ) -> Result<Predictions, ClassifyError> {
        let model_service = Arc::clone(&self.model_service);

        let detections = tokio::task::spawn_blocking(move || {
            let pixels = decode_image(&image_data)?;
            let (height, width, _) = pixels.dim();
            tracing::debug!("Decoded {}x{} {} image", width, height, media_type.as_str());

            Ok::<_, ClassifyError>(model_service.predict(&pixels)?)
        })
        .await
        .map_err(|e| ClassifyError::Processing(e.to_string()))??;

        let predictions = Predictions::from_raw(detections);

        tracing::debug!("Returning {} detections", predictions.predictions.len());
        for (i, detection) in predictions.predictions.iter().enumerate() {
            tracing::debug!(
                "Detection {}: class_id={}, confidence={:.3}, bbox=({:.1}, {:.1}, {:.1}, {:.1})",
                i,
                detection.class_id,
                detection.confidence,
                detection.bbox[0],
                detection.bbox[1],
                detection.bbox[2],
                detection.bbox[3]
            );
        }

        Ok(predictions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{decode::PixelArray, model_service::ModelError};
    use image::{ImageBuffer, Rgb};
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct MockModelService {
        detections: Vec<RawDetection>,
        calls: Arc<AtomicUsize>,
    }

    impl ModelService for MockModelService {
        fn predict(&self, image: &PixelArray) -> Result<Vec<RawDetection>, ModelError> {
            assert_eq!(image.dim().2, 3);
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.detections.clone())
        }
    }

    struct FailingModelService;

    impl ModelService for FailingModelService {
        fn predict(&self, _image: &PixelArray) -> Result<Vec<RawDetection>, ModelError> {
            Err(ModelError::Inference("unexpected output shape [1, 84]".to_string()))
        }
    }

    struct PanickingModelService;

    impl ModelService for PanickingModelService {
        fn predict(&self, _image: &PixelArray) -> Result<Vec<RawDetection>, ModelError> {
            panic!("kernel exploded")
        }
    }

    fn png_bytes() -> Bytes {
        let img = ImageBuffer::<Rgb<u8>, Vec<u8>>::from_pixel(20, 10, Rgb([0, 128, 255]));
        let mut image_data: Vec<u8> = Vec::new();
        img.write_to(&mut Cursor::new(&mut image_data), image::ImageFormat::Png)
            .unwrap();
        Bytes::from(image_data)
    }

    #[test]
    fn test_media_type_allow_list() {
        assert_eq!(
            MediaType::from_content_type(Some("image/jpeg")).unwrap(),
            MediaType::Jpeg
        );
        assert_eq!(
            MediaType::from_content_type(Some("image/png")).unwrap(),
            MediaType::Png
        );
        for rejected in [Some("text/plain"), Some("IMAGE/PNG"), Some("image/gif"), Some(""), None] {
            assert!(matches!(
                MediaType::from_content_type(rejected),
                Err(ClassifyError::InvalidMediaType)
            ));
        }
    }

    #[test]
    fn test_detection_record_from_raw() {
        let record = DetectionRecord::from([1.5, 2.0, 30.25, 40.0, 0.75, 2.0]);

        assert_eq!(
            record,
            DetectionRecord {
                class_id: 2,
                confidence: 0.75,
                bbox: [1.5, 2.0, 30.25, 40.0],
            }
        );
    }

    #[tokio::test]
    async fn test_classify_preserves_model_order() -> Result<(), Box<dyn std::error::Error>> {
        let calls = Arc::new(AtomicUsize::new(0));
        let mock_model = MockModelService {
            detections: vec![
                [200.0, 50.0, 300.0, 200.0, 0.42, 42.0],
                [10.0, 20.0, 100.0, 150.0, 0.95, 7.0],
                [0.0, 0.0, 5.0, 5.0, 0.88, 2.0],
            ],
            calls: calls.clone(),
        };
        let inference_service = InferenceService::new(mock_model);

        let predictions = inference_service
            .classify(MediaType::Png, png_bytes())
            .await?;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let class_ids: Vec<u32> = predictions.predictions.iter().map(|d| d.class_id).collect();
        assert_eq!(class_ids, vec![42, 7, 2]);
        assert_eq!(predictions.predictions[1].bbox, [10.0, 20.0, 100.0, 150.0]);
        assert_eq!(predictions.predictions[0].confidence, 0.42);

        Ok(())
    }

    #[tokio::test]
    async fn test_classify_corrupt_image_is_decode_error() {
        let calls = Arc::new(AtomicUsize::new(0));
        let inference_service = InferenceService::new(MockModelService {
            detections: vec![],
            calls: calls.clone(),
        });

        let result = inference_service
            .classify(MediaType::Jpeg, Bytes::from_static(b"\xff\xd8\xff garbage"))
            .await;

        assert!(matches!(result, Err(ClassifyError::Decode(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_classify_model_failure_is_inference_error() {
        let inference_service = InferenceService::new(FailingModelService);

        let result = inference_service.classify(MediaType::Png, png_bytes()).await;

        match result {
            Err(err @ ClassifyError::Inference(_)) => {
                assert_eq!(err.to_string(), "unexpected output shape [1, 84]")
            }
            other => panic!("expected an inference error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_classify_model_panic_is_processing_error() {
        let inference_service = InferenceService::new(PanickingModelService);

        let result = inference_service.classify(MediaType::Png, png_bytes()).await;

        assert!(matches!(result, Err(ClassifyError::Processing(_))));
    }
}
