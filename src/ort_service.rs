use crate::{
    config::ModelSettings,
    decode::PixelArray,
    model_service::{ModelError, ModelService, RawDetection},
};
use image::{imageops::FilterType, RgbImage};
use ndarray::{Array4, ArrayD, ArrayViewD, Axis, Ix3};
use ort::{
    session::{builder::GraphOptimizationLevel, Session},
    value::TensorRef,
};
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};

const OUTPUT_NAME: &str = "output0";

#[derive(Debug, Clone, Copy, PartialEq)]
struct BoundingBox {
    x1: f32,
    y1: f32,
    x2: f32,
    y2: f32,
    confidence: f32,
    class_id: usize,
}

impl BoundingBox {
    fn area(&self) -> f32 {
        (self.x2 - self.x1).max(0.) * (self.y2 - self.y1).max(0.)
    }

    fn into_raw(self) -> RawDetection {
        [
            self.x1,
            self.y1,
            self.x2,
            self.y2,
            self.confidence,
            self.class_id as f32,
        ]
    }
}

fn intersection(box1: &BoundingBox, box2: &BoundingBox) -> f32 {
    let width = box1.x2.min(box2.x2) - box1.x1.max(box2.x1);
    let height = box1.y2.min(box2.y2) - box1.y1.max(box2.y1);
    width.max(0.) * height.max(0.)
}

fn union(box1: &BoundingBox, box2: &BoundingBox) -> f32 {
    box1.area() + box2.area() - intersection(box1, box2)
}

fn iou(box1: &BoundingBox, box2: &BoundingBox) -> f32 {
    let union = union(box1, box2);
    if union <= 0. {
        return 0.;
    }
    intersection(box1, box2) / union
}

/// Size of the decoded image and of the square network input.
#[derive(Debug, Clone, Copy)]
struct Geometry {
    img_width: f32,
    img_height: f32,
    input_size: f32,
}

/// Resizes the pixel array to the square network input and lays it out as
/// normalised NCHW.
fn transform_pixels(pixels: &PixelArray, input_size: u32) -> Result<Array4<f32>, ModelError> {
    let (height, width, _) = pixels.dim();
    let raw: Vec<u8> = pixels.iter().copied().collect();
    let img = RgbImage::from_raw(width as u32, height as u32, raw).ok_or_else(|| {
        ModelError::Inference(format!(
            "pixel buffer does not match a {}x{} RGB image",
            width, height
        ))
    })?;
    let img = image::imageops::resize(&img, input_size, input_size, FilterType::CatmullRom);

    let size = input_size as usize;
    let mut input = Array4::zeros((1, 3, size, size));
    for (x, y, pixel) in img.enumerate_pixels() {
        let x = x as usize;
        let y = y as usize;
        let [r, g, b] = pixel.0;
        input[[0, 0, y, x]] = (r as f32) / 255.;
        input[[0, 1, y, x]] = (g as f32) / 255.;
        input[[0, 2, y, x]] = (b as f32) / 255.;
    }

    Ok(input)
}

/// Reads a `[1, 4 + classes, anchors]` YOLO head into boxes in original pixel space.
fn parse_output(
    output: ArrayViewD<f32>,
    geometry: Geometry,
    min_probability: f32,
) -> Result<Vec<BoundingBox>, ModelError> {
    let shape = output.shape().to_vec();
    let output = output.into_dimensionality::<Ix3>().map_err(|e| {
        ModelError::Inference(format!("unexpected output shape {:?}: {}", shape, e))
    })?;
    if shape[0] != 1 || shape[1] <= 4 {
        return Err(ModelError::Inference(format!(
            "unexpected output shape {:?}",
            shape
        )));
    }

    let scale_x = geometry.img_width / geometry.input_size;
    let scale_y = geometry.img_height / geometry.input_size;

    let predictions = output.index_axis(Axis(0), 0);
    let mut boxes = Vec::new();

    for anchor in predictions.axis_iter(Axis(1)) {
        let best = anchor
            .iter()
            .skip(4)
            .copied()
            .enumerate()
            .reduce(|accum, row| if row.1 > accum.1 { row } else { accum });
        let Some((class_id, prob)) = best else {
            continue;
        };

        if prob < min_probability {
            continue;
        }

        let xc = anchor[0] * scale_x;
        let yc = anchor[1] * scale_y;
        let w = anchor[2] * scale_x;
        let h = anchor[3] * scale_y;

        boxes.push(BoundingBox {
            x1: (xc - w / 2.).clamp(0., geometry.img_width),
            y1: (yc - h / 2.).clamp(0., geometry.img_height),
            x2: (xc + w / 2.).clamp(0., geometry.img_width),
            y2: (yc + h / 2.).clamp(0., geometry.img_height),
            confidence: prob,
            class_id,
        });
    }

    Ok(boxes)
}

/// Class-aware greedy NMS. The result is ordered by descending confidence.
fn non_max_suppression(
    mut boxes: Vec<BoundingBox>,
    iou_threshold: f32,
    max_detections: usize,
) -> Vec<BoundingBox> {
    boxes.sort_by(|box1, box2| box2.confidence.total_cmp(&box1.confidence));

    let mut result: Vec<BoundingBox> = Vec::new();
    for candidate in boxes {
        if result.len() >= max_detections {
            break;
        }
        let suppressed = result.iter().any(|kept| {
            kept.class_id == candidate.class_id && iou(kept, &candidate) > iou_threshold
        });
        if !suppressed {
            result.push(candidate);
        }
    }

    result
}

fn load_error(e: impl std::fmt::Display) -> ModelError {
    ModelError::Load(e.to_string())
}

fn require_output<T>(value: Option<T>, name: &str) -> Result<T, ModelError> {
    value.ok_or_else(|| ModelError::Inference(format!("model has no output named `{}`", name)))
}

/// Pool of ONNX Runtime sessions for one YOLO model, picked round-robin.
#[derive(Clone)]
pub struct OrtModelService {
    sessions: Arc<Vec<Arc<Mutex<Session>>>>,
    counter: Arc<AtomicUsize>,
    input_size: u32,
    min_probability: f32,
    iou_threshold: f32,
    max_detections: usize,
}

impl OrtModelService {
    pub fn new(model_config: &ModelSettings) -> Result<Self, ModelError> {
        let model_path = model_config.get_model_path();
        if !model_path.is_file() {
            return Err(ModelError::NotFound(model_path));
        }

        if let Err(e) = ort::init().with_name("yolo_classify").commit() {
            tracing::warn!("Failed to configure ONNX Runtime environment: {}", e);
        }

        let num_instances = model_config.num_instances.max(1);
        let sessions = (0..num_instances)
            .map(|_| {
                let session = Session::builder()
                    .map_err(load_error)?
                    .with_optimization_level(GraphOptimizationLevel::Level3)
                    .map_err(load_error)?
                    .with_intra_threads(model_config.intra_threads.max(1))
                    .map_err(load_error)?
                    .commit_from_file(&model_path)
                    .map_err(load_error)?;
                Ok(Arc::new(Mutex::new(session)))
            })
            .collect::<Result<Vec<_>, ModelError>>()?;

        tracing::info!(
            "Created {} ONNX sessions from {}",
            num_instances,
            model_path.display()
        );

        Ok(Self {
            sessions: Arc::new(sessions),
            counter: Arc::new(AtomicUsize::new(0)),
            input_size: model_config.input_size,
            min_probability: model_config.min_probability,
            iou_threshold: model_config.iou_threshold,
            max_detections: model_config.max_detections,
        })
    }

    pub fn run_inference(&self, input: &Array4<f32>) -> Result<ArrayD<f32>, ModelError> {
        let index = self.counter.fetch_add(1, Ordering::Relaxed) % self.sessions.len();
        let mut session = self.sessions[index]
            .lock()
            .map_err(|e| ModelError::Inference(format!("session mutex poisoned: {}", e)))?;

        tracing::debug!("Handling request with session {}", index);
        let tensor_ref = TensorRef::from_array_view(input.view())
            .map_err(|e| ModelError::Inference(format!("failed to build tensor: {}", e)))?;

        let outputs = session
            .run(ort::inputs![tensor_ref])
            .map_err(|e| ModelError::Inference(format!("inference failed: {}", e)))?;

        let output = require_output(outputs.get(OUTPUT_NAME), OUTPUT_NAME)?
            .try_extract_array::<f32>()
            .map_err(|e| ModelError::Inference(format!("failed to extract tensor: {}", e)))?;

        Ok(output.into_owned())
    }
}

impl ModelService for OrtModelService {
    fn predict(&self, image: &PixelArray) -> Result<Vec<RawDetection>, ModelError> {
        let (img_height, img_width, _) = image.dim();
        let input = transform_pixels(image, self.input_size)?;
        let output = self.run_inference(&input)?;

        let geometry = Geometry {
            img_width: img_width as f32,
            img_height: img_height as f32,
            input_size: self.input_size as f32,
        };
        let boxes = parse_output(output.view(), geometry, self.min_probability)?;
        let detections = non_max_suppression(boxes, self.iou_threshold, self.max_detections);

        tracing::debug!("Model returned {} detections", detections.len());

        Ok(detections.into_iter().map(BoundingBox::into_raw).collect())
    }
}
