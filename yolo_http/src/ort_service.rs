use crate::{
    config::{ModelConfig, Validatable},
    detection::BoundingBox,
    model_service::{InferenceError, ModelService},
};
use async_trait::async_trait;
use image::{imageops::FilterType, RgbImage};
use ndarray::{Array, ArrayD, ArrayView2, Axis, Ix2, Ix4, IxDyn};
use ort::{
    session::{builder::GraphOptimizationLevel, Session},
    value::TensorRef,
};
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};

const OUTPUT_NAME: &str = "output0";

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

/// Resizes to the model's square input and lays the pixels out as normalised NCHW.
fn transform_image(image: &RgbImage, input_size: u32) -> Array<f32, Ix4> {
    let resized;
    let img = if image.dimensions() == (input_size, input_size) {
        image
    } else {
        resized = image::imageops::resize(image, input_size, input_size, FilterType::CatmullRom);
        &resized
    };

    let side = input_size as usize;
    let mut input = Array::zeros((1, 3, side, side));
    for (x, y, pixel) in img.enumerate_pixels() {
        let x = x as usize;
        let y = y as usize;
        let [r, g, b] = pixel.0;
        input[[0, 0, y, x]] = (r as f32) / 255.;
        input[[0, 1, y, x]] = (g as f32) / 255.;
        input[[0, 2, y, x]] = (b as f32) / 255.;
    }

    input
}

/// Decodes `[anchors, 4 + classes (+ mask coefficients)]` rows into boxes scaled to
/// an `img_width`x`img_height` image. Columns past `num_classes` are ignored.
fn decode_output(
    output: ArrayView2<f32>,
    num_classes: usize,
    min_probability: f32,
    input_size: u32,
    img_width: u32,
    img_height: u32,
) -> Vec<BoundingBox> {
    let scale_x = img_width as f32 / input_size as f32;
    let scale_y = img_height as f32 / input_size as f32;
    let max_x = img_width as f32;
    let max_y = img_height as f32;

    let mut boxes = Vec::new();
    for row in output.axis_iter(Axis(0)) {
        let best = row
            .iter()
            .skip(4)
            .take(num_classes)
            .copied()
            .enumerate()
            .reduce(|accum, item| if item.1 > accum.1 { item } else { accum });

        let Some((class_id, prob)) = best else {
            continue;
        };
        if prob.is_nan() || prob < min_probability {
            continue;
        }

        let xc = row[0] * scale_x;
        let yc = row[1] * scale_y;
        let w = row[2].abs() * scale_x;
        let h = row[3].abs() * scale_y;

        boxes.push(BoundingBox {
            class_id,
            confidence: prob.clamp(0., 1.),
            x1: (xc - w / 2.).clamp(0., max_x),
            y1: (yc - h / 2.).clamp(0., max_y),
            x2: (xc + w / 2.).clamp(0., max_x),
            y2: (yc + h / 2.).clamp(0., max_y),
        });
    }

    boxes
}

/// Greedy per-class suppression; the result is ordered by descending confidence.
fn non_max_suppression(mut boxes: Vec<BoundingBox>, iou_threshold: f32) -> Vec<BoundingBox> {
    boxes.sort_by(|box1, box2| box2.confidence.total_cmp(&box1.confidence));

    let mut result = Vec::new();
    while !boxes.is_empty() {
        let best = boxes.remove(0);
        boxes.retain(|candidate| {
            candidate.class_id != best.class_id || iou(&best, candidate) < iou_threshold
        });
        result.push(best);
    }

    result
}

#[derive(Clone)]
pub struct OrtModelService {
    sessions: Arc<Vec<Arc<Mutex<Session>>>>,
    counter: Arc<AtomicUsize>,
    num_classes: usize,
    input_size: u32,
    min_probability: f32,
    iou_threshold: f32,
}

impl OrtModelService {
    pub fn new(
        model_config: &ModelConfig,
        num_classes: usize,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let num_instances = model_config.num_instances.max(1);
        let sessions = (0..num_instances)
            .map(|_| {
                let session = Session::builder()?
                    .with_optimization_level(GraphOptimizationLevel::Level3)?
                    .commit_from_file(model_config.get_path())?;
                Ok(Arc::new(Mutex::new(session)))
            })
            .collect::<Result<Vec<_>, ort::Error>>()?;

        tracing::info!(
            "Created {} ONNX sessions from {:?}",
            num_instances,
            model_config.get_path()
        );

        Ok(Self {
            sessions: Arc::new(sessions),
            counter: Arc::new(AtomicUsize::new(0)),
            num_classes,
            input_size: model_config.input_size,
            min_probability: model_config.min_probability,
            iou_threshold: model_config.iou_threshold,
        })
    }

    pub fn run_inference(&self, input: &Array<f32, Ix4>) -> Result<ArrayD<f32>, InferenceError> {
        let index = self.counter.fetch_add(1, Ordering::SeqCst) % self.sessions.len();
        let mut session = self.sessions[index]
            .lock()
            .map_err(|e| InferenceError::PoisonedSession(e.to_string()))?;

        tracing::debug!("Handling request with session {}", index);
        let owned_buffer;
        let input_view = if input.view().is_standard_layout() {
            input.view()
        } else {
            owned_buffer = input.as_standard_layout().into_owned();
            owned_buffer.view()
        };

        let tensor_ref = TensorRef::from_array_view(input_view)
            .map_err(|e| InferenceError::Tensor(e.to_string()))?;

        let outputs = session
            .run(ort::inputs![tensor_ref])
            .map_err(|e| InferenceError::Run(e.to_string()))?;

        let (shape, data) = outputs[OUTPUT_NAME]
            .try_extract_tensor::<f32>()
            .map_err(|e| InferenceError::Output(e.to_string()))?;

        let dims: Vec<usize> = shape.iter().map(|&d| d as usize).collect();
        ArrayD::from_shape_vec(IxDyn(&dims), data.to_vec())
            .map_err(|e| InferenceError::Output(format!("invalid tensor shape: {}", e)))
    }
}

#[async_trait]
impl ModelService for OrtModelService {
    async fn predict(&self, image: &RgbImage) -> Result<Vec<BoundingBox>, InferenceError> {
        let (img_width, img_height) = image.dimensions();
        let input = transform_image(image, self.input_size);

        let outputs = self.run_inference(&input)?;
        if outputs.ndim() != 3 || outputs.shape()[0] != 1 || outputs.shape()[1] < 5 {
            return Err(InferenceError::Output(format!(
                "expected [1, features, anchors], got {:?}",
                outputs.shape()
            )));
        }

        // [1, features, anchors] -> [anchors, features]
        let output = outputs
            .index_axis(Axis(0), 0)
            .into_dimensionality::<Ix2>()
            .map_err(|e| InferenceError::Output(e.to_string()))?
            .reversed_axes();

        let boxes = decode_output(
            output,
            self.num_classes,
            self.min_probability,
            self.input_size,
            img_width,
            img_height,
        );

        Ok(non_max_suppression(boxes, self.iou_threshold))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb};
    use ndarray::array;

    fn bbox(class_id: usize, confidence: f32, x1: f32, y1: f32, x2: f32, y2: f32) -> BoundingBox {
        BoundingBox {
            class_id,
            confidence,
            x1,
            y1,
            x2,
            y2,
        }
    }

    #[test]
    fn test_transform_image() {
        let img = ImageBuffer::<Rgb<u8>, Vec<u8>>::from_pixel(100, 50, Rgb([255, 0, 0]));

        let input = transform_image(&img, 640);

        assert_eq!(input.shape(), &[1, 3, 640, 640]);
        assert!((input[[0, 0, 320, 320]] - 1.0).abs() < 1e-3);
        assert!(input[[0, 1, 320, 320]].abs() < 1e-3);
    }

    #[test]
    fn test_decode_output_scales_and_filters() {
        // Two anchors, two classes, two trailing mask coefficients.
        let output = array![
            [320.0, 320.0, 64.0, 128.0, 0.1, 0.9, 5.0, 5.0],
            [100.0, 100.0, 10.0, 10.0, 0.1, 0.2, 9.0, 9.0],
        ];

        let boxes = decode_output(output.view(), 2, 0.25, 640, 1280, 320);

        assert_eq!(boxes.len(), 1);
        let b = boxes[0];
        assert_eq!(b.class_id, 1);
        assert!((b.confidence - 0.9).abs() < 1e-6);
        assert!((b.x1 - 576.0).abs() < 1e-3);
        assert!((b.x2 - 704.0).abs() < 1e-3);
        assert!((b.y1 - 128.0).abs() < 1e-3);
        assert!((b.y2 - 192.0).abs() < 1e-3);
    }

    #[test]
    fn test_decode_output_drops_nan_scores() {
        let output = array![
            [320.0, 320.0, 64.0, 64.0, f32::NAN, 0.1],
            [100.0, 100.0, 10.0, 10.0, 0.1, 0.6],
        ];

        let boxes = decode_output(output.view(), 2, 0.25, 640, 640, 640);

        assert_eq!(boxes.len(), 1);
        assert_eq!(boxes[0].class_id, 1);
        assert!(boxes[0].confidence.is_finite());
    }

    #[test]
    fn test_decode_output_clamps_to_image() {
        let output = array![[5.0, 5.0, 40.0, 40.0, 0.8]];

        let boxes = decode_output(output.view(), 1, 0.25, 640, 640, 640);

        assert_eq!(boxes.len(), 1);
        assert_eq!(boxes[0].x1, 0.0);
        assert_eq!(boxes[0].y1, 0.0);
        assert!(boxes[0].x1 <= boxes[0].x2 && boxes[0].y1 <= boxes[0].y2);
    }

    #[test]
    fn test_non_max_suppression() {
        let boxes = vec![
            bbox(0, 0.6, 0.0, 0.0, 100.0, 100.0),
            bbox(0, 0.9, 5.0, 5.0, 105.0, 105.0),
            bbox(1, 0.7, 5.0, 5.0, 105.0, 105.0),
            bbox(0, 0.5, 300.0, 300.0, 400.0, 400.0),
        ];

        let result = non_max_suppression(boxes, 0.7);

        assert_eq!(result.len(), 3);
        assert_eq!(result[0].confidence, 0.9);
        assert_eq!(result[1].class_id, 1);
        assert_eq!(result[2].confidence, 0.5);
    }

    #[test]
    fn test_non_max_suppression_keeps_degenerate_boxes_finite() {
        let boxes = vec![
            bbox(0, 0.9, 10.0, 10.0, 10.0, 10.0),
            bbox(0, 0.8, 10.0, 10.0, 10.0, 10.0),
        ];

        let result = non_max_suppression(boxes, 0.7);

        assert_eq!(result.len(), 2);
    }
}
