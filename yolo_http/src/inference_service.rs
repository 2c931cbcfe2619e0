use crate::{
    detection::{BoundingBox, Detection},
    model_service::{InferenceError, ModelService},
    state::LabelState,
};
use image::{Rgb, RgbImage};
use std::sync::Arc;

pub struct InferenceService<M: ModelService, S: LabelState> {
    model_service: Arc<M>,
    service_state: Arc<S>,
}

impl<M: ModelService, S: LabelState> Clone for InferenceService<M, S> {
    fn clone(&self) -> Self {
        Self {
            model_service: self.model_service.clone(),
            service_state: self.service_state.clone(),
        }
    }
}

impl<M: ModelService, S: LabelState> InferenceService<M, S> {
    pub fn new(model_service: M, state: S) -> Self {
        Self {
            model_service: Arc::new(model_service),
            service_state: Arc::new(state),
        }
    }

    fn label(&self, bbox: &BoundingBox) -> Detection {
        match self.service_state.get_labels().get(bbox.class_id) {
            Some(color_label) => Detection::new(bbox, color_label.label.clone(), color_label.color()),
            None => Detection::new(bbox, format!("Unknown class {}", bbox.class_id), Rgb([0, 0, 0])),
        }
    }

    pub async fn detect(&self, image: &RgbImage) -> Result<Vec<Detection>, InferenceError> {
        let boxes = self.model_service.predict(image).await?;

        tracing::debug!("Returning {} detections", boxes.len());
        let detections: Vec<Detection> = boxes.iter().map(|bbox| self.label(bbox)).collect();
        for (i, detection) in detections.iter().enumerate() {
            let [x1, y1, x2, y2] = detection.bbox;
            tracing::debug!(
                "Detection {}: class={}, confidence={:.3}, bbox=({:.1}, {:.1}, {:.1}, {:.1})",
                i,
                detection.class_label,
                detection.confidence,
                x1,
                y1,
                x2,
                y2
            );
        }

        Ok(detections)
    }
}
