use image::Rgb;
use serde::Serialize;

/// Raw detector output, before class labels are attached.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub class_id: usize,
    pub confidence: f32,
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn area(&self) -> f32 {
        (self.x2 - self.x1).max(0.) * (self.y2 - self.y1).max(0.)
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Detection {
    #[serde(rename = "class")]
    pub class_label: String,
    pub confidence: f32,
    pub bbox: [f32; 4],
    #[serde(skip)]
    pub color: Rgb<u8>,
}

impl Detection {
    pub fn new(bbox: &BoundingBox, class_label: String, color: Rgb<u8>) -> Self {
        Self {
            class_label,
            confidence: bbox.confidence,
            bbox: [bbox.x1, bbox.y1, bbox.x2, bbox.y2],
            color,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PredictionResponse {
    pub results: Vec<Detection>,
}
