use crate::detection::BoundingBox;
use async_trait::async_trait;
use image::RgbImage;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("session mutex poisoned: {0}")]
    PoisonedSession(String),
    #[error("failed to build tensor: {0}")]
    Tensor(String),
    #[error("inference failed: {0}")]
    Run(String),
    #[error("unexpected model output: {0}")]
    Output(String),
}

#[async_trait]
pub trait ModelService: Send + Sync + 'static {
    /// Boxes are in pixel coordinates of `image`.
    async fn predict(&self, image: &RgbImage) -> Result<Vec<BoundingBox>, InferenceError>;
}
