mod health;
mod predict;
mod predict_image;

use crate::{
    config::InferenceConfig,
    error::PredictError,
    image_utils::{decode_image, resize_square},
    model_service::ModelService,
    server::SharedState,
    state::LabelState,
};
use axum::{
    body::Bytes,
    extract::Multipart,
    routing::{get, post},
    Router,
};
use image::RgbImage;

const UPLOAD_FIELD: &str = "file";

pub fn api_routes<M: ModelService, S: LabelState>() -> Router<SharedState<M, S>> {
    Router::new()
        .route("/", get(health::root::<M, S>))
        .route("/status", get(health::status))
        .route("/predict", post(predict::predict::<M, S>))
        .route("/predict/", post(predict::predict::<M, S>))
        .route("/predict/image", post(predict_image::predict_image::<M, S>))
        .route("/predict/image/", post(predict_image::predict_image::<M, S>))
}

/// Returns the bytes of the `file` field; other fields are skipped.
pub(crate) async fn read_upload(mut multipart: Multipart) -> Result<Bytes, PredictError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let file_name = field.file_name().unwrap_or("<unnamed>").to_string();
        let data = field.bytes().await?;
        if data.is_empty() {
            return Err(PredictError::EmptyFile);
        }
        tracing::debug!("Received upload {} ({} bytes)", file_name, data.len());
        return Ok(data);
    }

    Err(PredictError::MissingFile)
}

pub(crate) fn load_upload(
    upload: &[u8],
    inference_config: &InferenceConfig,
) -> Result<RgbImage, PredictError> {
    let image = decode_image(upload).map_err(PredictError::Decode)?;
    Ok(resize_square(image, inference_config.resize))
}
