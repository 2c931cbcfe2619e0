use crate::{
    error::PredictError,
    image_utils::{annotate, encode_jpeg},
    model_service::ModelService,
    routes::{load_upload, read_upload},
    server::SharedState,
    state::LabelState,
};
use axum::{
    body::Body,
    extract::{multipart::MultipartRejection, Multipart, State},
    http::header,
    response::Response,
};
use tracing::instrument;

#[instrument(skip(state, multipart))]
pub async fn predict_image<M: ModelService, S: LabelState>(
    State(state): State<SharedState<M, S>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, PredictError> {
    let upload = read_upload(multipart?).await?;
    let mut image = load_upload(&upload, &state.inference_config)?;

    let detections = state.inference_service.detect(&image).await?;
    tracing::info!("Annotating {} objects", detections.len());

    annotate(&mut image, &detections).map_err(PredictError::Annotate)?;
    let annotated_image_data = encode_jpeg(&image, state.inference_config.jpeg_quality)
        .map_err(PredictError::Encode)?;

    Response::builder()
        .header(header::CONTENT_TYPE, "image/jpeg")
        .body(Body::from(annotated_image_data))
        .map_err(|e| PredictError::HttpBuilder(e.to_string()))
}
