use crate::{
    detection::PredictionResponse,
    error::PredictError,
    model_service::ModelService,
    routes::{load_upload, read_upload},
    server::SharedState,
    state::LabelState,
};
use axum::{
    extract::{multipart::MultipartRejection, Multipart, State},
    response::Json,
};
use tracing::instrument;

#[instrument(skip(state, multipart))]
pub async fn predict<M: ModelService, S: LabelState>(
    State(state): State<SharedState<M, S>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<PredictionResponse>, PredictError> {
    let upload = read_upload(multipart?).await?;
    let image = load_upload(&upload, &state.inference_config)?;

    let results = state.inference_service.detect(&image).await?;
    tracing::info!("Detected {} objects", results.len());

    Ok(Json(PredictionResponse { results }))
}
