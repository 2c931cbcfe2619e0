use crate::{image_utils::ImageUtilsError, model_service::InferenceError};
use axum::{
    extract::multipart::{MultipartError, MultipartRejection},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PredictError {
    #[error("No file uploaded")]
    MissingFile,
    #[error("Uploaded file is empty")]
    EmptyFile,
    #[error("Invalid multipart request: {0}")]
    NotMultipart(#[from] MultipartRejection),
    #[error("Invalid multipart request: {0}")]
    Multipart(#[from] MultipartError),
    #[error("Failed to decode image: {0}")]
    Decode(ImageUtilsError),
    #[error("Inference failed: {0}")]
    Inference(#[from] InferenceError),
    #[error("Failed to annotate image: {0}")]
    Annotate(ImageUtilsError),
    #[error("Failed to encode image: {0}")]
    Encode(ImageUtilsError),
    #[error("Http builder failed: {0}")]
    HttpBuilder(String),
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
}

impl PredictError {
    pub fn status(&self) -> StatusCode {
        match self {
            PredictError::MissingFile | PredictError::EmptyFile => StatusCode::BAD_REQUEST,
            PredictError::NotMultipart(rejection) => rejection.status(),
            // Body limit overruns surface here as 413.
            PredictError::Multipart(e) => e.status(),
            PredictError::Decode(_)
            | PredictError::Inference(_)
            | PredictError::Annotate(_)
            | PredictError::Encode(_)
            | PredictError::HttpBuilder(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// What the client gets to see; the detailed error only goes to the logs.
    pub fn public_message(&self) -> &'static str {
        match self {
            PredictError::MissingFile => "No file uploaded",
            PredictError::EmptyFile => "Uploaded file is empty",
            PredictError::Multipart(_) if self.status() == StatusCode::PAYLOAD_TOO_LARGE => {
                "Uploaded file is too large"
            }
            PredictError::NotMultipart(_) | PredictError::Multipart(_) => {
                "Invalid multipart request"
            }
            PredictError::Decode(_) => "Failed to decode image",
            PredictError::Inference(_) => "Inference failed",
            PredictError::Annotate(_) => "Failed to annotate image",
            PredictError::Encode(_) => "Failed to encode image",
            PredictError::HttpBuilder(_) => "Failed to build response",
        }
    }
}

impl IntoResponse for PredictError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("Prediction failed: {}", self);
        } else {
            tracing::warn!("Rejected prediction request: {}", self);
        }

        (
            status,
            Json(ErrorBody {
                error: self.public_message(),
            }),
        )
            .into_response()
    }
}
