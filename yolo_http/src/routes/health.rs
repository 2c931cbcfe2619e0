use crate::{model_service::ModelService, server::SharedState, state::LabelState};
use axum::{
    extract::State,
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize)]
pub struct Message {
    message: String,
}

#[derive(Serialize, Deserialize)]
pub struct Status {
    status: String,
}

pub async fn root<M: ModelService, S: LabelState>(
    State(state): State<SharedState<M, S>>,
) -> impl IntoResponse {
    Json(Message {
        message: format!("{} is running", state.service_name),
    })
}

pub async fn status() -> impl IntoResponse {
    Json(Status {
        status: "Server is up and running!".into(),
    })
}
