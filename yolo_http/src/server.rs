use crate::{
    config::{Config, InferenceConfig},
    inference_service::InferenceService,
    model_service::ModelService,
    routes::api_routes,
    state::LabelState,
};
use axum::{extract::DefaultBodyLimit, Router};
use std::{future::Future, sync::Arc};
use tokio::net::TcpListener;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub struct SharedState<M: ModelService, S: LabelState> {
    pub inference_service: InferenceService<M, S>,
    pub inference_config: InferenceConfig,
    pub service_name: Arc<str>,
}

impl<M: ModelService, S: LabelState> Clone for SharedState<M, S> {
    fn clone(&self) -> Self {
        Self {
            inference_service: self.inference_service.clone(),
            inference_config: self.inference_config.clone(),
            service_name: self.service_name.clone(),
        }
    }
}

impl<M: ModelService, S: LabelState> SharedState<M, S> {
    pub fn new(
        inference_service: InferenceService<M, S>,
        inference_config: InferenceConfig,
        service_name: &str,
    ) -> Self {
        Self {
            inference_service,
            inference_config,
            service_name: Arc::from(service_name),
        }
    }
}

pub fn build_router<M: ModelService, S: LabelState>(
    state: SharedState<M, S>,
    max_upload_bytes: usize,
) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(api_routes())
        .with_state(state)
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

pub struct HttpServer {
    router: Router,
    listener: TcpListener,
}

impl HttpServer {
    pub async fn new<M: ModelService, S: LabelState>(
        inference_service: InferenceService<M, S>,
        config: &Config,
    ) -> anyhow::Result<Self> {
        let addr = config.server.get_address();

        let app_state = SharedState::new(
            inference_service,
            config.inference.clone(),
            &config.server.service_name,
        );
        let router = build_router(app_state, config.server.max_upload_bytes);

        let listener = TcpListener::bind(&addr).await?;

        Ok(Self { router, listener })
    }

    pub async fn run(self, shutdown: impl Future<Output = ()> + Send + 'static) -> anyhow::Result<()> {
        tracing::info!("Starting app on {}", self.listener.local_addr()?);

        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await?;

        Ok(())
    }
}
