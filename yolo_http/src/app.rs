use crate::{
    config::Config,
    inference_service::InferenceService,
    ort_service::OrtModelService,
    provisioner::ensure_model,
    server::HttpServer,
    state::{LabelState, ServiceState},
};
use std::error::Error;
use tokio::signal;

pub async fn start_app(config: Config) -> Result<(), Box<dyn Error>> {
    // Nothing is served until the weights are on disk and loaded.
    if let Err(e) = ensure_model(&config.model).await {
        tracing::error!("Failed to provision model: {}", e);
        return Err(Box::new(e));
    }

    let service_state = match ServiceState::new(&config.labels) {
        Ok(state) => state,
        Err(e) => {
            tracing::error!("Failed to load labels: {}", e);
            return Err(e.into());
        }
    };

    let num_classes = service_state.get_labels().len();
    let ort_model_service = match OrtModelService::new(&config.model, num_classes) {
        Ok(service) => service,
        Err(e) => {
            tracing::error!("Failed to initialize ort model service: {:?}", e);
            return Err(e);
        }
    };
    tracing::info!("Model loaded with {} classes", num_classes);

    let inference_service = InferenceService::new(ort_model_service, service_state);
    let server = HttpServer::new(inference_service, &config).await?;

    server
        .run(async {
            shutdown_signal().await;
            tracing::info!("Shutdown signal received, starting graceful shutdown");
        })
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
