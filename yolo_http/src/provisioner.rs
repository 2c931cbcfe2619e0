use crate::config::{ModelConfig, Validatable};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::{fs, io::AsyncWriteExt};

#[derive(Error, Debug)]
pub enum ProvisionError {
    #[error("Model file {0:?} is missing and no download url is configured")]
    Missing(PathBuf),
    #[error("Model download failed: {0}")]
    Download(#[from] reqwest::Error),
    #[error("Failed to write model file: {0}")]
    Io(#[from] std::io::Error),
}

/// Makes sure the weights are on disk, fetching them once if needed.
pub async fn ensure_model(model_config: &ModelConfig) -> Result<PathBuf, ProvisionError> {
    let model_path = model_config.get_path();
    if fs::try_exists(&model_path).await? {
        tracing::info!("Using model file {:?}", model_path);
        return Ok(model_path);
    }

    let Some(url) = model_config.download_url.as_deref() else {
        return Err(ProvisionError::Missing(model_path));
    };

    tracing::info!("Model file {:?} not found, downloading from {}", model_path, url);
    let written = download(url, &model_path).await?;
    tracing::info!("Downloaded {} bytes to {:?}", written, model_path);

    if written < model_config.min_file_size_bytes {
        tracing::warn!(
            "Downloaded model file {:?} is only {} bytes (expected at least {}), it may be corrupted",
            model_path,
            written,
            model_config.min_file_size_bytes
        );
    }

    Ok(model_path)
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    path.with_file_name(name)
}

async fn download(url: &str, destination: &Path) -> Result<u64, ProvisionError> {
    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent).await?;
    }

    let response = reqwest::get(url).await?.error_for_status()?;

    let partial = partial_path(destination);
    let result = async {
        let written = write_body(response, &partial).await?;
        fs::rename(&partial, destination).await?;
        Ok(written)
    }
    .await;

    if result.is_err() {
        if let Err(e) = fs::remove_file(&partial).await {
            tracing::warn!("Failed to remove partial download {:?}: {}", partial, e);
        }
    }
    result
}

async fn write_body(response: reqwest::Response, path: &Path) -> Result<u64, ProvisionError> {
    let mut file = fs::File::create(path).await?;
    let mut written: u64 = 0;
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }

    file.flush().await?;
    file.sync_all().await?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, routing::get, Router};
    use tokio::net::TcpListener;

    fn model_config(dir: &Path, download_url: Option<String>) -> ModelConfig {
        ModelConfig {
            onnx_file: "model.onnx".to_string(),
            model_dir: dir.join("models"),
            download_url,
            min_file_size_bytes: 1024,
            num_instances: 1,
            input_size: 640,
            min_probability: 0.25,
            iou_threshold: 0.7,
        }
    }

    async fn serve_weights() -> String {
        let app = Router::new()
            .route("/weights.onnx", get(|| async { vec![7u8; 64] }))
            .route("/missing.onnx", get(|| async { StatusCode::NOT_FOUND }));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_existing_model_is_used_as_is() {
        let dir = tempfile::tempdir().unwrap();
        let config = model_config(dir.path(), Some("http://127.0.0.1:1/unreachable".into()));
        std::fs::create_dir_all(&config.model_dir).unwrap();
        std::fs::write(config.get_path(), b"weights").unwrap();

        let path = ensure_model(&config).await.unwrap();

        assert_eq!(path, config.get_path());
        assert_eq!(std::fs::read(path).unwrap(), b"weights");
    }

    #[tokio::test]
    async fn test_missing_model_without_url_fails() {
        let dir = tempfile::tempdir().unwrap();
        let config = model_config(dir.path(), None);

        let result = ensure_model(&config).await;

        assert!(matches!(result, Err(ProvisionError::Missing(_))));
    }

    #[tokio::test]
    async fn test_missing_model_is_downloaded() {
        let dir = tempfile::tempdir().unwrap();
        let base = serve_weights().await;
        let config = model_config(dir.path(), Some(format!("{}/weights.onnx", base)));

        // Smaller than min_file_size_bytes: warns but still succeeds.
        let path = ensure_model(&config).await.unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), vec![7u8; 64]);
        assert!(!partial_path(&path).exists());
    }

    #[tokio::test]
    async fn test_failed_rename_leaves_no_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let base = serve_weights().await;
        // A non-empty directory under the target name makes the final rename fail.
        let destination = dir.path().join("model.onnx");
        std::fs::create_dir_all(destination.join("occupied")).unwrap();

        let result = download(&format!("{}/weights.onnx", base), &destination).await;

        assert!(matches!(result, Err(ProvisionError::Io(_))));
        assert!(!partial_path(&destination).exists());
    }

    #[tokio::test]
    async fn test_http_error_fails_download() {
        let dir = tempfile::tempdir().unwrap();
        let base = serve_weights().await;
        let config = model_config(dir.path(), Some(format!("{}/missing.onnx", base)));

        let result = ensure_model(&config).await;

        assert!(matches!(result, Err(ProvisionError::Download(_))));
        assert!(!config.get_path().exists());
    }
}
