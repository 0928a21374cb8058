//! Weight artifact acquisition
//!
//! Model files are cached in the configured directory; missing artifacts are
//! fetched once during initialization, trying each configured URL in order.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use tracing::{debug, info, warn};

/// Return the local path of a model artifact, downloading it first if it is
/// not cached yet. Fails only when the artifact is missing and every URL
/// fails, which aborts initialization.
pub async fn ensure_model(dir: &Path, file_name: &str, urls: &[String]) -> Result<PathBuf> {
    let path = dir.join(file_name);
    if path.exists() {
        debug!("Using cached model {}", path.display());
        return Ok(path);
    }

    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create model directory {}", dir.display()))?;

    let client = reqwest::Client::new();
    let mut last_error = None;

    for url in urls {
        info!("Downloading {} from {}", file_name, url);
        match fetch(&client, url).await {
            Ok(bytes) => {
                std::fs::write(&path, &bytes)
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                info!("Downloaded {} ({} bytes)", path.display(), bytes.len());
                return Ok(path);
            }
            Err(e) => {
                warn!("Download of {} from {} failed: {}", file_name, url, e);
                last_error = Some(e);
            }
        }
    }

    Err(last_error
        .unwrap_or_else(|| anyhow!("No download URLs configured for {}", file_name))
        .context(format!("Could not obtain model artifact {}", file_name)))
}

async fn fetch(client: &reqwest::Client, url: &str) -> Result<Vec<u8>> {
    let response = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("Request to {} failed", url))?;

    if !response.status().is_success() {
        bail!("HTTP {}", response.status());
    }

    let bytes = response.bytes().await.context("Failed to read response body")?;
    // An ONNX graph is never this small; treat it as a failed download.
    if bytes.len() < 1024 {
        bail!("Response suspiciously small ({} bytes)", bytes.len());
    }

    Ok(bytes.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cached_artifact_short_circuits() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.onnx");
        std::fs::write(&path, b"cached").unwrap();

        // No URLs configured: only the cache hit can satisfy this.
        let resolved = ensure_model(dir.path(), "model.onnx", &[]).await.unwrap();
        assert_eq!(resolved, path);
    }

    #[tokio::test]
    async fn missing_artifact_without_urls_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let result = ensure_model(dir.path(), "absent.onnx", &[]).await;
        assert!(result.is_err());
    }
}
