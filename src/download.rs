use std::future::Future;
use std::path::Path;

use anyhow::{Context, Result};
use tempfile::NamedTempFile;
use tracing::debug;

/// Download `url` into a temporary file and hand its path to `f`.
///
/// The file is owned by this call and removed when it returns, whether the
/// download, `f`, or neither failed.
pub async fn with_temp_download<F, Fut, T>(client: &reqwest::Client, url: &str, f: F) -> Result<T>
where
    F: FnOnce(&Path) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let response = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("Failed to download {url}"))?;

    let status = response.status();
    if !status.is_success() {
        anyhow::bail!("Download of {} failed with status {}", url, status);
    }

    let bytes = response
        .bytes()
        .await
        .with_context(|| format!("Failed to read body of {url}"))?;

    let file = tempfile::Builder::new()
        .prefix("relay-")
        .suffix(&extension_of(url))
        .tempfile()
        .context("Failed to create temporary file")?;
    tokio::fs::write(file.path(), &bytes)
        .await
        .with_context(|| format!("Failed to write {}", file.path().display()))?;

    debug!(
        "Downloaded {} bytes from {} to {}",
        bytes.len(),
        url,
        file.path().display()
    );

    let result = f(file.path()).await;
    close(file);
    result
}

fn close(file: NamedTempFile) {
    let path = file.path().to_path_buf();
    if let Err(e) = file.close() {
        tracing::warn!("Failed to remove temporary file {}: {}", path.display(), e);
    }
}

/// `.ext` of the URL path (query string ignored), or empty.
fn extension_of(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or_default();
    let last = path.rsplit('/').next().unwrap_or_default();
    match last.rsplit_once('.') {
        Some((stem, ext))
            if !stem.is_empty()
                && !ext.is_empty()
                && ext.len() <= 8
                && ext.chars().all(|c| c.is_ascii_alphanumeric()) =>
        {
            format!(".{ext}")
        }
        _ => String::new(),
    }
}
