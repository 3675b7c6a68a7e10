//! Streaming HTTP download as a pollable operation.

use std::path::{Path, PathBuf};

use ocs_jobs::{ProgressHandle, TaskOperation};
use tokio::io::AsyncWriteExt;

/// Build an operation that downloads `url` into `dest`.
///
/// Progress is reported as received bytes over `Content-Length` when the
/// server sends one.
pub fn download_operation(client: reqwest::Client, url: String, dest: PathBuf) -> TaskOperation {
    TaskOperation::new(move |handle| async move {
        download_to(&client, &url, &dest, &handle)
            .await
            .map_err(|e| format!("Download of {url} failed: {e}"))
    })
}

/// Download `url` into `dest`, creating parent directories.
pub async fn download_to(
    client: &reqwest::Client,
    url: &str,
    dest: &Path,
    handle: &ProgressHandle,
) -> Result<(), DownloadError> {
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let mut response = client.get(url).send().await?.error_for_status()?;
    let total = response.content_length();
    let mut file = tokio::fs::File::create(dest).await?;
    let mut received: u64 = 0;

    while let Some(chunk) = response.chunk().await? {
        file.write_all(&chunk).await?;
        received += chunk.len() as u64;
        handle.set_bytes(received, total);
    }
    file.flush().await?;

    tracing::debug!(url, dest = %dest.display(), bytes = received, "Download complete");
    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Last path segment of `url`, used when no filename is given.
pub fn filename_from_url(url: &str) -> Option<String> {
    let parsed = reqwest::Url::parse(url).ok()?;
    parsed
        .path_segments()?
        .filter(|segment| !segment.is_empty())
        .last()
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filename_is_last_path_segment() {
        assert_eq!(
            filename_from_url("https://dl.example.com/files/theme.tar.gz?x=1").as_deref(),
            Some("theme.tar.gz")
        );
        assert_eq!(filename_from_url("https://dl.example.com/"), None);
        assert_eq!(filename_from_url("not a url"), None);
    }
}
