use anyhow::{bail, Context, Result};
use std::future::Future;
use std::path::{Path, PathBuf};

/// Retrieves a resource by URL or path.
pub trait Fetch: Send + Sync {
    fn fetch(&self, src: &str) -> impl Future<Output = Result<Vec<u8>>> + Send;
}

/// `http(s)://` through reqwest; `file://` and bare paths from disk,
/// relative paths resolved against `base_dir`.
#[derive(Debug, Clone)]
pub struct SourceFetcher {
    client: reqwest::Client,
    base_dir: PathBuf,
}

impl SourceFetcher {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_dir: base_dir.into(),
        }
    }

    fn local_path(&self, src: &str) -> PathBuf {
        let path = Path::new(src.strip_prefix("file://").unwrap_or(src));
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }
}

impl Fetch for SourceFetcher {
    async fn fetch(&self, src: &str) -> Result<Vec<u8>> {
        if src.starts_with("http://") || src.starts_with("https://") {
            tracing::debug!(%src, "fetching over http");
            let response = self.client.get(src).send().await?;
            let status = response.status();
            if !status.is_success() {
                bail!("{} responded with {}", src, status);
            }
            Ok(response.bytes().await?.to_vec())
        } else {
            let path = self.local_path(src);
            tracing::debug!(path = %path.display(), "reading from disk");
            tokio::fs::read(&path)
                .await
                .with_context(|| format!("Failed to read {:?}", path))
        }
    }
}
