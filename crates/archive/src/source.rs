//! Where hourly archives come from.

use crate::error::{ErrorKind, Result};
use async_trait::async_trait;
use exn::ResultExt;
use futures::StreamExt;
use reqwest::{Client, StatusCode};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;

pub const ARCHIVE_EXTENSION: &str = ".json.gz";

/// Fetches one hourly archive, by name, into a local file.
#[async_trait]
pub trait ArchiveSource: Send + Sync {
    /// Human-readable location, for logging.
    fn location(&self) -> String;

    /// Download the archive `name` (without extension) to `destination`,
    /// returning the number of bytes written.
    ///
    /// A missing archive raises [`ErrorKind::Unavailable`].
    async fn download(&self, name: &str, destination: &Path) -> Result<u64>;
}

pub type SourceHandle = Arc<dyn ArchiveSource + Send + Sync>;

/// Archives served over HTTP at `{base_url}/{name}.json.gz`.
#[derive(Debug, Clone)]
pub struct HttpArchiveSource {
    client: Client,
    base_url: String,
}

impl HttpArchiveSource {
    pub fn new(base_url: impl Into<String>, user_agent: &str) -> Result<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .build()
            .or_raise(|| ErrorKind::InvalidArgument("user agent"))?;
        Ok(Self::with_client(client, base_url))
    }

    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    pub fn url(&self, name: &str) -> String {
        format!("{}/{name}{ARCHIVE_EXTENSION}", self.base_url)
    }
}

#[async_trait]
impl ArchiveSource for HttpArchiveSource {
    fn location(&self) -> String {
        self.base_url.clone()
    }

    #[tracing::instrument(level = "debug", skip(self, destination))]
    async fn download(&self, name: &str, destination: &Path) -> Result<u64> {
        let url = self.url(name);
        let download_error = || ErrorKind::Download(name.to_string());
        let response = self.client.get(&url).send().await.or_raise(download_error)?;
        let status = response.status();
        if !status.is_success() {
            exn::bail!(ErrorKind::Unavailable { name: name.to_string(), status: status.as_u16() });
        }

        let mut file = fs::File::create(destination).await.or_raise(|| ErrorKind::Io)?;
        let mut stream = response.bytes_stream();
        let mut written = 0u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.or_raise(download_error)?;
            file.write_all(&chunk).await.or_raise(|| ErrorKind::Io)?;
            written += chunk.len() as u64;
        }
        file.sync_all().await.or_raise(|| ErrorKind::Io)?;
        tracing::debug!(url = %url, bytes = written, "Downloaded archive");
        Ok(written)
    }
}

/// Archives already on disk at `{root}/{name}.json.gz`, for offline runs and
/// local mirrors.
#[derive(Debug, Clone)]
pub struct FileArchiveSource {
    root: PathBuf,
}

impl FileArchiveSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl ArchiveSource for FileArchiveSource {
    fn location(&self) -> String {
        self.root.display().to_string()
    }

    async fn download(&self, name: &str, destination: &Path) -> Result<u64> {
        let source = self.root.join(format!("{name}{ARCHIVE_EXTENSION}"));
        match fs::copy(&source, destination).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                exn::bail!(ErrorKind::Unavailable { name: name.to_string(), status: StatusCode::NOT_FOUND.as_u16() })
            },
            Err(e) => Err(e).or_raise(|| ErrorKind::Io),
        }
    }
}
