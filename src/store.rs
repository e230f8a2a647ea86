use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use futures::stream::TryStreamExt;
use object_store::{
    http::HttpBuilder, local::LocalFileSystem, path::Path as ObjectPath, ClientOptions,
    ObjectStore,
};
use reqwest::{header::CONTENT_LENGTH, StatusCode};
use tokio::io::AsyncWriteExt;
use url::Url;

use crate::error::FetchError;

/// What a probe learned about one remote file. Never cached: the answer
/// changes as the producer publishes new forecast hours.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteProbe {
    /// The server answered 200 with this `Content-Length`.
    Available { content_length: u64 },
    /// The server answered anything but 200 (usually 404), the file is not
    /// (or no longer) published.
    Missing,
}

/// The source forecast files are mirrored from.
#[async_trait]
pub trait Remote: Send + Sync {
    async fn probe(&self, location: &ObjectPath) -> Result<RemoteProbe, FetchError>;

    /// Fetches the whole file into `local`, replacing anything already
    /// there. Returns the number of bytes written.
    async fn download(&self, location: &ObjectPath, local: &Path) -> Result<u64, FetchError>;
}

/// Accepts absolute urls as well as plain local paths, which must exist.
pub fn parse_store_url<S: AsRef<str>>(store_url: S) -> Result<Url, FetchError> {
    let store_url = store_url.as_ref();
    match Url::parse(store_url) {
        Ok(url) => Ok(url),
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            let absolute_path = std::fs::canonicalize(store_url)?;

            Url::from_directory_path(&absolute_path).map_err(|_| {
                FetchError::InvalidStore(format!(
                    "{} is not a directory path",
                    absolute_path.display()
                ))
            })
        }
        Err(e) => Err(e.into()),
    }
}

pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Default)]
pub struct StoreOptions {
    /// Limit on a whole request, body included. `None` lets a download take
    /// as long as it needs; connecting is still bounded by [`CONNECT_TIMEOUT`].
    pub request_timeout: Option<Duration>,
}

pub fn new(store_url: &Url, options: &StoreOptions) -> Result<Store, anyhow::Error> {
    match store_url.scheme() {
        "http" | "https" => {
            let mut client_options = ClientOptions::new()
                .with_allow_http(true)
                .with_connect_timeout(CONNECT_TIMEOUT);
            let mut probe_client = reqwest::Client::builder().connect_timeout(CONNECT_TIMEOUT);
            match options.request_timeout {
                Some(timeout) => {
                    client_options = client_options.with_timeout(timeout);
                    probe_client = probe_client.timeout(timeout);
                }
                None => client_options = client_options.with_timeout_disabled(),
            }

            let store = HttpBuilder::new()
                .with_url(store_url.as_str())
                .with_client_options(client_options)
                .build()
                .with_context(|| format!("Invalid store URL: {}", store_url))?;
            let client = probe_client.build().context("building http client")?;

            Ok(Store {
                store: Arc::new(store),
                http: Some(HttpProbe {
                    client,
                    root: store_url.clone(),
                }),
            })
        }
        "file" => {
            let path = store_url
                .to_file_path()
                .map_err(|_| anyhow::anyhow!("Invalid file URL: {}", store_url))?;
            let store = LocalFileSystem::new_with_prefix(&path).context("new local store")?;

            Ok(Store {
                store: Arc::new(store),
                http: None,
            })
        }
        _ => Err(anyhow::anyhow!("Unsupported scheme: {}", store_url.scheme()))?,
    }
}

#[derive(Debug, Clone)]
pub struct Store {
    store: Arc<dyn ObjectStore>,
    http: Option<HttpProbe>,
}

/// HEAD requests made directly, so the status code is seen as is rather than
/// folded into an `object_store` error.
#[derive(Debug, Clone)]
struct HttpProbe {
    client: reqwest::Client,
    root: Url,
}

impl HttpProbe {
    async fn probe(&self, location: &ObjectPath) -> Result<RemoteProbe, FetchError> {
        let url = self.root.join(location.as_ref())?;
        let response = self.client.head(url).send().await?;

        let status = response.status();
        if status != StatusCode::OK {
            log::trace!("HEAD {} answered {}", location, status);
            return Ok(RemoteProbe::Missing);
        }

        // Read the header itself: the body length of a HEAD response is zero.
        let content_length = response
            .headers()
            .get(CONTENT_LENGTH)
            .ok_or_else(|| FetchError::MalformedHeader(format!("no Content-Length for {}", location)))?
            .to_str()
            .ok()
            .and_then(|value| value.trim().parse::<u64>().ok())
            .ok_or_else(|| FetchError::MalformedHeader(format!("bad Content-Length for {}", location)))?;

        Ok(RemoteProbe::Available { content_length })
    }
}

#[async_trait]
impl Remote for Store {
    async fn probe(&self, location: &ObjectPath) -> Result<RemoteProbe, FetchError> {
        if let Some(http) = &self.http {
            return http.probe(location).await;
        }

        match self.store.head(location).await {
            Ok(meta) => Ok(RemoteProbe::Available {
                content_length: meta.size as u64,
            }),
            Err(object_store::Error::NotFound { .. }) => Ok(RemoteProbe::Missing),
            Err(e) => Err(e.into()),
        }
    }

    async fn download(&self, location: &ObjectPath, local: &Path) -> Result<u64, FetchError> {
        let content = self.store.get(location).await?;
        let mut stream = content.into_stream();

        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(local)
            .await?;

        let mut written = 0u64;
        while let Some(chunk) = stream.try_next().await? {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }

        file.sync_all().await?;

        Ok(written)
    }
}
