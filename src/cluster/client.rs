use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use secrecy::{ExposeSecret, SecretString};
use url::Url;

use super::error::ClientError;
use super::resource::{ResourceKind, ResourceList};
use super::transport::HttpWatchTransport;

/// Largest list response accepted (64MB).
const MAX_LIST_SIZE: usize = 64 * 1024 * 1024;

/// Retries for 5xx responses on a list call.
const MAX_RETRIES: u32 = 2;

/// Validate and normalize the API server address.
///
/// Plain HTTP is only allowed for loopback hosts (e.g. `kubectl proxy`).
pub fn parse_server_url(raw: &str) -> Result<Url, ClientError> {
    let url = Url::parse(raw.trim()).map_err(|e| ClientError::InvalidServer(e.to_string()))?;
    match url.scheme() {
        "https" => {}
        "http" => {
            let loopback = matches!(
                url.host_str(),
                Some("localhost") | Some("127.0.0.1") | Some("[::1]")
            );
            if !loopback {
                return Err(ClientError::InvalidServer(format!(
                    "plain http is only allowed for localhost, got {}",
                    url
                )));
            }
        }
        other => {
            return Err(ClientError::InvalidServer(format!(
                "unsupported scheme '{}'",
                other
            )))
        }
    }
    if url.host_str().is_none() {
        return Err(ClientError::InvalidServer("missing host".to_string()));
    }
    Ok(url)
}

/// Remote resource client: lists the raw, unfiltered objects of a kind.
#[derive(Clone)]
pub struct ClusterClient {
    http: reqwest::Client,
    server: Url,
    token: Option<Arc<SecretString>>,
    timeout: Duration,
}

impl ClusterClient {
    pub fn new(server: Url, token: Option<SecretString>, timeout: Duration) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .pool_max_idle_per_host(4)
            .pool_idle_timeout(Duration::from_secs(30))
            .tcp_keepalive(Duration::from_secs(60))
            .build()?;
        Ok(Self {
            http,
            server,
            token: token.map(Arc::new),
            timeout,
        })
    }

    pub fn server(&self) -> &Url {
        &self.server
    }

    /// A watch transport sharing this client's connection pool and credentials.
    pub fn watch_transport(&self) -> HttpWatchTransport {
        HttpWatchTransport::new(
            self.http.clone(),
            self.server.clone(),
            self.token.clone(),
            self.timeout,
        )
    }

    /// List every object of `kind`, optionally scoped to one namespace.
    pub async fn list(
        &self,
        kind: &ResourceKind,
        namespace: Option<&str>,
    ) -> Result<ResourceList, ClientError> {
        let path = kind.path_in(namespace);
        let url = self
            .server
            .join(&path)
            .map_err(|e| ClientError::InvalidServer(e.to_string()))?;

        let mut retry_count = 0;
        let bytes = loop {
            let mut request = self.http.get(url.clone());
            if let Some(token) = &self.token {
                request = request.bearer_auth(token.expose_secret());
            }

            let response = tokio::time::timeout(self.timeout, request.send())
                .await
                .map_err(|_| ClientError::Timeout)?
                .map_err(ClientError::Network)?;

            if response.status().is_server_error() && retry_count < MAX_RETRIES {
                let delay_ms = 250u64 * 2u64.pow(retry_count); // 250ms, 500ms
                tracing::warn!(
                    path = %path,
                    status = %response.status(),
                    retry = retry_count,
                    delay_ms = delay_ms,
                    "Server error listing resources, retrying"
                );
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                retry_count += 1;
                continue;
            }

            if !response.status().is_success() {
                return Err(ClientError::HttpStatus(response.status().as_u16()));
            }

            break read_limited_bytes(response, MAX_LIST_SIZE).await?;
        };

        let list: ResourceList = serde_json::from_slice(&bytes)?;
        tracing::debug!(path = %path, items = list.items.len(), "Listed resources");
        Ok(list)
    }
}

impl std::fmt::Debug for ClusterClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterClient")
            .field("server", &self.server.as_str())
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("timeout", &self.timeout)
            .finish()
    }
}

async fn read_limited_bytes(response: reqwest::Response, limit: usize) -> Result<Vec<u8>, ClientError> {
    if let Some(len) = response.content_length() {
        if len as usize > limit {
            return Err(ClientError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(ClientError::Network)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(ClientError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }
    Ok(bytes)
}
