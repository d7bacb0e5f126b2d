//! Change-feed transport: turns a watch request into a stream of typed events.
//!
//! The HTTP implementation speaks the newline-delimited JSON watch protocol
//! (`GET <path>?watch=true`), one `{"type": ..., "object": ...}` per line.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::stream::{self, BoxStream, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use url::Url;

use super::error::WatchError;

/// Largest single event line accepted from the server.
const MAX_EVENT_SIZE: usize = 16 * 1024 * 1024; // 16MB

// ============================================================================
// Events
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WatchEventType {
    Added,
    Modified,
    Deleted,
    Error,
    /// Progress marker carrying only a resource version. Never dispatched.
    Bookmark,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WatchEvent {
    #[serde(rename = "type")]
    pub kind: WatchEventType,
    pub object: serde_json::Value,
}

impl WatchEvent {
    pub fn resource_version(&self) -> Option<&str> {
        self.object
            .get("metadata")
            .and_then(|m| m.get("resourceVersion"))
            .and_then(|v| v.as_str())
    }

    /// Status code of an `Error` event (410 when the resume marker expired).
    pub fn error_code(&self) -> Option<u16> {
        if self.kind != WatchEventType::Error {
            return None;
        }
        self.object
            .get("code")
            .and_then(|c| c.as_u64())
            .and_then(|c| u16::try_from(c).ok())
    }
}

// ============================================================================
// Requests
// ============================================================================

/// What to subscribe to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchRequest {
    pub path: String,
    pub label_selector: Option<String>,
    pub field_selector: Option<String>,
    /// Resume marker; only events newer than this version are delivered.
    pub resource_version: Option<String>,
}

impl WatchRequest {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn with_label_selector(mut self, selector: impl Into<String>) -> Self {
        self.label_selector = Some(selector.into());
        self
    }

    pub fn with_field_selector(mut self, selector: impl Into<String>) -> Self {
        self.field_selector = Some(selector.into());
        self
    }
}

pub type EventStream = BoxStream<'static, Result<WatchEvent, WatchError>>;

/// Opens change-feed subscriptions.
///
/// Dropping the returned stream aborts the underlying connection. The stream
/// ending with `None` means the server closed the watch cleanly.
pub trait WatchTransport: Send + Sync {
    fn open<'a>(&'a self, request: &'a WatchRequest)
        -> BoxFuture<'a, Result<EventStream, WatchError>>;
}

// ============================================================================
// HTTP Transport
// ============================================================================

pub struct HttpWatchTransport {
    client: reqwest::Client,
    server: Url,
    token: Option<Arc<SecretString>>,
    connect_timeout: Duration,
}

impl HttpWatchTransport {
    pub fn new(
        client: reqwest::Client,
        server: Url,
        token: Option<Arc<SecretString>>,
        connect_timeout: Duration,
    ) -> Self {
        Self {
            client,
            server,
            token,
            connect_timeout,
        }
    }

    fn watch_url(&self, request: &WatchRequest) -> Result<Url, WatchError> {
        let mut url = self
            .server
            .join(&request.path)
            .map_err(|e| WatchError::Transport(format!("invalid watch path: {}", e)))?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("watch", "true");
            query.append_pair("allowWatchBookmarks", "true");
            if let Some(selector) = &request.label_selector {
                query.append_pair("labelSelector", selector);
            }
            if let Some(selector) = &request.field_selector {
                query.append_pair("fieldSelector", selector);
            }
            if let Some(version) = &request.resource_version {
                query.append_pair("resourceVersion", version);
            }
        }
        Ok(url)
    }

    async fn connect(&self, request: &WatchRequest) -> Result<EventStream, WatchError> {
        let url = self.watch_url(request)?;
        let mut builder = self.client.get(url.clone());
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token.expose_secret());
        }

        // Only the initial response is time-limited; the body stays open.
        let response = tokio::time::timeout(self.connect_timeout, builder.send())
            .await
            .map_err(|_| WatchError::Timeout)?
            .map_err(WatchError::Network)?;

        if !response.status().is_success() {
            return Err(WatchError::HttpStatus(response.status().as_u16()));
        }

        tracing::debug!(url = %url, "Watch stream opened");
        Ok(decode_lines(Box::pin(response.bytes_stream())))
    }
}

impl WatchTransport for HttpWatchTransport {
    fn open<'a>(
        &'a self,
        request: &'a WatchRequest,
    ) -> BoxFuture<'a, Result<EventStream, WatchError>> {
        Box::pin(self.connect(request))
    }
}

// ============================================================================
// Line Decoding
// ============================================================================

/// Splits a byte stream on `\n` and parses each non-empty line as an event.
struct LineDecoder {
    buffer: Vec<u8>,
    ready: VecDeque<Result<WatchEvent, WatchError>>,
}

impl LineDecoder {
    fn new() -> Self {
        Self {
            buffer: Vec::new(),
            ready: VecDeque::new(),
        }
    }

    fn push(&mut self, chunk: &[u8]) -> Result<(), WatchError> {
        for &byte in chunk {
            if byte == b'\n' {
                self.finish_line();
            } else {
                if self.buffer.len() >= MAX_EVENT_SIZE {
                    return Err(WatchError::EventTooLarge);
                }
                self.buffer.push(byte);
            }
        }
        Ok(())
    }

    fn finish_line(&mut self) {
        let line = std::mem::take(&mut self.buffer);
        if line.iter().all(|b| b.is_ascii_whitespace()) {
            return;
        }
        let event =
            serde_json::from_slice::<WatchEvent>(&line).map_err(|e| WatchError::Decode(e.to_string()));
        self.ready.push_back(event);
    }
}

struct DecodeState<S> {
    body: S,
    decoder: LineDecoder,
    done: bool,
}

pub(crate) fn decode_lines<S, B>(body: S) -> EventStream
where
    S: futures::Stream<Item = Result<B, reqwest::Error>> + Send + Unpin + 'static,
    B: AsRef<[u8]> + Send + 'static,
{
    let state = DecodeState {
        body,
        decoder: LineDecoder::new(),
        done: false,
    };

    stream::unfold(state, |mut st| async move {
        loop {
            if let Some(item) = st.decoder.ready.pop_front() {
                return Some((item, st));
            }
            if st.done {
                return None;
            }
            match st.body.next().await {
                Some(Ok(chunk)) => {
                    if let Err(e) = st.decoder.push(chunk.as_ref()) {
                        st.done = true;
                        return Some((Err(e), st));
                    }
                }
                Some(Err(e)) => {
                    st.done = true;
                    return Some((Err(WatchError::Network(e)), st));
                }
                None => {
                    // Trailing event without a final newline
                    st.decoder.finish_line();
                    st.done = true;
                }
            }
        }
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const TWO_EVENTS: &str = concat!(
        r#"{"type":"ADDED","object":{"metadata":{"name":"a","resourceVersion":"10"}}}"#,
        "\n",
        r#"{"type":"DELETED","object":{"metadata":{"name":"a","resourceVersion":"11"}}}"#,
        "\n"
    );

    fn transport(server: &MockServer, token: Option<&str>) -> HttpWatchTransport {
        HttpWatchTransport::new(
            reqwest::Client::new(),
            Url::parse(&server.uri()).unwrap(),
            token.map(|t| Arc::new(SecretString::from(t.to_string()))),
            Duration::from_secs(5),
        )
    }

    async fn collect(stream: EventStream) -> Vec<Result<WatchEvent, WatchError>> {
        stream.collect().await
    }

    #[test]
    fn test_event_accessors() {
        let ev: WatchEvent = serde_json::from_str(
            r#"{"type":"MODIFIED","object":{"metadata":{"resourceVersion":"7"}}}"#,
        )
        .unwrap();
        assert_eq!(ev.kind, WatchEventType::Modified);
        assert_eq!(ev.resource_version(), Some("7"));
        assert_eq!(ev.error_code(), None);

        let gone: WatchEvent =
            serde_json::from_str(r#"{"type":"ERROR","object":{"code":410,"reason":"Expired"}}"#)
                .unwrap();
        assert_eq!(gone.error_code(), Some(410));
    }

    #[tokio::test]
    async fn test_decode_across_chunk_boundaries() {
        let bytes = TWO_EVENTS.as_bytes();
        let (left, right) = bytes.split_at(30);
        let chunks: Vec<Result<Vec<u8>, reqwest::Error>> =
            vec![Ok(left.to_vec()), Ok(right.to_vec())];

        let events = collect(decode_lines(stream::iter(chunks))).await;
        assert_eq!(events.len(), 2);
        let kinds: Vec<_> = events
            .into_iter()
            .map(|e| e.unwrap().kind)
            .collect();
        assert_eq!(kinds, vec![WatchEventType::Added, WatchEventType::Deleted]);
    }

    #[tokio::test]
    async fn test_decode_trailing_line_and_blank_lines() {
        let body = "\n\n{\"type\":\"ADDED\",\"object\":{}}";
        let chunks: Vec<Result<&'static [u8], reqwest::Error>> = vec![Ok(body.as_bytes())];
        let events = collect(decode_lines(stream::iter(chunks))).await;
        assert_eq!(events.len(), 1);
        assert!(events[0].is_ok());
    }

    #[tokio::test]
    async fn test_decode_error_is_reported_and_stream_continues() {
        let body = "not json\n{\"type\":\"ADDED\",\"object\":{}}\n";
        let chunks: Vec<Result<&'static [u8], reqwest::Error>> = vec![Ok(body.as_bytes())];
        let events = collect(decode_lines(stream::iter(chunks))).await;
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], Err(WatchError::Decode(_))));
        assert!(events[1].is_ok());
    }

    #[tokio::test]
    async fn test_http_watch_sends_query_and_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/pods"))
            .and(query_param("watch", "true"))
            .and(query_param("labelSelector", "app=web"))
            .and(query_param("resourceVersion", "9"))
            .and(header("Authorization", "Bearer sekrit"))
            .respond_with(ResponseTemplate::new(200).set_body_string(TWO_EVENTS))
            .mount(&server)
            .await;

        let mut request = WatchRequest::new("/api/v1/pods").with_label_selector("app=web");
        request.resource_version = Some("9".into());

        let t = transport(&server, Some("sekrit"));
        let stream = t.open(&request).await.unwrap();
        let events = collect(stream).await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].as_ref().unwrap().resource_version(), Some("11"));
    }

    #[tokio::test]
    async fn test_http_watch_forbidden() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let t = transport(&server, None);
        let request = WatchRequest::new("/api/v1/pods");
        match t.open(&request).await {
            Err(WatchError::HttpStatus(403)) => {}
            Err(e) => panic!("Expected HttpStatus(403), got {:?}", e),
            Ok(_) => panic!("Expected HttpStatus(403), got a stream"),
        }
    }
}
