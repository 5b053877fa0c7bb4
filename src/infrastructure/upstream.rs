//! Upstream LLM backend client
//!
//! Forwards requests the cache could not answer and hands the response body
//! back as a byte stream, so fragments reach the client as they arrive.

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use axum::http::{header, HeaderMap, HeaderName, Method, StatusCode};
use bytes::Bytes;
use futures::{Stream, StreamExt};

use crate::domain::DomainError;

/// Stream type for upstream response bodies
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, DomainError>> + Send>>;

/// Headers that describe a single connection and are never forwarded
const HOP_BY_HOP_HEADERS: [HeaderName; 8] = [
    header::CONNECTION,
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
    header::HOST,
];

/// Backend response with its body still in flight
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: ByteStream,
}

impl std::fmt::Debug for UpstreamResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

impl UpstreamResponse {
    /// True when the backend answers with server-sent events
    pub fn is_event_stream(&self) -> bool {
        self.headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.contains("text/event-stream"))
    }
}

/// Trait for forwarding requests to the backend (for mocking)
#[async_trait]
pub trait UpstreamClient: Send + Sync + std::fmt::Debug {
    /// Sends the request and returns once response headers are in
    ///
    /// Non-2xx answers are returned as responses, not errors.
    async fn forward(
        &self,
        method: Method,
        path_and_query: &str,
        headers: &HeaderMap,
        body: Bytes,
    ) -> Result<UpstreamResponse, DomainError>;
}

/// reqwest-backed upstream client
#[derive(Debug, Clone)]
pub struct HttpUpstream {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl HttpUpstream {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, DomainError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| DomainError::internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
        })
    }
}

#[async_trait]
impl UpstreamClient for HttpUpstream {
    async fn forward(
        &self,
        method: Method,
        path_and_query: &str,
        headers: &HeaderMap,
        body: Bytes,
    ) -> Result<UpstreamResponse, DomainError> {
        let url = format!("{}{}", self.base_url, path_and_query);

        let response = self
            .client
            .request(method, &url)
            .headers(request_headers(headers))
            .timeout(self.timeout)
            .body(body)
            .send()
            .await
            .map_err(|e| DomainError::provider("upstream", format!("Request failed: {}", e)))?;

        let status = response.status();
        let headers = forwardable_headers(response.headers());
        let body = response.bytes_stream().map(|result| {
            result.map_err(|e| DomainError::provider("upstream", format!("Stream error: {}", e)))
        });

        Ok(UpstreamResponse {
            status,
            headers,
            body: Box::pin(body),
        })
    }
}

/// Copies `headers` without hop-by-hop entries and the body length
///
/// The length is dropped because bodies are re-framed on each leg.
pub fn forwardable_headers(headers: &HeaderMap) -> HeaderMap {
    let mut forwarded = headers.clone();

    for name in HOP_BY_HOP_HEADERS.iter() {
        forwarded.remove(name);
    }
    forwarded.remove(header::CONTENT_LENGTH);
    forwarded.remove("keep-alive");

    forwarded
}

/// Headers sent to the backend
///
/// `accept-encoding` is withheld so the body arrives uncompressed and can be
/// read for write-back.
pub fn request_headers(headers: &HeaderMap) -> HeaderMap {
    let mut forwarded = forwardable_headers(headers);
    forwarded.remove(header::ACCEPT_ENCODING);
    forwarded
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use futures::TryStreamExt;
    use wiremock::matchers::{body_string, header as header_eq, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_forwardable_headers_strips_hop_by_hop() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
        headers.insert(header::HOST, HeaderValue::from_static("gateway:8080"));
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from_static("12"));
        headers.insert("keep-alive", HeaderValue::from_static("timeout=5"));
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer sk"));
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let forwarded = forwardable_headers(&headers);

        assert_eq!(forwarded.len(), 2);
        assert!(forwarded.contains_key(header::AUTHORIZATION));
        assert!(forwarded.contains_key(header::CONTENT_TYPE));
    }

    #[test]
    fn test_request_headers_withhold_accept_encoding() {
        let mut headers = HeaderMap::new();
        headers.insert(header::ACCEPT_ENCODING, HeaderValue::from_static("gzip, br"));
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(header::TE, HeaderValue::from_static("trailers"));

        let forwarded = request_headers(&headers);

        assert_eq!(forwarded.len(), 1);
        assert!(forwarded.contains_key(header::ACCEPT));
    }

    #[tokio::test]
    async fn test_forward_streams_body() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header_eq("authorization", "Bearer sk-test"))
            .and(body_string(r#"{"stream":true}"#))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw("data:{\"a\":1}\n\ndata:[DONE]\n\n", "text/event-stream"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let upstream = HttpUpstream::new(format!("{}/", server.uri()), Duration::from_secs(5))
            .unwrap();

        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer sk-test"));

        let response = upstream
            .forward(
                Method::POST,
                "/v1/chat/completions",
                &headers,
                Bytes::from_static(br#"{"stream":true}"#),
            )
            .await
            .unwrap();

        assert_eq!(response.status, StatusCode::OK);
        assert!(response.is_event_stream());

        let chunks: Vec<Bytes> = response.body.try_collect().await.unwrap();
        assert_eq!(chunks.concat(), b"data:{\"a\":1}\n\ndata:[DONE]\n\n");
    }

    #[tokio::test]
    async fn test_forward_does_not_request_compression() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
            .expect(1)
            .mount(&server)
            .await;

        let upstream = HttpUpstream::new(server.uri(), Duration::from_secs(5)).unwrap();

        let mut headers = HeaderMap::new();
        headers.insert(header::ACCEPT_ENCODING, HeaderValue::from_static("gzip"));
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer sk-test"));

        upstream
            .forward(Method::POST, "/v1/chat/completions", &headers, Bytes::new())
            .await
            .unwrap();

        let received = server.received_requests().await.unwrap();
        assert_eq!(received.len(), 1);
        assert!(received[0].headers.get("accept-encoding").is_none());
        assert!(received[0].headers.get("authorization").is_some());
    }

    #[tokio::test]
    async fn test_forward_keeps_error_status() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .mount(&server)
            .await;

        let upstream = HttpUpstream::new(server.uri(), Duration::from_secs(5)).unwrap();

        let response = upstream
            .forward(Method::POST, "/v1/chat/completions", &HeaderMap::new(), Bytes::new())
            .await
            .unwrap();

        assert_eq!(response.status, StatusCode::TOO_MANY_REQUESTS);
        assert!(!response.is_event_stream());
    }

    #[tokio::test]
    async fn test_forward_connection_refused() {
        let upstream =
            HttpUpstream::new("http://127.0.0.1:1", Duration::from_millis(500)).unwrap();

        let result = upstream
            .forward(Method::POST, "/", &HeaderMap::new(), Bytes::new())
            .await;

        assert!(matches!(result, Err(DomainError::Provider { .. })));
    }
}
