//! Caching reverse proxy handler
//!
//! Every request outside the health routes lands here. The cache key is
//! read from the JSON body; a hit is answered directly, anything else is
//! forwarded and its response observed for write-back.

use axum::{
    body::{self, Body, Bytes},
    extract::{Request, State},
    http::{header, HeaderMap},
    response::{IntoResponse, Response},
};
use futures::{Stream, StreamExt};
use serde_json::Value;
use tracing::{debug, instrument, warn, Instrument, Span};

use super::state::AppState;
use super::types::ApiError;
use crate::domain::cache::CacheKey;
use crate::domain::semantic_cache::{CachedResponse, RequestContext};
use crate::domain::DomainError;
use crate::infrastructure::semantic_cache::{LookupOutcome, ResponseReconstructor};
use crate::infrastructure::upstream::ByteStream;

const REQUEST_ID_HEADER: &str = "x-request-id";

pub async fn proxy_handler(
    State(state): State<AppState>,
    request: Request,
) -> Result<Response, ApiError> {
    let request_id = request_id(request.headers());
    handle(state, request, request_id).await
}

#[instrument(
    name = "proxy",
    skip_all,
    fields(request_id = %request_id, method = %request.method(), path = %request.uri().path())
)]
async fn handle(
    state: AppState,
    request: Request,
    request_id: String,
) -> Result<Response, ApiError> {
    let (parts, body) = request.into_parts();

    if declared_length(&parts.headers).is_some_and(|len| len > state.max_body_bytes) {
        return Err(ApiError::payload_too_large(format!(
            "Request body exceeds {} bytes",
            state.max_body_bytes
        )));
    }

    let body = body::to_bytes(body, state.max_body_bytes)
        .await
        .map_err(|e| ApiError::bad_request(format!("Failed to read request body: {}", e)))?;

    let document: Option<Value> = serde_json::from_slice(&body).ok();
    let stream = document
        .as_ref()
        .and_then(|doc| doc.get("stream"))
        .and_then(Value::as_bool)
        .unwrap_or(false);

    let mut ctx = RequestContext::new(request_id, stream);

    let key = document
        .as_ref()
        .and_then(|doc| state.rules.key_from.extract_text(doc))
        .and_then(CacheKey::new);

    match key {
        Some(key) => {
            if let LookupOutcome::Served(cached) = state.lookup.lookup(key, &mut ctx, true).await {
                return Ok(served(cached));
            }
        }
        None => debug!(
            request_id = ctx.request_id(),
            path = %state.rules.key_from,
            "No cache key in request body"
        ),
    }

    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");

    let upstream = state
        .upstream
        .forward(parts.method, path_and_query, &parts.headers, body)
        .await
        .map_err(|e| {
            warn!(request_id = ctx.request_id(), "Upstream request failed: {}", e);
            ApiError::from(e)
        })?;

    if upstream.is_event_stream() {
        ctx.mark_stream();
    }

    if !upstream.status.is_success() {
        debug!(
            request_id = ctx.request_id(),
            status = upstream.status.as_u16(),
            "Backend answered with an error, response not cached"
        );
        ctx.clear_staged();
    }

    let observed = observe(upstream.body, state.reconstructor.clone(), ctx, Span::current());

    let mut response = Response::new(Body::from_stream(observed));
    *response.status_mut() = upstream.status;
    *response.headers_mut() = upstream.headers;

    Ok(response)
}

fn served(cached: CachedResponse) -> Response {
    let content_type = cached.content_type();
    ([(header::CONTENT_TYPE, content_type)], cached.into_body()).into_response()
}

/// Passes backend fragments through the reconstructor on their way out
///
/// The end of the backend body triggers the final, empty fragment. A body
/// that fails midway ends the stream without a write-back. Each poll runs in
/// `span`, which outlives the handler.
fn observe(
    body: ByteStream,
    reconstructor: ResponseReconstructor,
    ctx: RequestContext,
    span: Span,
) -> impl Stream<Item = Result<Bytes, DomainError>> + Send {
    futures::stream::unfold(Some((body, reconstructor, ctx)), move |state| {
        next_fragment(state).instrument(span.clone())
    })
}

type ObserveState = Option<(ByteStream, ResponseReconstructor, RequestContext)>;

async fn next_fragment(
    state: ObserveState,
) -> Option<(Result<Bytes, DomainError>, ObserveState)> {
    let (mut body, reconstructor, mut ctx) = state?;

    match body.next().await {
        Some(Ok(chunk)) => {
            let chunk = reconstructor.process_chunk(&mut ctx, chunk, false);
            Some((Ok(chunk), Some((body, reconstructor, ctx))))
        }
        Some(Err(e)) => {
            warn!(
                request_id = ctx.request_id(),
                "Upstream body failed, response not cached: {}",
                e
            );
            Some((Err(e), None))
        }
        None => {
            reconstructor.process_chunk(&mut ctx, Bytes::new(), true);
            None
        }
    }
}

fn declared_length(headers: &HeaderMap) -> Option<usize> {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
}

fn request_id(headers: &HeaderMap) -> String {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::http::{Method, StatusCode};
    use axum::Router;
    use serde_json::json;
    use tower::ServiceExt;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::api::router::create_router;
    use crate::domain::cache::Cache;
    use crate::domain::embedding::MockEmbeddingProvider;
    use crate::domain::semantic_cache::SemanticCacheConfig;
    use crate::infrastructure::cache::InMemoryCache;
    use crate::infrastructure::upstream::HttpUpstream;
    use crate::infrastructure::vector_store::InMemoryVectorStore;

    struct Harness {
        app: Router,
        cache: Arc<InMemoryCache>,
        embeddings: Arc<MockEmbeddingProvider>,
        server: MockServer,
    }

    async fn harness(embeddings: MockEmbeddingProvider) -> Harness {
        let server = MockServer::start().await;
        let cache = Arc::new(InMemoryCache::new());
        let embeddings = Arc::new(embeddings);
        let upstream = HttpUpstream::new(server.uri(), Duration::from_secs(5)).unwrap();

        let state = AppState::new(
            cache.clone(),
            embeddings.clone(),
            Arc::new(InMemoryVectorStore::new(100)),
            Arc::new(upstream),
            SemanticCacheConfig::default(),
            1024 * 1024,
        )
        .unwrap();

        Harness {
            app: create_router(state),
            cache,
            embeddings,
            server,
        }
    }

    fn chat_request(question: &str, stream: bool) -> Request {
        let body = json!({
            "model": "qwen-turbo",
            "stream": stream,
            "messages": [
                {"role": "system", "content": "be brief"},
                {"role": "user", "content": question}
            ]
        });

        axum::http::Request::builder()
            .method(Method::POST)
            .uri("/v1/chat/completions")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn read_body(response: Response) -> String {
        let bytes = body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[derive(Clone, Default)]
    struct LogBuffer(Arc<std::sync::Mutex<Vec<u8>>>);

    impl LogBuffer {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl std::io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for LogBuffer {
        type Writer = LogBuffer;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    async fn wait_for_entry(cache: &InMemoryCache, key: &str) -> Option<String> {
        for _ in 0..50 {
            if let Some(value) = cache.get(key).await.unwrap() {
                return Some(value);
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        None
    }

    #[tokio::test]
    async fn test_exact_hit_served_without_backend() {
        let h = harness(MockEmbeddingProvider::new("mock", 3)).await;
        h.cache.set("ai-cache:what is rust", "A language").await.unwrap();

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&h.server)
            .await;

        let response = h.app.oneshot(chat_request("what is rust", false)).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "application/json; charset=utf-8"
        );
        let body: Value = serde_json::from_str(&read_body(response).await).unwrap();
        assert_eq!(body["choices"][0]["message"]["content"], "A language");
        assert_eq!(h.embeddings.calls(), 0);
    }

    #[tokio::test]
    async fn test_stream_hit_uses_stream_template() {
        let h = harness(MockEmbeddingProvider::new("mock", 3)).await;
        h.cache.set("ai-cache:hello", "Hi!").await.unwrap();

        let response = h.app.oneshot(chat_request("hello", true)).await.unwrap();

        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/event-stream; charset=utf-8"
        );
        let body = read_body(response).await;
        assert!(body.starts_with("data:"));
        assert!(body.contains(r#""content":"Hi!""#));
        assert!(body.ends_with("data:[DONE]\n\n"));
    }

    #[tokio::test]
    async fn test_miss_forwards_and_writes_back() {
        let h = harness(MockEmbeddingProvider::new("mock", 3).with_vector(vec![1.0, 0.0, 0.0]))
            .await;

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "chatcmpl-1",
                "choices": [{
                    "index": 0,
                    "message": {"role": "assistant", "content": "Borrow checker"}
                }]
            })))
            .expect(1)
            .mount(&h.server)
            .await;

        let response = h
            .app
            .clone()
            .oneshot(chat_request("what is rust", false))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body: Value = serde_json::from_str(&read_body(response).await).unwrap();
        assert_eq!(body["id"], "chatcmpl-1");

        let cached = wait_for_entry(&h.cache, "ai-cache:what is rust").await;
        assert_eq!(cached.as_deref(), Some("Borrow checker"));

        let second = h.app.oneshot(chat_request("what is rust", false)).await.unwrap();
        let body: Value = serde_json::from_str(&read_body(second).await).unwrap();
        assert_eq!(body["id"], "from-cache");
    }

    #[tokio::test]
    async fn test_similar_question_served_from_neighbour() {
        let h = harness(MockEmbeddingProvider::new("mock", 3).with_vector(vec![0.0, 1.0, 0.0]))
            .await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"content": "Ownership"}}]
            })))
            .expect(1)
            .mount(&h.server)
            .await;

        let first = h
            .app
            .clone()
            .oneshot(chat_request("what is rust", false))
            .await
            .unwrap();
        read_body(first).await;
        wait_for_entry(&h.cache, "ai-cache:what is rust").await;

        let second = h
            .app
            .oneshot(chat_request("tell me about rust", false))
            .await
            .unwrap();

        let body: Value = serde_json::from_str(&read_body(second).await).unwrap();
        assert_eq!(body["choices"][0]["message"]["content"], "Ownership");
    }

    #[tokio::test]
    async fn test_stream_miss_caches_concatenated_content() {
        let h = harness(MockEmbeddingProvider::new("mock", 3).with_vector(vec![0.0, 0.0, 1.0]))
            .await;

        let events = concat!(
            "data:{\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n",
            "data:{\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\n",
            "data:[DONE]\n\n"
        );

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(events, "text/event-stream"))
            .mount(&h.server)
            .await;

        let response = h.app.oneshot(chat_request("greet me", true)).await.unwrap();

        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/event-stream");
        assert_eq!(read_body(response).await, events);
        let cached = wait_for_entry(&h.cache, "ai-cache:greet me").await;
        assert_eq!(cached.as_deref(), Some("Hello"));
    }

    #[tokio::test]
    async fn test_event_stream_answer_to_plain_request_is_cached() {
        let h = harness(MockEmbeddingProvider::new("mock", 3).with_vector(vec![1.0, 1.0, 0.0]))
            .await;

        let events = concat!(
            "data:{\"choices\":[{\"delta\":{\"content\":\"Str\"}}]}\n\n",
            "data:{\"choices\":[{\"delta\":{\"content\":\"eamed\"}}]}\n\n",
            "data:[DONE]\n\n"
        );

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(events, "text/event-stream"))
            .expect(1)
            .mount(&h.server)
            .await;

        let response = h
            .app
            .oneshot(chat_request("stream anyway", false))
            .await
            .unwrap();

        assert_eq!(read_body(response).await, events);
        let cached = wait_for_entry(&h.cache, "ai-cache:stream anyway").await;
        assert_eq!(cached.as_deref(), Some("Streamed"));
    }

    #[tokio::test]
    async fn test_handler_logs_within_request_span() {
        let logs = LogBuffer::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(logs.clone())
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let h = harness(MockEmbeddingProvider::new("mock", 3)).await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
            .mount(&h.server)
            .await;

        let request = axum::http::Request::builder()
            .uri("/v1/models")
            .header(REQUEST_ID_HEADER, "req-span-7")
            .body(Body::empty())
            .unwrap();

        let response = h.app.oneshot(request).await.unwrap();
        read_body(response).await;

        let output = logs.contents();
        assert!(output.contains("proxy{request_id=req-span-7"));
        assert!(output.contains("No cache key in request body"));
    }

    #[tokio::test]
    async fn test_embedding_failure_passes_through_without_caching() {
        let h = harness(MockEmbeddingProvider::new("mock", 3).with_error("quota exceeded")).await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"content": "uncached"}}]
            })))
            .expect(1)
            .mount(&h.server)
            .await;

        let response = h.app.oneshot(chat_request("anything", false)).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        read_body(response).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(h.cache.get("ai-cache:anything").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_request_without_key_is_forwarded() {
        let h = harness(MockEmbeddingProvider::new("mock", 3)).await;

        Mock::given(method("GET"))
            .and(path("/v1/models"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
            .expect(1)
            .mount(&h.server)
            .await;

        let request = axum::http::Request::builder()
            .uri("/v1/models")
            .body(Body::empty())
            .unwrap();

        let response = h.app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(read_body(response).await, r#"{"data":[]}"#);
        assert_eq!(h.embeddings.calls(), 0);
    }

    #[tokio::test]
    async fn test_backend_error_status_is_relayed() {
        let h = harness(MockEmbeddingProvider::new("mock", 3)).await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
            .mount(&h.server)
            .await;

        let response = h.app.oneshot(chat_request("busy", false)).await.unwrap();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(read_body(response).await, "rate limited");
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(h.cache.get("ai-cache:busy").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_bad_gateway() {
        let cache = Arc::new(InMemoryCache::new());
        let state = AppState::new(
            cache,
            Arc::new(MockEmbeddingProvider::new("mock", 3)),
            Arc::new(InMemoryVectorStore::new(10)),
            Arc::new(HttpUpstream::new("http://127.0.0.1:1", Duration::from_secs(1)).unwrap()),
            SemanticCacheConfig::default(),
            1024,
        )
        .unwrap();

        let response = create_router(state)
            .oneshot(chat_request("hello", false))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert!(read_body(response).await.contains("upstream_error"));
    }

    #[tokio::test]
    async fn test_oversized_body_rejected() {
        let h = harness(MockEmbeddingProvider::new("mock", 3)).await;

        let request = axum::http::Request::builder()
            .method(Method::POST)
            .uri("/v1/chat/completions")
            .header(header::CONTENT_LENGTH, "2000000")
            .body(Body::from("{}"))
            .unwrap();

        let response = h.app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[test]
    fn test_request_id_prefers_header() {
        let mut headers = HeaderMap::new();
        headers.insert(REQUEST_ID_HEADER, "req-42".parse().unwrap());

        assert_eq!(request_id(&headers), "req-42");
        assert!(!request_id(&HeaderMap::new()).is_empty());
    }
}
