//! Per-request cache state

use bytes::{Bytes, BytesMut};

use crate::domain::cache::CacheKey;
use crate::domain::DomainError;

/// Where a request stands relative to the cache pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestPhase {
    /// Body observed, no collaborator call started
    Receiving,
    /// Waiting on a cache store, embedding or vector store call
    Suspended,
    /// Answered from the cache
    Served,
    /// Released to the backend
    Forwarded,
}

/// State of one in-flight request, shared by the lookup and write-back paths
///
/// Created when the request body is observed and dropped once the response
/// finishes. Never shared across requests.
#[derive(Debug)]
pub struct RequestContext {
    request_id: String,
    stream: bool,
    phase: RequestPhase,
    resumes: u32,
    cache_key: Option<CacheKey>,
    embedding: Option<Vec<f32>>,
    tool_calls: bool,
    document: BytesMut,
    content: Option<String>,
    partial_event: BytesMut,
}

impl RequestContext {
    pub fn new(request_id: impl Into<String>, stream: bool) -> Self {
        Self {
            request_id: request_id.into(),
            stream,
            phase: RequestPhase::Receiving,
            resumes: 0,
            cache_key: None,
            embedding: None,
            tool_calls: false,
            document: BytesMut::new(),
            content: None,
            partial_event: BytesMut::new(),
        }
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Whether the response is event-stream framed
    pub fn is_stream(&self) -> bool {
        self.stream
    }

    /// Switches to event-stream mode, e.g. after seeing the response headers
    pub fn mark_stream(&mut self) {
        self.stream = true;
    }

    pub fn phase(&self) -> RequestPhase {
        self.phase
    }

    /// Number of times the request has been released
    pub fn resume_count(&self) -> u32 {
        self.resumes
    }

    /// Suspends the request ahead of a collaborator call
    pub fn suspend(&mut self) {
        self.phase = RequestPhase::Suspended;
    }

    /// Releases a suspended request into `phase`
    ///
    /// Fails when the request is not suspended: a second release for the same
    /// suspension is a pipeline bug.
    pub fn resume(&mut self, phase: RequestPhase) -> Result<(), DomainError> {
        if self.phase != RequestPhase::Suspended {
            return Err(DomainError::internal(format!(
                "Request {} resumed while {:?}",
                self.request_id, self.phase
            )));
        }

        if !matches!(phase, RequestPhase::Served | RequestPhase::Forwarded) {
            return Err(DomainError::internal(format!(
                "Request {} cannot resume into {:?}",
                self.request_id, phase
            )));
        }

        self.phase = phase;
        self.resumes += 1;
        Ok(())
    }

    /// Stages the key the response will be written back under
    pub fn stage_key(&mut self, key: CacheKey) {
        self.cache_key = Some(key);
    }

    pub fn cache_key(&self) -> Option<&CacheKey> {
        self.cache_key.as_ref()
    }

    pub fn take_cache_key(&mut self) -> Option<CacheKey> {
        self.cache_key.take()
    }

    pub fn clear_cache_key(&mut self) {
        self.cache_key = None;
    }

    pub fn stage_embedding(&mut self, embedding: Vec<f32>) {
        self.embedding = Some(embedding);
    }

    pub fn embedding(&self) -> Option<&[f32]> {
        self.embedding.as_deref()
    }

    /// Drops the staged key and embedding
    pub fn clear_staged(&mut self) {
        self.cache_key = None;
        self.embedding = None;
    }

    /// Marks the response as a tool invocation, which is never cached
    pub fn mark_tool_calls(&mut self) {
        self.tool_calls = true;
    }

    pub fn has_tool_calls(&self) -> bool {
        self.tool_calls
    }

    /// Appends a single-document body fragment
    pub fn append_document(&mut self, chunk: &[u8]) {
        self.document.extend_from_slice(chunk);
    }

    pub fn take_document(&mut self) -> Bytes {
        self.document.split().freeze()
    }

    /// Appends incremental event-stream content
    pub fn append_content(&mut self, piece: &str) {
        self.content.get_or_insert_with(String::new).push_str(piece);
    }

    pub fn content(&self) -> Option<&str> {
        self.content.as_deref()
    }

    pub fn take_content(&mut self) -> Option<String> {
        self.content.take()
    }

    /// Takes the unterminated event buffered from earlier fragments
    pub fn take_partial_event(&mut self) -> BytesMut {
        self.partial_event.split()
    }

    pub fn set_partial_event(&mut self, remainder: &[u8]) {
        self.partial_event.clear();
        self.partial_event.extend_from_slice(remainder);
    }

    pub fn has_partial_event(&self) -> bool {
        !self.partial_event.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_context() {
        let ctx = RequestContext::new("req-1", false);

        assert_eq!(ctx.request_id(), "req-1");
        assert!(!ctx.is_stream());
        assert_eq!(ctx.phase(), RequestPhase::Receiving);
        assert!(ctx.cache_key().is_none());
        assert!(ctx.content().is_none());
    }

    #[test]
    fn test_resume_once() {
        let mut ctx = RequestContext::new("req-1", false);
        ctx.suspend();

        ctx.resume(RequestPhase::Forwarded).unwrap();

        assert_eq!(ctx.phase(), RequestPhase::Forwarded);
        assert_eq!(ctx.resume_count(), 1);
    }

    #[test]
    fn test_double_resume_rejected() {
        let mut ctx = RequestContext::new("req-1", false);
        ctx.suspend();
        ctx.resume(RequestPhase::Served).unwrap();

        assert!(ctx.resume(RequestPhase::Forwarded).is_err());
        assert_eq!(ctx.resume_count(), 1);
    }

    #[test]
    fn test_resume_without_suspend_rejected() {
        let mut ctx = RequestContext::new("req-1", false);

        assert!(ctx.resume(RequestPhase::Forwarded).is_err());
    }

    #[test]
    fn test_clear_staged() {
        let mut ctx = RequestContext::new("req-1", false);
        ctx.stage_key(CacheKey::new("k").unwrap());
        ctx.stage_embedding(vec![0.1, 0.2]);

        ctx.clear_staged();

        assert!(ctx.cache_key().is_none());
        assert!(ctx.embedding().is_none());
    }

    #[test]
    fn test_document_accumulation() {
        let mut ctx = RequestContext::new("req-1", false);
        ctx.append_document(b"{\"a\":");
        ctx.append_document(b"1}");

        assert_eq!(ctx.take_document(), Bytes::from_static(b"{\"a\":1}"));
        assert!(ctx.take_document().is_empty());
    }

    #[test]
    fn test_content_and_partial_event() {
        let mut ctx = RequestContext::new("req-1", true);
        ctx.append_content("Hel");
        ctx.append_content("lo");
        ctx.set_partial_event(b"data: {");

        assert_eq!(ctx.content(), Some("Hello"));
        assert!(ctx.has_partial_event());
        assert_eq!(&ctx.take_partial_event()[..], b"data: {");
        assert!(!ctx.has_partial_event());
    }
}
