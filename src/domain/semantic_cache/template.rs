//! Response templates for cache hits

use serde::{Deserialize, Serialize};

use crate::domain::DomainError;

/// Placeholder replaced by the cached value
pub const VALUE_PLACEHOLDER: &str = "%s";

const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";
const EVENT_STREAM_CONTENT_TYPE: &str = "text/event-stream; charset=utf-8";

/// Templates wrapping a cached value into a client response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseTemplates {
    /// Body returned for non-streamed requests
    #[serde(default = "default_response_template")]
    pub response: String,

    /// Body returned for streamed requests
    #[serde(default = "default_stream_response_template")]
    pub stream_response: String,
}

fn default_response_template() -> String {
    concat!(
        r#"{"id":"from-cache","choices":[{"index":0,"message":"#,
        r#"{"role":"assistant","content":"%s"},"finish_reason":"stop"}],"#,
        r#""model":"from-cache","object":"chat.completion","#,
        r#""usage":{"prompt_tokens":0,"completion_tokens":0,"total_tokens":0}}"#
    )
    .to_string()
}

fn default_stream_response_template() -> String {
    concat!(
        r#"data:{"id":"from-cache","choices":[{"index":0,"delta":"#,
        r#"{"role":"assistant","content":"%s"},"finish_reason":"stop"}],"#,
        r#""model":"from-cache","object":"chat.completion.chunk","#,
        r#""usage":{"prompt_tokens":0,"completion_tokens":0,"total_tokens":0}}"#,
        "\n\ndata:[DONE]\n\n"
    )
    .to_string()
}

impl Default for ResponseTemplates {
    fn default() -> Self {
        Self {
            response: default_response_template(),
            stream_response: default_stream_response_template(),
        }
    }
}

impl ResponseTemplates {
    /// Checks both templates carry the value placeholder
    pub fn validate(&self) -> Result<(), DomainError> {
        if !self.response.contains(VALUE_PLACEHOLDER) {
            return Err(DomainError::validation(
                "Response template must contain the %s placeholder",
            ));
        }

        if !self.stream_response.contains(VALUE_PLACEHOLDER) {
            return Err(DomainError::validation(
                "Stream response template must contain the %s placeholder",
            ));
        }

        Ok(())
    }

    /// Renders the cached value for a streamed or non-streamed client
    pub fn render(&self, value: &str, stream: bool) -> CachedResponse {
        let (template, content_type) = if stream {
            (&self.stream_response, EVENT_STREAM_CONTENT_TYPE)
        } else {
            (&self.response, JSON_CONTENT_TYPE)
        };

        CachedResponse {
            content_type,
            body: template.replacen(VALUE_PLACEHOLDER, value, 1),
        }
    }
}

/// Response served straight from the cache
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResponse {
    content_type: &'static str,
    body: String,
}

impl CachedResponse {
    pub fn content_type(&self) -> &'static str {
        self.content_type
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn into_body(self) -> String {
        self.body
    }
}
