//! Cache key type

use std::fmt;

/// Cache key extracted from an inbound request body
///
/// Never empty: an empty extraction means the cache does not engage for the
/// request, so construction returns `None` instead.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Creates a key, rejecting empty input
    pub fn new(raw: impl Into<String>) -> Option<Self> {
        let raw = raw.into();

        if raw.is_empty() {
            None
        } else {
            Some(Self(raw))
        }
    }

    /// Returns the key without namespace
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the key as stored in the cache, namespaced with `prefix`
    pub fn namespaced(&self, prefix: &str) -> String {
        format!("{}{}", prefix, self.0)
    }

    /// Consumes the key and returns the raw string
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_key_rejected() {
        assert!(CacheKey::new("").is_none());
    }

    #[test]
    fn test_namespaced() {
        let key = CacheKey::new("what is rust").unwrap();
        assert_eq!(key.namespaced("llm:"), "llm:what is rust");
        assert_eq!(key.as_str(), "what is rust");
    }

    #[test]
    fn test_display() {
        let key = CacheKey::new("hello").unwrap();
        assert_eq!(key.to_string(), "hello");
        assert_eq!(key.into_inner(), "hello");
    }
}
