//! Cache domain - key/value store contract used for cached responses

mod key;
mod repository;

pub use key::CacheKey;
pub use repository::Cache;

#[cfg(test)]
pub use repository::mock::MockCache;
