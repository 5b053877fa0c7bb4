//! Semantic cache domain models
//!
//! Configuration, per-request state and the extraction rules shared by the
//! lookup and write-back paths.

mod config;
mod context;
mod path;
mod template;

pub use config::{ExtractionRules, SemanticCacheConfig};
pub use context::{RequestContext, RequestPhase};
pub use path::FieldPath;
pub use template::{CachedResponse, ResponseTemplates};
