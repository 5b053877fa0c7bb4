//! Semantic cache pipeline - lookup orchestration and response write-back

mod lookup;
mod reconstructor;
mod sse;

pub use lookup::{CacheLookupService, LookupOutcome};
pub use reconstructor::{CacheWrite, ResponseReconstructor};
