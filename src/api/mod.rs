//! HTTP surface - health probes and the caching proxy

pub mod health;
pub mod proxy;
pub mod router;
pub mod state;
pub mod types;

pub use router::create_router;
pub use state::AppState;
