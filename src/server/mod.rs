//! HTTP transport.
//!
//! Axum router in front of the shared job processor. Handlers never call the
//! model directly; every request goes through the same serialized gate as
//! the filesystem queue.

mod handlers;
mod routes;
mod state;

pub use routes::create_router;
pub use state::AppState;
