//! HTTP API.
//!
//! Exposes the assessment pipeline to the drawing client: submission,
//! result retrieval for shareable pages, the character catalog, and a
//! health check. The router is composable; `api_router()` returns a
//! `Router` that can be mounted on any axum server instance.

pub mod endpoints;
pub mod error;
pub mod router;
pub mod server;
pub mod types;

pub use error::ApiError;
pub use router::api_router;
pub use server::{start_server, ApiServer};
pub use types::ApiContext;
