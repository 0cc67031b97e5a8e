//! Cadence API crate - axum HTTP server for the chat front-end.
//!
//! Exposes the turn endpoint, session inspection, a live event stream (SSE),
//! and a health check.

pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use routes::{create_router, start_server};
pub use state::AppState;
