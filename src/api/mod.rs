//! REST API.
//!
//! Four route groups (search, feedback, file-upload, documents) are
//! composed by [`compose`] into one tagged router and served with axum.
//! `api_router()` returns a `Router` that can be mounted on any axum
//! server instance.

pub mod compose;
pub mod endpoints;
pub mod error;
pub mod middleware;
pub mod router;
pub mod server;
pub mod types;

pub use compose::{compose, CompositeRouter, ComposeError, RouteGroup, RouteInfo, RouteTag};
pub use router::api_router;
pub use server::{start_server, ApiServer, ServerSession};
pub use types::ApiContext;
