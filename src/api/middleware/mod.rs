//! API middleware.
//!
//! The audit logger wraps the whole composed router, outside the per-route
//! tag layer, so it sees the route tag on the way out.

pub mod audit;
