//! pfk-daemon library surface.
//!
//! `main.rs` is a thin binary; the router, handlers, state, and API types
//! live here so scenario tests can compose the router in-process.

pub mod api_types;
pub mod routes;
pub mod state;
