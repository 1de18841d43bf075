//! HTTP surface: server, routing, middleware.

pub mod middleware;
pub mod server;

pub use server::{LifecycleServer, ServerError};
