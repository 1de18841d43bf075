//! Middleware for the gateway's HTTP surface.

pub mod request_id;
pub mod tenant;

pub use request_id::request_id;
pub use tenant::tenant_guard;
