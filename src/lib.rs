//! Per-tenant overlay gateway.
//!
//! Forwards HTTP traffic to a backend reachable only through a private
//! overlay network, injecting a web-services auth token into qualifying
//! calls. The backend's address, token, and overlay credentials are fetched
//! from a configuration agent and hot-swapped under live traffic.
//!
//! # Architecture Overview
//!
//! ```text
//!   inbound request ──▶ http server ──▶ coordinator (read lock)
//!                                            │
//!                                            ▼
//!                            current (snapshot, session, rewriter)
//!                                            │
//!                                            ▼
//!                        rewriter ──▶ overlay session dial ──▶ backend
//!
//!   reload loop (1/min): credential store ──▶ diff ──▶ build new triple
//!                        ──▶ write-lock swap ──▶ async close of old session
//! ```

// Core subsystems
pub mod config;
pub mod http;
pub mod overlay;
pub mod proxy;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;

pub use config::{ConfigSnapshot, CredentialStore, Settings};
pub use http::LifecycleServer;
pub use lifecycle::Shutdown;
pub use proxy::Coordinator;
