//! Request rewriting, credential injection, and hot-swap coordination.

pub mod coordinator;
pub mod inject;
pub mod rewrite;

pub use coordinator::{Coordinator, CoordinatorError, ReloadOutcome};
pub use rewrite::{ProxyError, RequestRewriter, RewriteRules};
