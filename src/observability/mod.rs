//! Observability: metrics exposition and recording helpers.

pub mod metrics;
