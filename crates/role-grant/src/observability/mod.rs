//! Observability for the role grant job.

pub mod metrics;
