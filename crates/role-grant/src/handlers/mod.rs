//! Job entry point handlers.

pub mod job;

pub use job::{JobHandler, JobHandlerBuilder};
