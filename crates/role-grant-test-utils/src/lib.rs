//! # Role Grant Test Utilities
//!
//! Shared test utilities for the role grant job.
//!
//! This crate provides:
//! - Mock directory server (`MockDirectory`, wiremock based)
//! - Params, context and handler fixtures
//!
//! ## Usage
//!
//! ```rust,ignore
//! use role_grant_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let directory = MockDirectory::start().await;
//!     directory.with_user("alice@contoso.com", "user-1").await;
//!     directory.with_schedule_request("req-1").await;
//!
//!     let handler = graph_handler();
//!     let response = handler
//!         .invoke(job_params("alice@contoso.com", "role-1"), &job_context(&directory.uri()))
//!         .await
//!         .unwrap();
//! }
//! ```

pub mod fixtures;
pub mod mock_directory;

// Re-export commonly used items
pub use fixtures::*;
pub use mock_directory::*;
