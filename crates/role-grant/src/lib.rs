//! Role Grant Job Library
//!
//! Grants a directory role to a user in two sequential calls against
//! Microsoft Graph:
//!
//! 1. `GET /v1.0/users/{upn}` resolves the user principal name to an id
//! 2. `POST /v1.0/roleManagement/directory/roleAssignmentScheduleRequests`
//!    creates a permanent `adminAssign` schedule request
//!
//! # Architecture
//!
//! ```text
//! main.rs (runner) -> handlers/job.rs -> services/orchestrator.rs -> services/directory_client.rs
//! ```
//!
//! # Modules
//!
//! - `config` - Job configuration from environment
//! - `errors` - Error types and retry classification
//! - `handlers` - `invoke`, `error` and `halt` entry points
//! - `models` - Job surface and directory wire types
//! - `observability` - Metrics
//! - `services` - Directory client, orchestrator and injected collaborators

pub mod config;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod observability;
pub mod services;

pub use errors::{ErrorKind, ErrorReport, RoleGrantError};
pub use handlers::JobHandler;
