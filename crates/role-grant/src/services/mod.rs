//! Service layer for the role grant job.
//!
//! # Components
//!
//! - `directory_client` - HTTP client for the directory (Microsoft Graph)
//! - `orchestrator` - two-phase assignment flow
//! - `auth`, `base_url`, `template` - collaborators injected into the handler
//! - `halt` - external halt signal

pub mod auth;
pub mod base_url;
pub mod directory_client;
pub mod halt;
pub mod orchestrator;
pub mod template;

pub use auth::{AuthHeaderProvider, BearerTokenAuth};
pub use base_url::{BaseUrlResolver, DefaultBaseUrlResolver};
pub use directory_client::{DirectoryClient, DirectoryTarget, GraphDirectoryClient};
pub use halt::HaltSignal;
pub use orchestrator::RoleAssignmentOrchestrator;
pub use template::{JobDataTemplateResolver, NoopTemplateResolver, TemplateResolver};
