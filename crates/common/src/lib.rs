//! Common utilities and types shared across the role grant workspace.

#![warn(clippy::pedantic)]

/// Module for common configuration
pub mod config;

/// Module for secret types that prevent accidental logging
pub mod secret;
