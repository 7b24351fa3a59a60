//! Handle Core Library
//!
//! Shared types, wire models, errors, and path resolution for administering
//! Handle.Net / EPIC persistent identifiers. Used by the `handlectl` CLI.

pub mod api;
pub mod error;
pub mod paths;
pub mod types;

// Re-export commonly used types
pub use error::*;
pub use paths::{CommandKind, PathOverrides, RunPaths};
pub use types::*;
