//! CLI command definitions and handlers
//!
//! This module organizes the CLI into logical submodules:
//! - [`commands`] - Command and subcommand enum definitions
//! - [`handlers`] - Configuration resolution and command execution

mod commands;
mod handlers;

pub use commands::*;
pub use handlers::*;
