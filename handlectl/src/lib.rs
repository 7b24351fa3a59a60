//! Handle.Net / EPIC PID administration
//!
//! Every server command runs inside one authorized [`session::Session`],
//! opened with a client certificate and closed when the work ends:
//!
//! ```no_run
//! use handlectl::session::{Credentials, Session};
//!
//! # async fn example() -> handle_core::Result<()> {
//! let credentials = Credentials::new(
//!     "21.12102_USER01_312_certificate_only.pem",
//!     "21.12102_USER01_312_privkey.pem",
//! );
//! let session = Session::open("https://epic-pid.storage.surfsara.nl:8001", &credentials, 300).await?;
//! let count = session.count("21.12102").await;
//! session.close().await;
//! println!("{}", count?);
//! # Ok(())
//! # }
//! ```

/// Batch driver over `;`-separated driver files.
pub mod batch;

// Internal CLI implementation - not part of public API
#[doc(hidden)]
pub mod cli;

/// HTTP client for the Handle server REST API.
pub mod client;

/// Configuration types for the CLI tool.
pub mod config;

/// Paginated download of a prefix listing.
pub mod download;

pub mod logging;

pub mod session;

pub mod throttle;

#[cfg(test)]
pub mod test_utils;
