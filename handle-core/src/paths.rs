//! Default file paths for a run
//!
//! Every default is derived from explicit inputs only, so resolution is
//! deterministic and needs no environment.

use chrono::NaiveDate;
use std::path::PathBuf;

/// Commands that touch the server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Handle,
    Handles,
    Count,
    Download,
    RewriteAliases,
}

impl CommandKind {
    /// Name as typed on the command line, also the stem of default file names
    pub fn name(&self) -> &'static str {
        match self {
            CommandKind::Handle => "handle",
            CommandKind::Handles => "handles",
            CommandKind::Count => "count",
            CommandKind::Download => "download",
            CommandKind::RewriteAliases => "rewrite-aliases",
        }
    }

    /// Zero-based first row or page when `--start` is not given.
    ///
    /// Alias driver files carry a header row.
    pub fn default_start(&self) -> u64 {
        match self {
            CommandKind::RewriteAliases => 1,
            _ => 0,
        }
    }
}

/// Explicit path arguments; `None` falls back to the derived default
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathOverrides {
    pub certfile: Option<PathBuf>,
    pub keyfile: Option<PathBuf>,
    pub input: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub log: Option<PathBuf>,
}

/// Fully resolved file locations for a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunPaths {
    pub certfile: PathBuf,
    pub keyfile: PathBuf,
    pub input: PathBuf,
    pub output: PathBuf,
    pub log: PathBuf,
}

impl RunPaths {
    /// Resolve paths from the command, prefix, user index and date.
    ///
    /// - certificate: `<prefix>_USER01_<index>_certificate_only.pem`
    /// - private key: `<prefix>_USER01_<index>_privkey.pem`
    /// - input: `<command>.csv`
    /// - output: `<command>-<yyyymmdd>.csv`
    /// - log: `<command>-<yyyymmdd>.log`
    pub fn resolve(
        command: CommandKind,
        prefix: &str,
        index: &str,
        overrides: PathOverrides,
        today: NaiveDate,
    ) -> Self {
        let name = command.name();
        let stamp = today.format("%Y%m%d");

        Self {
            certfile: overrides.certfile.unwrap_or_else(|| {
                PathBuf::from(format!("{}_USER01_{}_certificate_only.pem", prefix, index))
            }),
            keyfile: overrides
                .keyfile
                .unwrap_or_else(|| PathBuf::from(format!("{}_USER01_{}_privkey.pem", prefix, index))),
            input: overrides
                .input
                .unwrap_or_else(|| PathBuf::from(format!("{}.csv", name))),
            output: overrides
                .output
                .unwrap_or_else(|| PathBuf::from(format!("{}-{}.csv", name, stamp))),
            log: overrides
                .log
                .unwrap_or_else(|| PathBuf::from(format!("{}-{}.log", name, stamp))),
        }
    }
}
