//! CLI command and subcommand definitions

use clap::{Parser, Subcommand};
use handle_core::CommandKind;
use std::path::PathBuf;

/// Handle.Net / EPIC PID administration
#[derive(Parser, Debug)]
#[command(name = "handlectl")]
#[command(version, about = "Query, download and rewrite Handle.Net PIDs", long_about = None)]
pub struct Cli {
    /// Handle prefix, like 21.12102
    #[arg(short, long, global = true)]
    pub prefix: Option<String>,

    /// User index, like 312
    #[arg(short, long, global = true)]
    pub index: Option<String>,

    /// Server URL (overrides config file)
    #[arg(long, global = true)]
    pub server: Option<String>,

    /// Client certificate [default: <prefix>_USER01_<index>_certificate_only.pem]
    #[arg(long, global = true)]
    pub certfile: Option<PathBuf>,

    /// Private key [default: <prefix>_USER01_<index>_privkey.pem]
    #[arg(long, global = true)]
    pub keyfile: Option<PathBuf>,

    /// Input file [default: <command>.csv]
    #[arg(short, long, global = true)]
    pub file: Option<PathBuf>,

    /// Output file, appended to [default: <command>-<yyyymmdd>.csv]
    #[arg(short, long, global = true)]
    pub output: Option<PathBuf>,

    /// First input line or first page [default: 1 for rewrite-aliases, else 0]
    #[arg(long, global = true)]
    pub start: Option<u64>,

    /// Number of lines or pages to process [default: 3]
    #[arg(long, global = true)]
    pub count: Option<u64>,

    /// Page size when downloading [default: 10000]
    #[arg(long, global = true)]
    pub size: Option<u64>,

    /// Seconds to wait between requests [default: 10]
    #[arg(long, global = true, allow_negative_numbers = true)]
    pub throttle: Option<f64>,

    /// Request timeout in seconds [default: 300]
    #[arg(long, global = true)]
    pub timeout: Option<u64>,

    /// Log file, appended to [default: <command>-<yyyymmdd>.log]
    #[arg(short, long, global = true)]
    pub log: Option<PathBuf>,

    /// Only log INFO and above on the console
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Don't load config file
    #[arg(long, global = true)]
    pub no_config: bool,

    /// Config file path (default: ~/.config/handlectl/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show the full record of one handle
    Handle {
        /// Handle postfix, the part after the prefix and slash
        postfix: String,
    },

    /// Fetch the records of the handles listed in the input file
    Handles,

    /// Print the number of handles under the prefix
    Count,

    /// Download the identifiers of all handles under the prefix
    Download,

    /// Rewrite handles into aliases; input lines are `alias;target`
    RewriteAliases,

    /// Show or manage CLI configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Generate shell completion scripts
    Completion {
        /// Shell to generate completion for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

impl Commands {
    /// The server command this is, or `None` for local commands
    pub fn kind(&self) -> Option<CommandKind> {
        match self {
            Commands::Handle { .. } => Some(CommandKind::Handle),
            Commands::Handles => Some(CommandKind::Handles),
            Commands::Count => Some(CommandKind::Count),
            Commands::Download => Some(CommandKind::Download),
            Commands::RewriteAliases => Some(CommandKind::RewriteAliases),
            Commands::Config { .. } | Commands::Completion { .. } => None,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show the resolved configuration
    Show,

    /// Write the default configuration file
    Init,
}
