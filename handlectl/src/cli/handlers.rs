//! Command execution handlers

use anyhow::{Context, Result};
use chrono::NaiveDate;
use handle_core::{CommandKind, HandleError, HandleId, PathOverrides, RunPaths};
use std::fs::{File, OpenOptions};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use crate::batch::{driver_reader, run_batch, AliasRows, FetchRows, RowWindow};
use crate::config::{CliConfig, ConfigBuilder};
use crate::download::{download, PageWindow, PrefixPages};
use crate::session::{Credentials, Session};
use crate::throttle::Sleep;

use super::commands::*;

/// Everything a server command needs, resolved from arguments and config
#[derive(Debug, Clone, PartialEq)]
pub struct RunSettings {
    pub command: CommandKind,
    /// Postfix for the `handle` command
    pub postfix: Option<String>,
    pub server_url: String,
    pub prefix: String,
    pub index: String,
    pub paths: RunPaths,
    pub start: u64,
    pub count: u64,
    pub page_size: u64,
    pub throttle: Duration,
    pub timeout: u64,
    pub quiet: bool,
}

impl RunSettings {
    pub fn credentials(&self) -> Credentials {
        Credentials::new(self.paths.certfile.clone(), self.paths.keyfile.clone())
    }
}

/// Build configuration using priority chain: defaults → file → env → CLI args
pub fn build_config(cli: &Cli, config_path: Option<&Path>) -> Result<CliConfig> {
    let mut builder = ConfigBuilder::new().with_env_overrides();

    if !cli.no_config {
        if let Some(path) = config_path {
            builder = builder.with_config_file(path)?;
        }
    }

    if let Some(ref server) = cli.server {
        builder = builder.with_server_url(server)?;
    }
    if let Some(ref prefix) = cli.prefix {
        builder = builder.with_prefix(prefix)?;
    }
    if let Some(ref index) = cli.index {
        builder = builder.with_index(index)?;
    }
    if let Some(timeout) = cli.timeout {
        builder = builder.with_timeout(timeout)?;
    }
    if let Some(throttle) = cli.throttle {
        builder = builder.with_throttle(throttle)?;
    }
    if let Some(size) = cli.size {
        builder = builder.with_page_size(size)?;
    }
    if let Some(count) = cli.count {
        builder = builder.with_count(count);
    }

    builder.build()
}

/// Config file in effect: `--config`, else the default location
pub fn config_path(cli: &Cli) -> Option<PathBuf> {
    cli.config
        .clone()
        .or_else(|| CliConfig::default_path().ok())
}

/// Resolve the settings of a server command, deriving default paths for
/// `today`
pub fn resolve_run(
    cli: &Cli,
    command: &Commands,
    config: &CliConfig,
    today: NaiveDate,
) -> Result<RunSettings> {
    let kind = command
        .kind()
        .ok_or_else(|| anyhow::anyhow!("{:?} does not talk to the server", command))?;

    let prefix = config.prefix.clone().ok_or_else(|| {
        anyhow::anyhow!("Missing handle prefix: pass --prefix or set HANDLECTL_PREFIX")
    })?;
    let index = config.index.clone().ok_or_else(|| {
        anyhow::anyhow!("Missing user index: pass --index or set HANDLECTL_INDEX")
    })?;

    let overrides = PathOverrides {
        certfile: cli.certfile.clone(),
        keyfile: cli.keyfile.clone(),
        input: cli.file.clone(),
        output: cli.output.clone(),
        log: cli.log.clone(),
    };
    let paths = RunPaths::resolve(kind, &prefix, &index, overrides, today);

    let throttle = Duration::try_from_secs_f64(config.throttle)
        .with_context(|| format!("Invalid throttle of {} seconds", config.throttle))?;

    let postfix = match command {
        Commands::Handle { postfix } => Some(postfix.clone()),
        _ => None,
    };

    Ok(RunSettings {
        command: kind,
        postfix,
        server_url: config.server_url.clone(),
        prefix,
        index,
        paths,
        start: cli.start.unwrap_or_else(|| kind.default_start()),
        count: config.count,
        page_size: config.page_size,
        throttle,
        timeout: config.timeout,
        quiet: cli.quiet,
    })
}

fn open_input(path: &Path) -> handle_core::Result<File> {
    File::open(path).map_err(|e| {
        HandleError::Config(format!(
            "Failed to open input file `{}`: {}",
            path.display(),
            e
        ))
    })
}

fn open_output(path: &Path) -> handle_core::Result<BufWriter<File>> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| {
            HandleError::Config(format!(
                "Failed to open output file `{}`: {}",
                path.display(),
                e
            ))
        })?;
    Ok(BufWriter::new(file))
}

/// Run a server command within an open session
pub async fn execute(session: &Session, run: &RunSettings) -> handle_core::Result<()> {
    let mut throttle = Sleep::new(run.throttle);

    match run.command {
        CommandKind::Handle => {
            let postfix = run
                .postfix
                .as_deref()
                .ok_or_else(|| HandleError::Config("Missing handle postfix".to_string()))?;
            let record = session
                .get_handle(&HandleId::new(run.prefix.as_str(), postfix))
                .await?;
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
        CommandKind::Handles => {
            debug!(
                "Reading {}; writing {}",
                run.paths.input.display(),
                run.paths.output.display()
            );
            let mut reader = driver_reader(open_input(&run.paths.input)?);
            let mut rows = FetchRows::new(session, &run.prefix, open_output(&run.paths.output)?);
            let window = RowWindow {
                start: run.start,
                count: run.count,
            };
            run_batch(&mut reader, window, &mut rows, &mut throttle).await?;
        }
        CommandKind::Count => {
            let count = session.count(&run.prefix).await?;
            println!("{}", count);
        }
        CommandKind::Download => {
            debug!("Writing {}", run.paths.output.display());
            let mut output = open_output(&run.paths.output)?;
            let window = PageWindow {
                start: run.start,
                count: run.count,
                page_size: run.page_size,
            };
            let summary = download(
                &PrefixPages::new(session, &run.prefix),
                window,
                &mut output,
                &mut throttle,
            )
            .await?;
            info!(
                "Downloaded; pages={}; handles={}; total={}",
                summary.pages,
                summary.handles,
                summary
                    .total_count
                    .map_or_else(|| "n/a".to_string(), |c| c.to_string())
            );
        }
        CommandKind::RewriteAliases => {
            debug!("Reading {}", run.paths.input.display());
            let mut reader = driver_reader(open_input(&run.paths.input)?);
            let mut rows = AliasRows::new(session, &run.prefix);
            let window = RowWindow {
                start: run.start,
                count: run.count,
            };
            run_batch(&mut reader, window, &mut rows, &mut throttle).await?;
        }
    }

    Ok(())
}

/// Handle config commands
pub fn handle_config(
    command: &ConfigCommands,
    current_config: &CliConfig,
    path: Option<&Path>,
) -> Result<()> {
    match command {
        ConfigCommands::Show => {
            if let Some(path) = path {
                println!("# {}", path.display());
            }
            print!("{}", toml::to_string_pretty(current_config)?);
        }
        ConfigCommands::Init => {
            let path = path.ok_or_else(|| anyhow::anyhow!("Cannot determine config directory"))?;
            if path.exists() {
                return Err(anyhow::anyhow!(
                    "Config file {} already exists",
                    path.display()
                ));
            }
            CliConfig::default().save_to(path)?;
            println!("Wrote default configuration to {}", path.display());
        }
    }

    Ok(())
}

/// Generate shell completion script
pub fn generate_completion(shell: clap_complete::Shell) {
    use clap::CommandFactory;
    use clap_complete::generate;
    use std::io;

    let mut cmd = Cli::command();
    let bin_name = cmd.get_name().to_string();
    generate(shell, &mut cmd, bin_name, &mut io::stdout());
}
