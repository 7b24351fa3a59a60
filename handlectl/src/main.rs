//! handlectl
//!
//! Command-line tool for administering Handle.Net / EPIC PIDs.

use anyhow::Result;
use chrono::Local;
use clap::Parser;
use handlectl::cli::{
    build_config, config_path, execute, generate_completion, handle_config, resolve_run, Cli,
    Commands, RunSettings,
};
use handlectl::logging::{LogContext, LogSettings};
use handlectl::session::Session;
use tokio::signal;
use tracing::{debug, error, info, warn};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = config_path(&cli);

    // Build configuration using priority chain: defaults → file → env → CLI args
    let config = match build_config(&cli, config_path.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            std::process::exit(1);
        }
    };

    let run = match &cli.command {
        Commands::Config { command } => {
            return handle_config(command, &config, config_path.as_deref());
        }
        Commands::Completion { shell } => {
            generate_completion(*shell);
            return Ok(());
        }
        command => match resolve_run(&cli, command, &config, Local::now().date_naive()) {
            Ok(run) => run,
            Err(e) => {
                eprintln!("Configuration error: {:#}", e);
                std::process::exit(1);
            }
        },
    };

    let logs = LogContext::init(&run.paths.log, run.quiet, LogSettings::from_env())?;
    info!(
        "Starting; command={}; prefix={}; server={}",
        run.command.name(),
        run.prefix,
        run.server_url
    );
    debug!("Logging to {}", logs.path().display());

    let status = match run_session(run).await {
        Ok(()) => 0,
        Err(e) => e.exit_code(),
    };

    logs.finish();
    if status != 0 {
        std::process::exit(status);
    }
    Ok(())
}

/// Open the session, run the command in it, and close it
async fn run_session(run: RunSettings) -> handle_core::Result<()> {
    let credentials = run.credentials();
    let session = match Session::open(&run.server_url, &credentials, run.timeout).await {
        Ok(session) => session,
        Err(e) => {
            error!("{}", e);
            return Err(e);
        }
    };

    session
        .run_guarded(
            move |session| Box::pin(async move { execute(session, &run).await }),
            interrupted(),
        )
        .await
}

/// Resolves on Ctrl+C or SIGTERM
async fn interrupted() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            debug!("Received Ctrl+C");
        },
        _ = terminate => {
            debug!("Received SIGTERM");
        },
    }
}
