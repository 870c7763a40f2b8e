mod app;
mod cli;
mod error;

use crate::app::App;
use crate::cli::{Cli, Command};
use crate::error::{ErrorKind, Result};
use clap::Parser;
use exn::ResultExt;
use gharvest_archive::{ARCHIVE_EXTENSION, TimeCursor};
use gharvest_config::Config;
use gharvest_pipeline::run;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            init_logging(&Config::default().log_level);
            tracing::error!(error = ?e, "Could not load configuration");
            return ExitCode::FAILURE;
        },
    };
    init_logging(&config.log_level);

    match execute(cli.command, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = ?e, "Fatal error");
            ExitCode::FAILURE
        },
    }
}

/// `RUST_LOG` wins over the configured level.
fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry().with(filter).with(tracing_subscriber::fmt::layer()).init();
}

async fn execute(command: Command, config: Config) -> Result<()> {
    let app = App::new(config)?;
    let delay = app.config().saturation_delay();
    let cancel = shutdown_token();
    match command {
        Command::Cursor => print_cursor(&app).await,
        Command::Archive(args) => {
            let mut archiver = app.archiver(args.start).await?;
            run(&mut archiver, delay, cancel).await;
            Ok(())
        },
        Command::Process => {
            let mut processor = app.processor()?;
            run(&mut processor, delay, cancel).await;
            Ok(())
        },
        Command::Enrich => {
            let (mut enricher, db) = app.enricher().await?;
            run(&mut enricher, delay, cancel).await;
            tracing::info!(stats = ?enricher.stats(), "Enrichment stopped");
            db.close().await;
            Ok(())
        },
        Command::All(args) => {
            let mut archiver = app.archiver(args.start).await?;
            let mut processor = app.processor()?;
            let (mut enricher, db) = app.enricher().await?;
            tokio::join!(
                run(&mut archiver, delay, cancel.clone()),
                run(&mut processor, delay, cancel.clone()),
                run(&mut enricher, delay, cancel),
            );
            tracing::info!(stats = ?enricher.stats(), "Enrichment stopped");
            db.close().await;
            Ok(())
        },
    }
}

async fn print_cursor(app: &App) -> Result<()> {
    let path = &app.paths().cursor;
    match TimeCursor::load(path).await.or_raise(|| ErrorKind::Cursor)? {
        Some(cursor) => {
            let base = app.config().archive.base_url.trim_end_matches('/');
            println!("{cursor}");
            println!("next archive: {base}/{}{ARCHIVE_EXTENSION}", cursor.archive_name());
        },
        None => println!("no cursor stored at {}", path.display()),
    }
    Ok(())
}

/// Cancelled on Ctrl-C, or SIGTERM on Unix.
fn shutdown_token() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        wait_for_signal().await;
        tracing::info!("Shutdown requested, stopping stages");
        trigger.cancel();
    });
    token
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};
    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(terminate) => terminate,
        Err(e) => {
            tracing::warn!(error = %e, "Could not listen for SIGTERM");
            let _ = tokio::signal::ctrl_c().await;
            return;
        },
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {},
        _ = terminate.recv() => {},
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Could not listen for Ctrl-C");
        // Without a signal handler the stages only stop with the process.
        std::future::pending::<()>().await;
    }
}
