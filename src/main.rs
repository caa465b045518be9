use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;

use lnkr::cli::{AppConfig, Cli, Role};
use lnkr::logger::{ConsoleLogger, Logger, TeeLogger, TextLogger};
use lnkr::progress::{BarProgress, NoProgress, Progress};
use lnkr::transfer::{Receiver, Sender};

fn main() -> Result<()> {
    ctrlc::set_handler(move || {
        eprintln!("\nInterrupted by user. Exiting (Ctrl-C)...");
        // 128 + SIGINT
        std::process::exit(130);
    })
    .context("Error setting Ctrl-C handler")?;

    let app = Cli::parse().into_config()?;

    let console: Arc<dyn Logger> = Arc::new(ConsoleLogger::new(app.verbose));
    let logger: Arc<dyn Logger> = match &app.log_file {
        Some(path) => {
            let file = TextLogger::new(path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
            Arc::new(TeeLogger::new(vec![console, Arc::new(file) as Arc<dyn Logger>]))
        }
        None => console,
    };
    let progress: Arc<dyn Progress> = if app.quiet {
        Arc::new(NoProgress)
    } else {
        Arc::new(BarProgress::new())
    };

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?;

    rt.block_on(run(app, logger, progress))
}

async fn run(app: AppConfig, logger: Arc<dyn Logger>, progress: Arc<dyn Progress>) -> Result<()> {
    let config = Arc::new(app.transfer);
    match app.role {
        Role::Send { endpoint, entries } => {
            Sender::new(endpoint, entries, config, logger, progress)
                .listen()
                .await
        }
        Role::Receive { endpoint } => {
            let receiver = Receiver::new(endpoint, config, logger.clone(), progress);
            if let Err(e) = receiver.connect().await {
                logger.error(&format!("{:#}", e));
                return Err(e);
            }
            Ok(())
        }
    }
}
