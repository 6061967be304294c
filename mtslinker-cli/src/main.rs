mod cli;
mod config;
mod error;
mod input;
mod logging;

use std::process;

use clap::Parser;
use mtslink_engine::{Orchestrator, RecordingRequest};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::{
    cli::Args,
    config::AppConfig,
    error::{AppError, Result},
    input::parse_target,
    logging::init_logging,
};

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let code = run(args).await;
    process::exit(code);
}

async fn run(args: Args) -> i32 {
    // Dropped before `process::exit` so the file writer flushes.
    let _guard = match init_logging(args.verbose, args.quiet, args.log_file.as_deref()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Error: {e}");
            return 1;
        }
    };

    match download(&args).await {
        Ok(()) => 0,
        // The engine has already logged why.
        Err(AppError::DownloadFailed) => 1,
        Err(e) => {
            error!("{e}");
            1
        }
    }
}

async fn download(args: &Args) -> Result<()> {
    let config = AppConfig::load(args.config.as_deref())?;
    debug!(?config, "Effective config file");

    let target = parse_target(&args.input, args.record_id.as_deref())?;
    let orchestrator =
        Orchestrator::new(config.downloader_config(args), config.pipeline_config(args))?;
    let request = RecordingRequest::new(target.session_id)
        .with_recording_id(target.recording_id)
        .with_session_credential(config.session_credential(args))
        .with_max_duration(args.max_duration);

    let token = CancellationToken::new();
    let signal_token = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, shutting down gracefully...");
            signal_token.cancel();
        }
    });

    if orchestrator.run_download(&request, &token).await {
        Ok(())
    } else {
        Err(AppError::DownloadFailed)
    }
}
