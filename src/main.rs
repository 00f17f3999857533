use clap::Parser;
use std::process::ExitCode;
use tracing::info;

use yt_transcript::cli::{log_filter, Cli};
use yt_transcript::config::Config;
use yt_transcript::{TranscriptError, YouTubeTranscriptFetcher};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    // Initialize tracing; logs go to stderr, stdout carries only the transcript line
    let rust_log = std::env::var("RUST_LOG").ok();
    let filter = log_filter(rust_log.as_deref(), cli.verbose)?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    info!("Starting yt-transcript v{}", env!("CARGO_PKG_VERSION"));

    // Build the YouTube backend
    let config = Config::load()?;
    let mut stdout = std::io::stdout();

    let fetcher = match YouTubeTranscriptFetcher::with_config(config) {
        Ok(fetcher) => fetcher,
        Err(err) => {
            // A missing video ID still wins over a broken HTTP client.
            let err = cli.video_id().err().unwrap_or_else(|| TranscriptError::from(err));
            println!("{}", err);
            return Ok(ExitCode::from(err.exit_code()));
        }
    };

    // Handle the command
    let code = cli.run(&fetcher, &mut stdout).await?;
    Ok(ExitCode::from(code))
}
