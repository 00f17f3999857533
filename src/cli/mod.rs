use clap::Parser;
use std::io::Write;
use tracing::debug;
use tracing_subscriber::EnvFilter;
use crate::core::{TranscriptError, TranscriptFetcher};

#[derive(Parser, Debug)]
#[command(name = "yt-transcript")]
#[command(about = "Print the transcript of a YouTube video as plain text")]
#[command(version)]
pub struct Cli {
    /// YouTube video ID (a watch URL also works)
    #[arg(value_name = "VIDEO_ID", allow_hyphen_values = true)]
    pub video_id: Option<String>,

    /// Anything after the first video ID is ignored
    #[arg(value_name = "IGNORED", hide = true, allow_hyphen_values = true)]
    pub ignored: Vec<String>,

    /// Enable verbose logging on stderr
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    pub fn video_id(&self) -> Result<&str, TranscriptError> {
        self.video_id
            .as_deref()
            .ok_or(TranscriptError::MissingVideoId)
    }

    /// Looks up the transcript and flattens it to one line of text.
    pub async fn transcript_text(
        &self,
        fetcher: &dyn TranscriptFetcher,
    ) -> Result<String, TranscriptError> {
        let video_id = self.video_id()?;
        if !self.ignored.is_empty() {
            debug!("Ignoring extra arguments: {:?}", self.ignored);
        }

        debug!("Fetching transcript for {} via {}", video_id, fetcher.name());
        let transcript = fetcher.fetch(video_id).await?;
        debug!("Got {} transcript entries", transcript.len());

        Ok(transcript.to_plain_text())
    }

    /// Writes the transcript, or the error line, to `out` and returns the
    /// process exit status.
    pub async fn run<W: Write>(
        &self,
        fetcher: &dyn TranscriptFetcher,
        out: &mut W,
    ) -> std::io::Result<u8> {
        match self.transcript_text(fetcher).await {
            Ok(text) => {
                writeln!(out, "{}", text)?;
                Ok(0)
            }
            Err(err) => {
                debug!("Transcript lookup failed: {:?}", err);
                writeln!(out, "{}", err)?;
                Ok(err.exit_code())
            }
        }
    }
}

/// Log filter from `RUST_LOG`, falling back to `warn`. `--verbose` adds
/// debug output for this crate on top.
pub fn log_filter(rust_log: Option<&str>, verbose: bool) -> anyhow::Result<EnvFilter> {
    let mut filter = rust_log
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new("warn"));
    if verbose {
        filter = filter.add_directive("yt_transcript=debug".parse()?);
    }
    Ok(filter)
}
