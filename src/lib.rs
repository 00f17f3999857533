pub mod cli;
pub mod config;
pub mod core;
pub mod extractors;
pub mod utils;

pub use crate::core::{Transcript, TranscriptEntry, TranscriptError, TranscriptFetcher};
pub use crate::extractors::YouTubeTranscriptFetcher;
