pub mod error;
pub mod fetcher;
pub mod transcript;

pub use error::TranscriptError;
pub use fetcher::TranscriptFetcher;
pub use transcript::{Transcript, TranscriptEntry};
