use crate::core::{Transcript, TranscriptError};
use async_trait::async_trait;

/// Looks up the transcript of a video.
///
/// Implementations fold every failure mode into
/// [`TranscriptError::Retrieval`] with a readable description.
#[async_trait]
pub trait TranscriptFetcher: Send + Sync {
    fn name(&self) -> &'static str;
    async fn fetch(&self, video_id: &str) -> Result<Transcript, TranscriptError>;
}
