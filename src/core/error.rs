use thiserror::Error;

/// Everything that can stop a transcript from being printed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TranscriptError {
    /// No video identifier was given on the command line.
    #[error("Missing video ID")]
    MissingVideoId,

    /// The retrieval backend failed. Video not found, captions disabled,
    /// network trouble and malformed responses all land here.
    #[error("Error: {0}")]
    Retrieval(String),
}

impl TranscriptError {
    pub fn retrieval(description: impl Into<String>) -> Self {
        Self::Retrieval(description.into())
    }

    /// Process exit status for this error.
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::MissingVideoId | Self::Retrieval(_) => 1,
        }
    }
}

impl From<anyhow::Error> for TranscriptError {
    fn from(err: anyhow::Error) -> Self {
        Self::Retrieval(format!("{:#}", err))
    }
}
