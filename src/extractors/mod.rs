pub mod timedtext;
pub mod youtube;

pub use timedtext::parse_timedtext;
pub use youtube::YouTubeTranscriptFetcher;
