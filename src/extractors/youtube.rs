use crate::config::Config;
use crate::core::{Transcript, TranscriptError, TranscriptFetcher};
use crate::extractors::timedtext::parse_timedtext;
use crate::utils::normalize_video_id;
use anyhow::{Context, Result};
use async_trait::async_trait;
use regex::Regex;
use reqwest::cookie::Jar;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use url::Url;

const WATCH_URL: &str = "https://www.youtube.com/watch?v=";
const INNERTUBE_PLAYER_URL: &str = "https://www.youtube.com/youtubei/v1/player?key=";
const CONSENT_FORM_ACTION: &str = r#"action="https://consent.youtube.com/s""#;

const REASON_BOT_DETECTED: &str = "Sign in to confirm you\u{2019}re not a bot";
const REASON_AGE_RESTRICTED: &str = "This video may be inappropriate for some users.";
const REASON_UNAVAILABLE: &str = "This video is unavailable";

/// Fetches transcripts straight from YouTube: watch page for the innertube
/// key, innertube player call for caption tracks, then the timedtext XML.
pub struct YouTubeTranscriptFetcher {
    client: reqwest::Client,
    cookies: Arc<Jar>,
    config: Config,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CaptionTrack {
    pub base_url: String,
    pub language_code: String,
    pub kind: Option<String>,
    pub name: Option<Value>,
}

impl CaptionTrack {
    pub fn is_generated(&self) -> bool {
        self.kind.as_deref() == Some("asr")
    }

    fn label(&self) -> String {
        let name = self.name.as_ref().and_then(|name| {
            name.get("simpleText")
                .and_then(|v| v.as_str())
                .map(|s| s.to_string())
                .or_else(|| {
                    name.get("runs")?.as_array().map(|runs| {
                        runs.iter()
                            .filter_map(|run| run.get("text").and_then(|t| t.as_str()))
                            .collect::<String>()
                    })
                })
        });

        match name {
            Some(name) if !name.is_empty() => format!("{} ({})", self.language_code, name),
            _ => self.language_code.clone(),
        }
    }
}

impl YouTubeTranscriptFetcher {
    pub fn new() -> Result<Self> {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Result<Self> {
        let cookies = Arc::new(Jar::default());
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(std::time::Duration::from_secs(config.timeout))
            .cookie_provider(cookies.clone())
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .context("failed to create HTTP client")?;

        Ok(Self {
            client,
            cookies,
            config,
        })
    }

    async fn fetch_transcript(&self, video_id: &str) -> Result<Transcript> {
        // The watch page only matters for the innertube API key
        let html = self.fetch_watch_page(video_id).await?;
        let api_key = extract_innertube_api_key(&html)?;
        tracing::debug!("Found innertube API key");

        // Ask the player endpoint for playability and caption tracks
        let player_response = self.fetch_player_response(video_id, &api_key).await?;
        check_playability(video_id, &player_response)?;

        let tracks = caption_tracks(video_id, &player_response)?;
        tracing::debug!(
            "Available caption tracks: {:?}",
            tracks.iter().map(CaptionTrack::label).collect::<Vec<_>>()
        );

        // Manual captions before auto-generated ones, per language
        let track = select_track(video_id, &tracks, &self.config.languages)?;
        tracing::info!(
            "Using caption track {}{}",
            track.label(),
            if track.is_generated() { " [auto-generated]" } else { "" }
        );

        self.fetch_timedtext(track).await
    }

    async fn fetch_watch_page(&self, video_id: &str) -> Result<String> {
        let html = self.get_watch_page(video_id).await?;
        if !is_consent_page(&html) {
            return Ok(html);
        }

        // EU visitors get a cookie consent form first; accept it once and retry
        tracing::debug!("Got consent page, accepting and retrying");
        let value = extract_consent_value(&html)?;
        let youtube = Url::parse("https://www.youtube.com")?;
        self.cookies.add_cookie_str(&consent_cookie(&value), &youtube);

        let html = self.get_watch_page(video_id).await?;
        ensure_past_consent(html)
    }

    async fn get_watch_page(&self, video_id: &str) -> Result<String> {
        let url = format!("{}{}", WATCH_URL, urlencoding::encode(video_id));
        tracing::debug!("Fetching {}", url);

        let response = self
            .client
            .get(&url)
            .header(
                "Accept",
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            )
            .header("Accept-Language", "en-US")
            .send()
            .await
            .context("failed to fetch video page")?;

        let response = check_status(response).context("failed to fetch video page")?;
        Ok(response.text().await?)
    }

    async fn fetch_player_response(&self, video_id: &str, api_key: &str) -> Result<Value> {
        let url = format!("{}{}", INNERTUBE_PLAYER_URL, api_key);
        let body = json!({
            "context": {
                "client": {
                    "clientName": self.config.innertube_client_name,
                    "clientVersion": self.config.innertube_client_version,
                }
            },
            "videoId": video_id,
        });

        let response = self
            .client
            .post(&url)
            .header("Accept-Language", "en-US")
            .json(&body)
            .send()
            .await
            .context("failed to fetch player response")?;

        let response = check_status(response).context("failed to fetch player response")?;
        response
            .json::<Value>()
            .await
            .context("player response is not valid JSON")
    }

    async fn fetch_timedtext(&self, track: &CaptionTrack) -> Result<Transcript> {
        let url = timedtext_url(&track.base_url)?;
        let response = self
            .client
            .get(&url)
            .header("Accept-Language", "en-US")
            .send()
            .await
            .context("failed to fetch caption track")?;

        let response = check_status(response).context("failed to fetch caption track")?;
        let xml = response.text().await?;
        transcript_from_body(&xml)
    }
}

#[async_trait]
impl TranscriptFetcher for YouTubeTranscriptFetcher {
    fn name(&self) -> &'static str {
        "YouTube"
    }

    async fn fetch(&self, video_id: &str) -> Result<Transcript, TranscriptError> {
        let video_id = normalize_video_id(video_id);
        self.fetch_transcript(&video_id)
            .await
            .map_err(TranscriptError::from)
    }
}

fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        anyhow::bail!("too many requests from this IP (HTTP 429)");
    }
    if !status.is_success() {
        anyhow::bail!("HTTP {}", status);
    }
    Ok(response)
}

fn is_consent_page(html: &str) -> bool {
    html.contains(CONSENT_FORM_ACTION)
}

fn consent_cookie(value: &str) -> String {
    format!("CONSENT=YES+{}; Domain=.youtube.com; Path=/", value)
}

fn ensure_past_consent(html: String) -> Result<String> {
    if is_consent_page(&html) {
        anyhow::bail!("failed to accept YouTube's cookie consent");
    }
    Ok(html)
}

/// Caption URL to download, in the legacy timedtext format.
fn timedtext_url(base_url: &str) -> Result<String> {
    if base_url.contains("&exp=xpe") {
        anyhow::bail!("caption track requires a PO token");
    }
    Ok(base_url.replace("&fmt=srv3", ""))
}

fn transcript_from_body(xml: &str) -> Result<Transcript> {
    if xml.is_empty() {
        anyhow::bail!("caption track is empty");
    }
    parse_timedtext(xml)
}

fn extract_innertube_api_key(html: &str) -> Result<String> {
    let re = Regex::new(r#""INNERTUBE_API_KEY":\s*"([a-zA-Z0-9_-]+)""#)?;
    if let Some(captures) = re.captures(html) {
        return Ok(captures[1].to_string());
    }

    if html.contains(r#"class="g-recaptcha""#) {
        anyhow::bail!("too many requests from this IP (captcha required)");
    }
    anyhow::bail!("could not find the innertube API key on the video page");
}

fn extract_consent_value(html: &str) -> Result<String> {
    let re = Regex::new(r#"name="v" value="([^"]*)""#)?;
    re.captures(html)
        .map(|captures| captures[1].to_string())
        .ok_or_else(|| anyhow::anyhow!("failed to accept YouTube's cookie consent"))
}

fn check_playability(video_id: &str, player_response: &Value) -> Result<()> {
    let playability = player_response.get("playabilityStatus");
    let status = playability
        .and_then(|p| p.get("status"))
        .and_then(|v| v.as_str());
    if status == Some("OK") {
        return Ok(());
    }

    let reason = playability
        .and_then(|p| p.get("reason"))
        .and_then(|v| v.as_str())
        .unwrap_or_default();

    match status {
        Some("LOGIN_REQUIRED") if reason == REASON_BOT_DETECTED => {
            anyhow::bail!("YouTube is blocking requests from this IP")
        }
        Some("LOGIN_REQUIRED") if reason == REASON_AGE_RESTRICTED => {
            anyhow::bail!("video {} is age restricted", video_id)
        }
        Some("ERROR") if reason == REASON_UNAVAILABLE => {
            anyhow::bail!("video {} is unavailable", video_id)
        }
        _ if reason.is_empty() => anyhow::bail!("video {} is unplayable", video_id),
        _ => anyhow::bail!("video {} is unplayable: {}", video_id, reason),
    }
}

fn caption_tracks(video_id: &str, player_response: &Value) -> Result<Vec<CaptionTrack>> {
    let tracks = player_response
        .pointer("/captions/playerCaptionsTracklistRenderer/captionTracks")
        .cloned()
        .ok_or_else(|| anyhow::anyhow!("transcripts are disabled for video {}", video_id))?;

    let tracks: Vec<CaptionTrack> =
        serde_json::from_value(tracks).context("malformed caption track list")?;
    if tracks.is_empty() {
        anyhow::bail!("transcripts are disabled for video {}", video_id);
    }
    Ok(tracks)
}

/// Picks a track for the first language that has one, preferring
/// manually created captions over auto-generated ones.
fn select_track<'a>(
    video_id: &str,
    tracks: &'a [CaptionTrack],
    languages: &[String],
) -> Result<&'a CaptionTrack> {
    for language in languages {
        let matching: Vec<&CaptionTrack> = tracks
            .iter()
            .filter(|t| &t.language_code == language)
            .collect();
        if let Some(track) = matching
            .iter()
            .find(|t| !t.is_generated())
            .or(matching.first())
        {
            return Ok(*track);
        }
    }

    let available = tracks
        .iter()
        .map(|t| {
            if t.is_generated() {
                format!("{} [auto-generated]", t.label())
            } else {
                t.label()
            }
        })
        .collect::<Vec<_>>()
        .join(", ");
    anyhow::bail!(
        "no transcript found for video {} in languages [{}]; available: {}",
        video_id,
        languages.join(", "),
        available
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(language_code: &str, kind: Option<&str>) -> CaptionTrack {
        CaptionTrack {
            base_url: format!("https://www.youtube.com/api/timedtext?v=x&lang={}", language_code),
            language_code: language_code.to_string(),
            kind: kind.map(|k| k.to_string()),
            name: None,
        }
    }

    fn langs(codes: &[&str]) -> Vec<String> {
        codes.iter().map(|c| c.to_string()).collect()
    }

    fn response(status: u16) -> reqwest::Response {
        let response = http::Response::builder()
            .status(status)
            .body("")
            .unwrap();
        reqwest::Response::from(response)
    }

    #[test]
    fn test_check_status_passes_success() {
        assert!(check_status(response(200)).is_ok());
        assert!(check_status(response(204)).is_ok());
    }

    #[test]
    fn test_check_status_rate_limited() {
        let err = check_status(response(429)).unwrap_err();
        assert_eq!(err.to_string(), "too many requests from this IP (HTTP 429)");
    }

    #[test]
    fn test_check_status_other_failures() {
        let err = check_status(response(404)).unwrap_err();
        assert_eq!(err.to_string(), "HTTP 404 Not Found");

        let err = check_status(response(500)).unwrap_err();
        assert_eq!(err.to_string(), "HTTP 500 Internal Server Error");
    }

    #[test]
    fn test_consent_page_detection() {
        let consent = r#"<form action="https://consent.youtube.com/s" method="POST"><input name="v" value="cb"></form>"#;
        assert!(is_consent_page(consent));
        assert!(!is_consent_page(r#"<html>"INNERTUBE_API_KEY":"abc"</html>"#));
    }

    #[test]
    fn test_consent_cookie() {
        assert_eq!(
            consent_cookie("cb.20210328-17-p0.en+FX+123"),
            "CONSENT=YES+cb.20210328-17-p0.en+FX+123; Domain=.youtube.com; Path=/"
        );
    }

    #[test]
    fn test_still_on_consent_page_after_retry() {
        let consent = r#"<form action="https://consent.youtube.com/s"></form>"#.to_string();
        let err = ensure_past_consent(consent).unwrap_err();
        assert_eq!(err.to_string(), "failed to accept YouTube's cookie consent");

        let page = "<html>video</html>".to_string();
        assert_eq!(ensure_past_consent(page).unwrap(), "<html>video</html>");
    }

    #[test]
    fn test_timedtext_url_drops_srv3_format() {
        let url = timedtext_url("https://www.youtube.com/api/timedtext?v=abc&lang=en&fmt=srv3&sig=1").unwrap();
        assert_eq!(url, "https://www.youtube.com/api/timedtext?v=abc&lang=en&sig=1");

        let plain = "https://www.youtube.com/api/timedtext?v=abc&lang=en";
        assert_eq!(timedtext_url(plain).unwrap(), plain);
    }

    #[test]
    fn test_timedtext_url_refuses_po_token_tracks() {
        let err = timedtext_url("https://www.youtube.com/api/timedtext?v=abc&exp=xpe&lang=en").unwrap_err();
        assert_eq!(err.to_string(), "caption track requires a PO token");
    }

    #[test]
    fn test_empty_caption_body_fails() {
        let err = transcript_from_body("").unwrap_err();
        assert_eq!(err.to_string(), "caption track is empty");

        let transcript = transcript_from_body(r#"<transcript><text start="0" dur="1">hi</text></transcript>"#).unwrap();
        assert_eq!(transcript.to_plain_text(), "hi");
    }

    #[test]
    fn test_extract_innertube_api_key() {
        let html = r#"<script>ytcfg.set({"INNERTUBE_API_KEY": "AIzaSy_abc-123","OTHER":1})</script>"#;
        assert_eq!(extract_innertube_api_key(html).unwrap(), "AIzaSy_abc-123");
    }

    #[test]
    fn test_missing_api_key_reports_captcha() {
        let err = extract_innertube_api_key(r#"<div class="g-recaptcha"></div>"#).unwrap_err();
        assert!(err.to_string().contains("too many requests"));

        let err = extract_innertube_api_key("<html></html>").unwrap_err();
        assert!(err.to_string().contains("innertube API key"));
    }

    #[test]
    fn test_extract_consent_value() {
        let html = r#"<form action="https://consent.youtube.com/s"><input type="hidden" name="v" value="cb.20210328-17-p0.en+FX+123"></form>"#;
        assert_eq!(extract_consent_value(html).unwrap(), "cb.20210328-17-p0.en+FX+123");
        assert!(extract_consent_value("<form></form>").is_err());
    }

    #[test]
    fn test_playability_ok() {
        let response = json!({ "playabilityStatus": { "status": "OK" } });
        assert!(check_playability("abc123", &response).is_ok());
    }

    #[test]
    fn test_playability_failures() {
        let cases = [
            (json!({ "playabilityStatus": { "status": "ERROR", "reason": REASON_UNAVAILABLE } }),
             "video abc123 is unavailable"),
            (json!({ "playabilityStatus": { "status": "LOGIN_REQUIRED", "reason": REASON_AGE_RESTRICTED } }),
             "video abc123 is age restricted"),
            (json!({ "playabilityStatus": { "status": "LOGIN_REQUIRED", "reason": REASON_BOT_DETECTED } }),
             "YouTube is blocking requests from this IP"),
            (json!({ "playabilityStatus": { "status": "UNPLAYABLE", "reason": "Private video" } }),
             "video abc123 is unplayable: Private video"),
            (json!({}), "video abc123 is unplayable"),
        ];

        for (response, expected) in cases {
            let err = check_playability("abc123", &response).unwrap_err();
            assert_eq!(err.to_string(), expected);
        }
    }

    #[test]
    fn test_caption_tracks_disabled() {
        let err = caption_tracks("abc123", &json!({ "captions": {} })).unwrap_err();
        assert_eq!(err.to_string(), "transcripts are disabled for video abc123");

        let response = json!({ "captions": { "playerCaptionsTracklistRenderer": { "captionTracks": [] } } });
        assert!(caption_tracks("abc123", &response).is_err());
    }

    #[test]
    fn test_caption_tracks_parsed() {
        let response = json!({
            "captions": { "playerCaptionsTracklistRenderer": { "captionTracks": [
                { "baseUrl": "https://example.com/a", "languageCode": "en", "kind": "asr",
                  "name": { "runs": [{ "text": "English (auto-generated)" }] } },
                { "baseUrl": "https://example.com/b", "languageCode": "de",
                  "name": { "simpleText": "German" } }
            ] } }
        });

        let tracks = caption_tracks("abc123", &response).unwrap();
        assert_eq!(tracks.len(), 2);
        assert!(tracks[0].is_generated());
        assert_eq!(tracks[0].label(), "en (English (auto-generated))");
        assert!(!tracks[1].is_generated());
        assert_eq!(tracks[1].label(), "de (German)");
    }

    #[test]
    fn test_caption_track_optional_fields_missing() {
        let response = json!({
            "captions": { "playerCaptionsTracklistRenderer": { "captionTracks": [
                { "baseUrl": "https://example.com/a", "languageCode": "en" }
            ] } }
        });

        let tracks = caption_tracks("abc123", &response).unwrap();
        assert!(tracks[0].kind.is_none());
        assert!(tracks[0].name.is_none());
        assert!(!tracks[0].is_generated());
        assert_eq!(tracks[0].label(), "en");
    }

    #[test]
    fn test_select_prefers_manual_track() {
        let tracks = vec![track("en", Some("asr")), track("en", None)];
        let chosen = select_track("abc123", &tracks, &langs(&["en"])).unwrap();
        assert!(!chosen.is_generated());
    }

    #[test]
    fn test_select_falls_back_to_generated() {
        let tracks = vec![track("de", None), track("en", Some("asr"))];
        let chosen = select_track("abc123", &tracks, &langs(&["en"])).unwrap();
        assert_eq!(chosen.language_code, "en");
        assert!(chosen.is_generated());
    }

    #[test]
    fn test_select_respects_language_order() {
        let tracks = vec![track("en", None), track("de", Some("asr"))];
        let chosen = select_track("abc123", &tracks, &langs(&["de", "en"])).unwrap();
        assert_eq!(chosen.language_code, "de");
    }

    #[test]
    fn test_select_reports_available_tracks() {
        let tracks = vec![track("de", None), track("fr", Some("asr"))];
        let err = select_track("abc123", &tracks, &langs(&["en"])).unwrap_err();
        assert_eq!(
            err.to_string(),
            "no transcript found for video abc123 in languages [en]; available: de, fr [auto-generated]"
        );
    }
}
