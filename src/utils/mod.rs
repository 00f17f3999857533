use url::Url;

/// Reduces a watch URL to its bare video ID. Anything that is not a
/// recognisable YouTube URL is returned unchanged.
pub fn normalize_video_id(input: &str) -> String {
    Url::parse(input)
        .ok()
        .and_then(|url| video_id_from_url(&url))
        .unwrap_or_else(|| input.to_string())
}

pub fn video_id_from_url(url: &Url) -> Option<String> {
    let host = url.host_str()?;

    if host == "youtu.be" {
        return url
            .path_segments()?
            .next()
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string());
    }

    if !host.contains("youtube.com") {
        return None;
    }

    if let Some((_, v)) = url.query_pairs().find(|(key, _)| key == "v") {
        if !v.is_empty() {
            return Some(v.to_string());
        }
    }

    let mut segments = url.path_segments()?;
    match (segments.next(), segments.next()) {
        (Some("shorts" | "embed" | "live" | "v"), Some(id)) if !id.is_empty() => Some(id.to_string()),
        _ => None,
    }
}
