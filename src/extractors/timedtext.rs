//! Parser for YouTube's legacy timedtext caption XML:
//!
//! ```text
//! <transcript>
//!   <text start="0.5" dur="1.2">Hello &amp;amp; welcome</text>
//! </transcript>
//! ```

use crate::core::{Transcript, TranscriptEntry};
use anyhow::Result;
use html_escape::decode_html_entities;
use regex::Regex;

pub fn parse_timedtext(xml: &str) -> Result<Transcript> {
    if !xml.contains("<transcript") {
        anyhow::bail!("caption track is not in timedtext format");
    }

    let element_re = Regex::new(r#"(?s)<text\b([^>]*?)(?:/>|>(.*?)</text>)"#)?;
    let attr_re = Regex::new(r#"(\w+)="([^"]*)""#)?;
    let tag_re = Regex::new(r#"<[^>]*>"#)?;

    let mut entries = Vec::new();

    for captures in element_re.captures_iter(xml) {
        let attrs = captures.get(1).map_or("", |m| m.as_str());
        let content = match captures.get(2).map(|m| m.as_str()) {
            Some(content) if !content.is_empty() => content,
            _ => continue,
        };

        let mut start = None;
        let mut duration = 0.0;
        for attr in attr_re.captures_iter(attrs) {
            match &attr[1] {
                "start" => start = attr[2].parse::<f64>().ok(),
                "dur" => duration = attr[2].parse::<f64>().unwrap_or(0.0),
                _ => {}
            }
        }

        let Some(start) = start else {
            tracing::debug!("Skipping caption element without a valid start: {}", attrs.trim());
            continue;
        };

        // The XML layer first, then the HTML escaping YouTube puts inside it.
        let xml_decoded = decode_html_entities(content);
        let html = decode_html_entities(&xml_decoded);
        let text = tag_re.replace_all(&html, "").into_owned();

        entries.push(TranscriptEntry::new(text, start, duration));
    }

    tracing::debug!("Parsed {} caption entries", entries.len());
    Ok(Transcript::new(entries))
}
