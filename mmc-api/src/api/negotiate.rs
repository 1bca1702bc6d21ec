//! `Accept` header negotiation between JSON and RDF

use mmc_common::rdf::RdfFormat;

/// One media range from an `Accept` header
#[derive(Debug, Clone, PartialEq)]
struct MediaRange {
    mime: String,
    q: f32,
}

fn parse_accept(accept: &str) -> Vec<MediaRange> {
    let mut ranges: Vec<MediaRange> = accept
        .split(',')
        .filter_map(|part| {
            let mut pieces = part.split(';');
            let mime = pieces.next()?.trim().to_ascii_lowercase();
            if mime.is_empty() {
                return None;
            }
            let q = pieces
                .filter_map(|p| p.trim().strip_prefix("q="))
                .find_map(|v| v.trim().parse::<f32>().ok())
                .unwrap_or(1.0);
            Some(MediaRange { mime, q })
        })
        .collect();
    // Stable: equal weights keep header order
    ranges.sort_by(|a, b| b.q.total_cmp(&a.q));
    ranges
}

fn is_json(mime: &str) -> bool {
    matches!(mime, "application/json" | "application/*" | "*/*")
}

/// RDF format to answer with, or `None` for JSON
///
/// RDF wins only when a supported RDF type is preferred over anything JSON
/// would satisfy. Types we can't produce are ignored.
pub fn preferred_rdf(accept: Option<&str>) -> Option<RdfFormat> {
    let accept = accept?;
    for range in parse_accept(accept) {
        if range.q <= 0.0 {
            continue;
        }
        if is_json(&range.mime) {
            return None;
        }
        if let Some(format) = RdfFormat::from_mime(&range.mime) {
            return Some(format);
        }
    }
    None
}
