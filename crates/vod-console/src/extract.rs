use std::sync::OnceLock;

use regex::Regex;

fn watch_url() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^https?://[^/\s]*youtube[^/\s]*/[^\s]*[?&]v=([^&#\s]+)")
            .expect("watch url pattern")
    })
}

fn short_url() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^https?://(?:www\.)?youtu\.be/([^?&#/\s]+)").expect("short url pattern")
    })
}

fn holodex_url() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^https?://[^/\s]*holodex\.net/(?:[^?#\s]*/)?([^?&#/\s]+)")
            .expect("holodex url pattern")
    })
}

/// Reduces a pasted watch-page or share URL to the bare video ID. Anything
/// unrecognized passes through verbatim so plain IDs keep working.
pub fn extract_video_id(input: &str) -> String {
    let input = input.trim();
    for re in [watch_url(), short_url(), holodex_url()] {
        if let Some(caps) = re.captures(input) {
            return caps[1].to_string();
        }
    }
    input.to_string()
}
