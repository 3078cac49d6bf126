/// recognize.rs — URL recognizer.
/// Decides whether free text mentions a supported platform, and pulls a
/// usable URL out of the surrounding chatter.
use once_cell::sync::Lazy;
use regex::Regex;

/// Domains the bot will try to download from.
pub const SUPPORTED_DOMAINS: &[&str] = &[
    "youtube.com", "youtu.be",
    "instagram.com",
    "tiktok.com",
    "twitter.com", "x.com",
    "facebook.com", "fb.watch",
    "smule.com",
];

static URL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"https?://[^\s<>"{}|\\^`\[\]]+"#).unwrap());

static BARE_DOMAIN_RE: Lazy<Regex> = Lazy::new(|| {
    let domains = SUPPORTED_DOMAINS
        .iter()
        .map(|d| regex::escape(d))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!(
        r#"(?i)(?:https?://)?(?:www\.)?(?:{domains})[^\s<>"{{}}|\\^`\[\]]*"#
    ))
    .unwrap()
});

/// True iff the text mentions one of the supported platforms.
pub fn is_supported(text: &str) -> bool {
    let lower = text.to_lowercase();
    SUPPORTED_DOMAINS.iter().any(|d| lower.contains(d))
}

/// Extract a URL from a text message.
///
/// Prefers a well-formed `http(s)://` token; otherwise synthesizes a URL
/// around a bare supported-domain mention. Returns the input unchanged when
/// neither is found — callers must gate on [`is_supported`] first.
pub fn extract_url(text: &str) -> String {
    if let Some(m) = URL_RE.find(text) {
        return m.as_str().to_string();
    }

    if let Some(m) = BARE_DOMAIN_RE.find(text) {
        let url = m.as_str();
        if url.to_lowercase().starts_with("http") {
            return url.to_string();
        }
        return format!("https://{url}");
    }

    text.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn supported_domains_match_case_insensitively() {
        assert!(is_supported("check this https://YouTube.com/watch?v=abc"));
        assert!(is_supported("smule.com/recording/foo/123_456"));
        assert!(is_supported("look: WWW.TIKTOK.COM/@user/video/1"));
        assert!(!is_supported("just some text"));
        assert!(!is_supported("https://example.com/video.mp4"));
    }

    #[test]
    fn extracts_exact_http_token() {
        let url = extract_url("check this out https://youtu.be/abc123 pls");
        assert_eq!(url, "https://youtu.be/abc123");
    }

    #[test]
    fn http_token_stops_at_disallowed_chars() {
        let url = extract_url("<https://youtu.be/abc123>");
        assert_eq!(url, "https://youtu.be/abc123");
    }

    #[test]
    fn synthesizes_url_from_bare_domain() {
        let url = extract_url("grab youtube.com/watch?v=xyz please");
        assert_eq!(url, "https://youtube.com/watch?v=xyz");
    }

    #[test]
    fn keeps_www_prefix_when_synthesizing() {
        let url = extract_url("see www.instagram.com/reel/XYZ/");
        assert_eq!(url, "https://www.instagram.com/reel/XYZ/");
    }

    #[test]
    fn returns_text_unchanged_when_no_url() {
        assert_eq!(extract_url("nothing to see"), "nothing to see");
    }
}
