/// smule.rs — Smule chain, longest of the three: a mirror scrape, a direct
/// page scrape through a cookie session, and finally hardcoded CDN guesses.
/// Every endpoint and field name below is upstream knowledge that changes
/// without notice; each lives inside one strategy so it can be swapped alone.
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::header::{
    HeaderMap, HeaderName, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CACHE_CONTROL, CONNECTION,
    ORIGIN, REFERER, UPGRADE_INSECURE_REQUESTS, USER_AGENT,
};
use reqwest::StatusCode;
use tracing::{debug, info, warn};

use crate::error::DownloadError;
use crate::fetcher::{self, FetchError};
use crate::strategy::{ChainContext, DownloadRequest, Strategy, StrategyError, BROWSER_UA};

const SOWNLOADER_URL: &str = "https://sownloader.com/index.php";

static RECORDING_ID_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+_\d+)").unwrap());

/// Recording identifier (`performance_track` digit pair) from a Smule URL.
pub fn recording_id(url: &str) -> Option<String> {
    RECORDING_ID_RE.captures(url).map(|cap| cap[1].to_string())
}

// Four CDN link shapes seen on the mirror page: two content-type extensions
// across the current and the previous CDN domain generation.
static MIRROR_CDN_PATTERNS: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    vec![
        (
            "new-cdn video href",
            Regex::new(r#"href=["']([^"']*c-cdnet\.cdn\.smule\.com[^"']*\.mp4[^"']*)["']"#)
                .unwrap(),
        ),
        (
            "new-cdn audio href",
            Regex::new(r#"href=["']([^"']*c-cdnet\.cdn\.smule\.com[^"']*\.m4a[^"']*)["']"#)
                .unwrap(),
        ),
        (
            "new-cdn bare",
            Regex::new(r#"(https://c-cdnet\.cdn\.smule\.com/[^\s"'<>]+\.(?:mp4|m4a))"#).unwrap(),
        ),
        (
            "old-cdn bare",
            Regex::new(r#"(https://c-cl\.cdn\.smule\.com/[^\s"'<>]+\.(?:mp4|m4a))"#).unwrap(),
        ),
    ]
});

pub(crate) fn find_mirror_cdn_link(html: &str) -> Option<(&'static str, String)> {
    MIRROR_CDN_PATTERNS
        .iter()
        .find_map(|(shape, re)| re.captures(html).map(|cap| (*shape, cap[1].to_string())))
}

// Known media-URL field spellings in the recording page's embedded JSON,
// in priority order, plus a last-resort bare CDN URL sweep.
static PAGE_MEDIA_RULES: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    vec![
        (
            "video_media_mp4_url",
            Regex::new(r#""(?:video_media_mp4_url|videoMediaMp4Url)"\s*:\s*"(https?://[^"]+)""#)
                .unwrap(),
        ),
        (
            "video_media_url",
            Regex::new(r#""(?:video_media_url|videoMediaUrl)"\s*:\s*"(https?://[^"]+)""#).unwrap(),
        ),
        (
            "media_url",
            Regex::new(r#""(?:media_url|mediaUrl)"\s*:\s*"(https?://[^"]+)""#).unwrap(),
        ),
        (
            "smule cdn url",
            Regex::new(r#"(https://[a-z0-9\-]+\.smule\.com/[^\s"'<>]+\.(?:m4a|mp4|mp3))"#).unwrap(),
        ),
    ]
});

pub(crate) fn find_page_media_url(html: &str) -> Option<(&'static str, String)> {
    PAGE_MEDIA_RULES
        .iter()
        .find_map(|(field, re)| re.captures(html).map(|cap| (*field, cap[1].to_string())))
        .map(|(field, url)| (field, url.replace("\\/", "/")))
}

/// Recording pages answer more reliably in their `sing-recording/{id}` form.
pub(crate) fn normalize_recording_url(url: &str, recording_id: &str) -> String {
    let clean = url.split('?').next().unwrap_or(url);
    if clean.contains("/recording/") {
        format!("https://www.smule.com/sing-recording/{recording_id}")
    } else {
        clean.to_string()
    }
}

fn ext_for(media_url: &str) -> &'static str {
    let path = media_url.split('?').next().unwrap_or(media_url);
    if path.ends_with(".m4a") {
        "m4a"
    } else if path.ends_with(".mp3") {
        "mp3"
    } else {
        "mp4"
    }
}

/// Full navigation masquerade for the recording page itself.
fn nav_headers() -> HeaderMap {
    let mut h = HeaderMap::new();
    h.insert(USER_AGENT, HeaderValue::from_static(BROWSER_UA));
    h.insert(
        ACCEPT,
        HeaderValue::from_static(
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,image/apng,*/*;q=0.8",
        ),
    );
    h.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
    h.insert(HeaderName::from_static("dnt"), HeaderValue::from_static("1"));
    h.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
    h.insert(UPGRADE_INSECURE_REQUESTS, HeaderValue::from_static("1"));
    h.insert(
        HeaderName::from_static("sec-fetch-dest"),
        HeaderValue::from_static("document"),
    );
    h.insert(
        HeaderName::from_static("sec-fetch-mode"),
        HeaderValue::from_static("navigate"),
    );
    h.insert(
        HeaderName::from_static("sec-fetch-site"),
        HeaderValue::from_static("none"),
    );
    h.insert(
        HeaderName::from_static("sec-fetch-user"),
        HeaderValue::from_static("?1"),
    );
    h.insert(CACHE_CONTROL, HeaderValue::from_static("max-age=0"));
    h.insert(REFERER, HeaderValue::from_static("https://www.smule.com/"));
    h
}

/// CORS-shaped header set the CDN expects for media fetches.
fn cdn_headers() -> HeaderMap {
    let mut h = HeaderMap::new();
    h.insert(USER_AGENT, HeaderValue::from_static(BROWSER_UA));
    h.insert(ACCEPT, HeaderValue::from_static("*/*"));
    h.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
    h.insert(REFERER, HeaderValue::from_static("https://www.smule.com/"));
    h.insert(ORIGIN, HeaderValue::from_static("https://www.smule.com"));
    h.insert(
        HeaderName::from_static("sec-fetch-dest"),
        HeaderValue::from_static("video"),
    );
    h.insert(
        HeaderName::from_static("sec-fetch-mode"),
        HeaderValue::from_static("cors"),
    );
    h.insert(
        HeaderName::from_static("sec-fetch-site"),
        HeaderValue::from_static("cross-site"),
    );
    h
}

fn dest_path(ctx: &ChainContext, req: &DownloadRequest, id: &str, media_url: &str) -> PathBuf {
    ctx.cfg.downloads_dir.join(format!(
        "{}_smule_{id}.{}",
        req.requester_id,
        ext_for(media_url)
    ))
}

fn require_id(req: &DownloadRequest) -> Result<String, StrategyError> {
    recording_id(&req.source_url).ok_or(StrategyError::Fatal(DownloadError::InvalidUrl {
        platform: "Smule",
    }))
}

/// The CDN sometimes rejects the first request from a fresh client; retry
/// the same URL with a short pause before giving up on it.
async fn fetch_cdn_with_retry(
    ctx: &ChainContext,
    url: &str,
    dest: &PathBuf,
) -> Result<PathBuf, StrategyError> {
    let mut last_err: Option<FetchError> = None;
    for attempt in 0..ctx.cfg.cdn_retry_count {
        if attempt > 0 {
            tokio::time::sleep(Duration::from_secs(ctx.cfg.cdn_retry_delay_s)).await;
            info!(attempt = attempt + 1, "retrying CDN download");
        }
        match fetcher::fetch_to_file(&ctx.http, url, cdn_headers(), dest, ctx.cfg.max_file_bytes)
            .await
        {
            Ok(_) => return Ok(dest.clone()),
            Err(FetchError::TooLarge) => {
                return Err(StrategyError::Fatal(DownloadError::TooLarge {
                    limit_mb: ctx.cfg.max_file_mb(),
                }))
            }
            Err(e) => {
                warn!(attempt = attempt + 1, error = %e, "CDN attempt failed");
                last_err = Some(e);
            }
        }
    }
    Err(StrategyError::Unavailable(
        last_err
            .map(|e| e.to_string())
            .unwrap_or_else(|| "CDN download failed".to_string()),
    ))
}

// ─── Strategy 1: sownloader.com mirror ────────────────────────────────────────

pub struct SownloaderMirror;

#[async_trait]
impl Strategy for SownloaderMirror {
    fn name(&self) -> &'static str {
        "sownloader"
    }

    async fn run(
        &self,
        req: &DownloadRequest,
        ctx: &ChainContext,
    ) -> Result<PathBuf, StrategyError> {
        let id = require_id(req)?;

        let response = ctx
            .http
            .get(SOWNLOADER_URL)
            .timeout(Duration::from_secs(ctx.cfg.request_timeout_s))
            .query(&[("url", req.source_url.as_str())])
            .header(USER_AGENT, BROWSER_UA)
            .send()
            .await
            .map_err(|e| StrategyError::Unavailable(format!("mirror request failed: {e}")))?;
        if !response.status().is_success() {
            return Err(StrategyError::Unavailable(format!(
                "mirror returned status {}",
                response.status()
            )));
        }

        let html = response
            .text()
            .await
            .map_err(|e| StrategyError::Unavailable(format!("mirror body unreadable: {e}")))?;
        let (shape, cdn_url) = find_mirror_cdn_link(&html).ok_or_else(|| {
            StrategyError::Unavailable("no CDN link in mirror page".to_string())
        })?;
        info!(shape, "mirror page exposed CDN link");

        let dest = dest_path(ctx, req, &id, &cdn_url);
        fetch_cdn_with_retry(ctx, &cdn_url, &dest).await
    }
}

// ─── Strategy 2: direct page scrape ───────────────────────────────────────────

pub struct PageScrape;

#[async_trait]
impl Strategy for PageScrape {
    fn name(&self) -> &'static str {
        "page-scrape"
    }

    async fn run(
        &self,
        req: &DownloadRequest,
        ctx: &ChainContext,
    ) -> Result<PathBuf, StrategyError> {
        let id = require_id(req)?;

        // Cookies must survive from the page fetch to the media fetch, and
        // no longer: the session client lives and dies inside this strategy.
        // The page GET is bounded here; the media fetch is bounded by the
        // orchestrator's budget.
        let session = reqwest::Client::builder()
            .cookie_store(true)
            .build()
            .map_err(|e| StrategyError::Unavailable(format!("session client: {e}")))?;

        let page_url = normalize_recording_url(&req.source_url, &id);
        let response = session
            .get(&page_url)
            .timeout(Duration::from_secs(ctx.cfg.request_timeout_s))
            .headers(nav_headers())
            .send()
            .await
            .map_err(|e| StrategyError::Unavailable(format!("page request failed: {e}")))?;

        let status = response.status();
        if status == StatusCode::IM_A_TEAPOT {
            // Bot challenge; the CDN-guess strategy takes over from here.
            return Err(StrategyError::Unavailable("page challenged the request (418)".to_string()));
        }
        if !status.is_success() {
            return Err(StrategyError::Unavailable(format!(
                "page returned status {status}"
            )));
        }

        let html = response
            .text()
            .await
            .map_err(|e| StrategyError::Unavailable(format!("page body unreadable: {e}")))?;
        debug!(bytes = html.len(), "fetched recording page");

        let (field, media_url) = find_page_media_url(&html).ok_or_else(|| {
            StrategyError::Unavailable("no media URL in recording page".to_string())
        })?;
        info!(field, "found media URL in recording page");

        let dest = dest_path(ctx, req, &id, &media_url);
        fetcher::fetch_to_file(
            &session,
            &media_url,
            nav_headers(),
            &dest,
            ctx.cfg.max_file_bytes,
        )
        .await
        .map_err(|e| StrategyError::from_fetch(e, ctx))?;
        Ok(dest)
    }
}

// ─── Strategy 3: hardcoded CDN guesses ────────────────────────────────────────

pub struct CdnGuess;

#[async_trait]
impl Strategy for CdnGuess {
    fn name(&self) -> &'static str {
        "cdn-guess"
    }

    async fn run(
        &self,
        req: &DownloadRequest,
        ctx: &ChainContext,
    ) -> Result<PathBuf, StrategyError> {
        let id = require_id(req)?;

        let guesses = [
            format!("https://c-fa.smule.com/{id}.m4a"),
            format!("https://c-fa.smule.com/{id}.mp4"),
            format!("https://c-fa-hp.smule.com/{id}.m4a"),
        ];

        for guess in &guesses {
            let dest = dest_path(ctx, req, &id, guess);
            match fetcher::fetch_to_file(&ctx.http, guess, cdn_headers(), &dest, ctx.cfg.max_file_bytes).await
            {
                Ok(_) => {
                    info!(url = %guess, "CDN guess hit");
                    return Ok(dest);
                }
                Err(FetchError::TooLarge) => {
                    return Err(StrategyError::Fatal(DownloadError::TooLarge {
                        limit_mb: ctx.cfg.max_file_mb(),
                    }))
                }
                Err(e) => debug!(url = %guess, error = %e, "CDN guess missed"),
            }
        }
        Err(StrategyError::Unavailable("all CDN guesses missed".to_string()))
    }
}
