/// instagram.rs — Instagram chain: no native extractor, so two third-party
/// conversion mirrors are tried in order. Endpoint URLs and response shapes
/// here are upstream knowledge that rots without notice; each mirror is its
/// own strategy so a dead one can be swapped without touching the driver.
use std::path::PathBuf;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use serde_json::Value;
use tracing::{debug, info};

use crate::error::DownloadError;
use crate::fetcher;
use crate::strategy::{ChainContext, DownloadRequest, Strategy, StrategyError, BROWSER_UA};

const FASTDL_API: &str = "https://fastdl.app/api/convert";
const SNAPINSTA_API: &str = "https://api.snapinsta.app/api/convert";

static POST_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:reel|p)/([A-Za-z0-9_-]+)").unwrap());

/// Post identifier from a reel/post URL, used for the stored filename.
pub fn post_id(url: &str) -> Option<String> {
    POST_ID_RE
        .captures(url)
        .map(|cap| cap[1].to_string())
}

type Rule = (&'static str, fn(&Value) -> Option<&str>);

/// Mirror services disagree on response shape; these are the known places a
/// media URL shows up, in priority order.
const MEDIA_URL_RULES: &[Rule] = &[
    ("url", |v| v.get("url").and_then(Value::as_str)),
    ("download_url", |v| v.get("download_url").and_then(Value::as_str)),
    ("video_url", |v| v.get("video_url").and_then(Value::as_str)),
    ("data", |v| nested_url(v, "data")),
    ("result", |v| nested_url(v, "result")),
];

fn nested_url<'a>(v: &'a Value, key: &str) -> Option<&'a str> {
    match v.get(key)? {
        Value::Object(map) => map
            .get("url")
            .or_else(|| map.get("download_url"))
            .and_then(Value::as_str),
        Value::String(s) => Some(s.as_str()),
        _ => None,
    }
}

pub(crate) fn media_url_from_response(body: &Value) -> Option<(&'static str, String)> {
    MEDIA_URL_RULES
        .iter()
        .find_map(|(name, rule)| rule(body).map(|u| (*name, u.to_string())))
}

fn mirror_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_UA));
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    headers
}

/// POST the post URL to a conversion mirror and sniff its response for a
/// direct media URL.
async fn convert_via(
    ctx: &ChainContext,
    api_url: &str,
    source_url: &str,
) -> Result<String, StrategyError> {
    let response = ctx
        .http
        .post(api_url)
        .timeout(std::time::Duration::from_secs(ctx.cfg.request_timeout_s))
        .headers(mirror_headers())
        .json(&serde_json::json!({ "url": source_url }))
        .send()
        .await
        .map_err(|e| StrategyError::Unavailable(format!("mirror request failed: {e}")))?;

    if !response.status().is_success() {
        return Err(StrategyError::Unavailable(format!(
            "mirror returned status {}",
            response.status()
        )));
    }

    let body: Value = response
        .json()
        .await
        .map_err(|e| StrategyError::Unavailable(format!("mirror response not JSON: {e}")))?;

    match media_url_from_response(&body) {
        Some((rule, url)) => {
            debug!(rule, "found media URL in mirror response");
            Ok(url)
        }
        None => Err(StrategyError::Unavailable(
            "no media URL in mirror response".to_string(),
        )),
    }
}

async fn run_mirror(
    api_url: &str,
    req: &DownloadRequest,
    ctx: &ChainContext,
) -> Result<PathBuf, StrategyError> {
    let id = post_id(&req.source_url).ok_or(StrategyError::Fatal(DownloadError::InvalidUrl {
        platform: "Instagram",
    }))?;
    let dest = ctx
        .cfg
        .downloads_dir
        .join(format!("{}_instagram_{id}.mp4", req.requester_id));

    let media_url = convert_via(ctx, api_url, &req.source_url).await?;
    info!(post = %id, "mirror resolved media URL, fetching");

    fetcher::fetch_to_file(
        &ctx.http,
        &media_url,
        mirror_headers(),
        &dest,
        ctx.cfg.max_file_bytes,
    )
    .await
    .map_err(|e| StrategyError::from_fetch(e, ctx))?;
    Ok(dest)
}

pub struct FastdlMirror;

#[async_trait]
impl Strategy for FastdlMirror {
    fn name(&self) -> &'static str {
        "fastdl"
    }

    async fn run(
        &self,
        req: &DownloadRequest,
        ctx: &ChainContext,
    ) -> Result<PathBuf, StrategyError> {
        run_mirror(FASTDL_API, req, ctx).await
    }
}

pub struct SnapinstaMirror;

#[async_trait]
impl Strategy for SnapinstaMirror {
    fn name(&self) -> &'static str {
        "snapinsta"
    }

    async fn run(
        &self,
        req: &DownloadRequest,
        ctx: &ChainContext,
    ) -> Result<PathBuf, StrategyError> {
        run_mirror(SNAPINSTA_API, req, ctx).await
    }
}
