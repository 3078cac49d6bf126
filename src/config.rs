/// config.rs — clipfetch config loader.
/// Reads config.json next to the binary, validates, falls back to defaults.
/// The bot token itself comes from the environment, never from config.json.
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf};

// ─── Raw JSON shapes (with optional fields for validation) ────────────────────

#[derive(Deserialize, Default, Clone)]
struct RawDownload {
    downloads_dir:      Option<String>,
    max_file_size_mb:   Option<u64>,
    timeout_s:          Option<u64>,
    cdn_retry_count:    Option<u32>,
    cdn_retry_delay_s:  Option<u64>,
}

#[derive(Deserialize, Default, Clone)]
struct RawHttp {
    request_timeout_s:  Option<u64>,
}

#[derive(Deserialize, Default, Clone)]
struct RawConfig {
    #[serde(default)]
    download: RawDownload,
    #[serde(default)]
    http:     RawHttp,
}

// ─── Validated, exported config ───────────────────────────────────────────────

#[derive(Clone, Debug, Serialize)]
pub struct Config {
    // Download budget
    pub downloads_dir:      PathBuf,
    pub max_file_bytes:     u64,     // MB → bytes
    pub download_timeout_s: u64,

    // Smule CDN retry
    pub cdn_retry_count:   u32,
    pub cdn_retry_delay_s: u64,

    // Per-request HTTP budget (scrapes and mirror calls)
    pub request_timeout_s: u64,
}

impl Config {
    pub fn max_file_mb(&self) -> u64 {
        self.max_file_bytes / 1024 / 1024
    }

    pub fn load(base_dir: &PathBuf) -> Self {
        let path = base_dir.join("config.json");
        let raw: RawConfig = if path.exists() {
            match fs::read_to_string(&path)
                .context("read config.json")
                .and_then(|s| {
                    // Strip keys starting with "_" using serde_json value manipulation
                    let mut val: serde_json::Value = serde_json::from_str(&s)?;
                    strip_comment_keys(&mut val);
                    serde_json::from_value(val).map_err(Into::into)
                }) {
                Ok(r) => r,
                Err(e) => {
                    eprintln!("⚠️  config.json parse error: {e} → using defaults");
                    RawConfig::default()
                }
            }
        } else {
            RawConfig::default()
        };

        let mut cfg = Self::from_raw(raw);
        if cfg.downloads_dir.is_relative() {
            cfg.downloads_dir = base_dir.join(&cfg.downloads_dir);
        }
        cfg
    }

    fn from_raw(r: RawConfig) -> Self {
        let d = &r.download;
        let h = &r.http;

        macro_rules! clamp {
            ($val:expr, $default:expr, $lo:expr, $hi:expr) => {{
                let v = $val.unwrap_or($default);
                let lo = $lo;
                let hi = $hi;
                if v < lo || v > hi {
                    eprintln!("⚠️  config value {} out of range [{lo},{hi}] → default {}", v, $default);
                    $default
                } else {
                    v
                }
            }};
        }

        let max_file_size_mb = clamp!(d.max_file_size_mb, 50, 1, 2000);
        let timeout_s        = clamp!(d.timeout_s, 120, 10, 3600);
        let cdn_retry_count  = clamp!(d.cdn_retry_count, 3, 1, 10);
        let cdn_retry_delay  = clamp!(d.cdn_retry_delay_s, 1, 1, 30);
        let request_timeout  = clamp!(h.request_timeout_s, 20, 5, 120);

        Config {
            downloads_dir:      PathBuf::from(
                d.downloads_dir.clone().unwrap_or_else(|| "downloads".to_string()),
            ),
            max_file_bytes:     max_file_size_mb * 1024 * 1024,
            download_timeout_s: timeout_s,

            cdn_retry_count,
            cdn_retry_delay_s:  cdn_retry_delay,

            request_timeout_s:  request_timeout,
        }
    }

    pub fn print_summary(&self) {
        println!("{}", "─".repeat(60));
        println!("⚙️  clipfetch config");
        println!("   Download: dir={}  max={}MB  timeout={}s",
            self.downloads_dir.display(), self.max_file_mb(), self.download_timeout_s);
        println!("   CDN     : retries={}  delay={}s", self.cdn_retry_count, self.cdn_retry_delay_s);
        println!("   HTTP    : request_timeout={}s", self.request_timeout_s);
        println!("{}", "─".repeat(60));
    }
}

fn strip_comment_keys(val: &mut serde_json::Value) {
    if let serde_json::Value::Object(map) = val {
        let keys_to_remove: Vec<String> = map.keys()
            .filter(|k| k.starts_with('_'))
            .cloned()
            .collect();
        for k in keys_to_remove {
            map.remove(&k);
        }
        for v in map.values_mut() {
            strip_comment_keys(v);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_empty() {
        let cfg = Config::from_raw(RawConfig::default());
        assert_eq!(cfg.max_file_bytes, 50 * 1024 * 1024);
        assert_eq!(cfg.download_timeout_s, 120);
        assert_eq!(cfg.cdn_retry_count, 3);
        assert_eq!(cfg.downloads_dir, PathBuf::from("downloads"));
    }

    #[test]
    fn out_of_range_values_fall_back() {
        let raw = RawConfig {
            download: RawDownload {
                max_file_size_mb: Some(0),
                timeout_s:        Some(999_999),
                ..Default::default()
            },
            ..Default::default()
        };
        let cfg = Config::from_raw(raw);
        assert_eq!(cfg.max_file_mb(), 50);
        assert_eq!(cfg.download_timeout_s, 120);
    }

    #[test]
    fn in_range_values_are_kept() {
        let raw = RawConfig {
            download: RawDownload {
                max_file_size_mb: Some(20),
                cdn_retry_count:  Some(5),
                ..Default::default()
            },
            ..Default::default()
        };
        let cfg = Config::from_raw(raw);
        assert_eq!(cfg.max_file_mb(), 20);
        assert_eq!(cfg.cdn_retry_count, 5);
    }

    #[test]
    fn comment_keys_are_stripped() {
        let mut val: serde_json::Value = serde_json::from_str(
            r#"{"_note": "x", "download": {"_why": "y", "timeout_s": 60}}"#,
        )
        .unwrap();
        strip_comment_keys(&mut val);
        let raw: RawConfig = serde_json::from_value(val).unwrap();
        assert_eq!(Config::from_raw(raw).download_timeout_s, 60);
    }
}
