/// downloader.rs — download orchestrator.
///
/// Picks the platform chain for a URL, runs it under the wall-clock budget,
/// re-checks the size ceiling on whatever came out, and sweeps the
/// requester's partial files on every failure path.
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::time::timeout;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::DownloadError;
use crate::instagram;
use crate::smule;
use crate::strategy::{run_chain, ChainContext, DownloadRequest};
use crate::ytdlp;

pub async fn download_media(
    req: &DownloadRequest,
    ctx: &ChainContext,
) -> Result<PathBuf, DownloadError> {
    info!(url = %req.source_url, requester = req.requester_id, "📥 starting download");

    let budget = Duration::from_secs(ctx.cfg.download_timeout_s);
    let outcome = match with_deadline(budget, run_platform_chain(req, ctx)).await {
        Ok(path) => enforce_size_ceiling(path, &ctx.cfg).await,
        Err(e) => Err(e),
    };

    if outcome.is_err() {
        sweep_partials(&ctx.cfg.downloads_dir, req.requester_id).await;
    }
    outcome
}

pub(crate) async fn with_deadline<F>(budget: Duration, fut: F) -> Result<PathBuf, DownloadError>
where
    F: std::future::Future<Output = Result<PathBuf, DownloadError>>,
{
    match timeout(budget, fut).await {
        Ok(outcome) => outcome,
        Err(_) => Err(DownloadError::Timeout),
    }
}

async fn run_platform_chain(
    req: &DownloadRequest,
    ctx: &ChainContext,
) -> Result<PathBuf, DownloadError> {
    let url = req.source_url.to_lowercase();
    if url.contains("smule.com") {
        run_chain(
            "smule",
            &[&smule::SownloaderMirror, &smule::PageScrape, &smule::CdnGuess],
            req,
            ctx,
            "Could not find a media URL for this Smule recording. It might be private or removed.",
        )
        .await
    } else if url.contains("instagram.com") {
        run_chain(
            "instagram",
            &[&instagram::FastdlMirror, &instagram::SnapinstaMirror],
            req,
            ctx,
            "Instagram download failed. Please try again later.",
        )
        .await
    } else {
        run_chain(
            "generic",
            &[&ytdlp::YtDlp],
            req,
            ctx,
            "Download failed. The video might be private or unavailable.",
        )
        .await
    }
}

/// The generic chain can fall back past its size-capped format selector, so
/// the ceiling is re-checked on whatever the chain produced.
async fn enforce_size_ceiling(path: PathBuf, cfg: &Config) -> Result<PathBuf, DownloadError> {
    let len = match tokio::fs::metadata(&path).await {
        Ok(m) => m.len(),
        Err(_) => return Err(DownloadError::MissingFile(path)),
    };
    if len > cfg.max_file_bytes {
        let _ = tokio::fs::remove_file(&path).await;
        info!(bytes = len, "downloaded file over the ceiling, removed");
        return Err(DownloadError::TooLarge {
            limit_mb: cfg.max_file_mb(),
        });
    }
    Ok(path)
}

/// Best-effort sweep of `{requester}_*` files; never fails the request.
pub async fn sweep_partials(dir: &Path, requester_id: u64) {
    let prefix = format!("{requester_id}_");
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(e) => e,
        Err(_) => return,
    };
    while let Ok(Some(entry)) = entries.next_entry().await {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if name.starts_with(&prefix) {
            match tokio::fs::remove_file(entry.path()).await {
                Ok(()) => info!(file = name, "🧹 swept partial download"),
                Err(e) => warn!(file = name, error = %e, "failed to sweep partial download"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_cfg(dir: PathBuf) -> Config {
        Config {
            downloads_dir:      dir,
            max_file_bytes:     1024,
            download_timeout_s: 1,
            cdn_retry_count:    3,
            cdn_retry_delay_s:  1,
            request_timeout_s:  20,
        }
    }

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("clipfetch_dl_{}_{name}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_maps_to_timeout_error() {
        let slow = async {
            tokio::time::sleep(Duration::from_secs(600)).await;
            Ok(PathBuf::from("/tmp/never.mp4"))
        };
        let out = with_deadline(Duration::from_secs(120), slow).await;
        assert!(matches!(out, Err(DownloadError::Timeout)));
    }

    #[tokio::test]
    async fn deadline_passes_results_through() {
        let out = with_deadline(Duration::from_secs(5), async {
            Ok(PathBuf::from("/tmp/done.mp4"))
        })
        .await;
        assert_eq!(out.unwrap(), PathBuf::from("/tmp/done.mp4"));

        let out = with_deadline(Duration::from_secs(5), async {
            Err(DownloadError::ResolutionFailed("nope".to_string()))
        })
        .await;
        assert!(matches!(out, Err(DownloadError::ResolutionFailed(_))));
    }

    #[tokio::test]
    async fn oversized_files_are_removed() {
        let dir = scratch_dir("ceiling");
        let path = dir.join("7_big.mp4");
        tokio::fs::write(&path, vec![0u8; 4096]).await.unwrap();

        let out = enforce_size_ceiling(path.clone(), &test_cfg(dir.clone())).await;
        assert!(matches!(out, Err(DownloadError::TooLarge { .. })));
        assert!(!path.exists());
        let _ = tokio::fs::remove_dir_all(&dir).await;
    }

    #[tokio::test]
    async fn missing_chain_output_is_an_error() {
        let dir = scratch_dir("missing");
        let out = enforce_size_ceiling(dir.join("7_ghost.mp4"), &test_cfg(dir.clone())).await;
        assert!(matches!(out, Err(DownloadError::MissingFile(_))));
        let _ = tokio::fs::remove_dir_all(&dir).await;
    }

    #[tokio::test]
    async fn sweep_only_touches_the_requester_prefix() {
        let dir = scratch_dir("sweep");
        tokio::fs::write(dir.join("7_smule_1_2.mp4"), b"a").await.unwrap();
        tokio::fs::write(dir.join("7_other.part"), b"b").await.unwrap();
        tokio::fs::write(dir.join("8_keep.mp4"), b"c").await.unwrap();

        sweep_partials(&dir, 7).await;

        assert!(!dir.join("7_smule_1_2.mp4").exists());
        assert!(!dir.join("7_other.part").exists());
        assert!(dir.join("8_keep.mp4").exists());
        let _ = tokio::fs::remove_dir_all(&dir).await;
    }
}
