/// ytdlp.rs — generic platform family (YouTube, TikTok, Twitter/X, Facebook),
/// backed by the external yt-dlp tool. Single-strategy chain: if yt-dlp
/// can't produce a file, nothing else will.
use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::strategy::{ChainContext, DownloadRequest, Strategy, StrategyError};

pub struct YtDlp;

#[async_trait]
impl Strategy for YtDlp {
    fn name(&self) -> &'static str {
        "yt-dlp"
    }

    async fn run(
        &self,
        req: &DownloadRequest,
        ctx: &ChainContext,
    ) -> Result<PathBuf, StrategyError> {
        let template = ctx
            .cfg
            .downloads_dir
            .join(format!("{}_%(id)s.%(ext)s", req.requester_id));
        // Best quality that still fits the ceiling, falling back to plain
        // best; the orchestrator re-checks the size either way.
        let format = format!("best[filesize<{}M]/best", ctx.cfg.max_file_mb());

        debug!(url = %req.source_url, "invoking yt-dlp");
        let output = Command::new("yt-dlp")
            .arg("--quiet")
            .arg("--no-warnings")
            .arg("--format")
            .arg(&format)
            .arg("--merge-output-format")
            .arg("mp4")
            .arg("--recode-video")
            .arg("mp4")
            .arg("--output")
            .arg(&template)
            .arg("--print")
            .arg("after_move:filepath")
            .arg("--no-simulate")
            .arg("--")
            .arg(&req.source_url)
            .stdin(Stdio::null())
            // The orchestrator's timeout drops this future; the child must
            // not outlive it.
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| StrategyError::Unavailable(format!("failed to spawn yt-dlp: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let reason = last_nonempty_line(&stderr)
                .unwrap_or("yt-dlp exited with an error")
                .to_string();
            return Err(StrategyError::Unavailable(reason));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let path = last_nonempty_line(&stdout)
            .map(PathBuf::from)
            .ok_or_else(|| StrategyError::Unavailable("yt-dlp reported no output file".to_string()))?;

        if tokio::fs::metadata(&path).await.is_err() {
            return Err(StrategyError::Unavailable(format!(
                "yt-dlp output missing: {}",
                path.display()
            )));
        }
        Ok(path)
    }
}

fn last_nonempty_line(s: &str) -> Option<&str> {
    s.lines().rev().map(str::trim).find(|l| !l.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_the_last_nonempty_line() {
        assert_eq!(
            last_nonempty_line("warning\n/tmp/7_abc.mp4\n\n"),
            Some("/tmp/7_abc.mp4")
        );
        assert_eq!(last_nonempty_line("\n  \n"), None);
    }
}
