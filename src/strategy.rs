/// strategy.rs — fallback-chain plumbing shared by all platform families.
///
/// A platform chain is an ordered list of strategies with one contract:
/// resolve the request all the way to a local media file, or fail in a way
/// that either yields to the next strategy or aborts the chain. The driver
/// below folds over the list and stops at the first success.
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::DownloadError;

/// Desktop Chrome masquerade; several upstreams reject default client UAs.
pub const BROWSER_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// One video request from one user. Immutable for its whole lifetime.
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub source_url:   String,
    pub requester_id: u64,
}

/// Shared per-process resources handed to every strategy.
#[derive(Clone)]
pub struct ChainContext {
    pub cfg:  Arc<Config>,
    pub http: reqwest::Client,
}

/// How a single strategy failed.
#[derive(Debug)]
pub enum StrategyError {
    /// This strategy could not produce a file; the next one in the chain may.
    Unavailable(String),
    /// Stop the chain immediately (size ceiling, malformed URL, ...).
    Fatal(DownloadError),
}

impl StrategyError {
    /// Fetch failures mostly mean "this source didn't pan out", except the
    /// size ceiling, which no other strategy can fix.
    pub fn from_fetch(err: crate::fetcher::FetchError, ctx: &ChainContext) -> Self {
        match err {
            crate::fetcher::FetchError::TooLarge => StrategyError::Fatal(DownloadError::TooLarge {
                limit_mb: ctx.cfg.max_file_mb(),
            }),
            other => StrategyError::Unavailable(other.to_string()),
        }
    }
}

#[async_trait]
pub trait Strategy: Send + Sync {
    /// Short name used for logging.
    fn name(&self) -> &'static str;

    async fn run(
        &self,
        req: &DownloadRequest,
        ctx: &ChainContext,
    ) -> Result<PathBuf, StrategyError>;
}

/// Walk the chain in order; first success wins, nothing runs after it.
pub async fn run_chain(
    platform: &'static str,
    strategies: &[&dyn Strategy],
    req: &DownloadRequest,
    ctx: &ChainContext,
    exhausted: &str,
) -> Result<PathBuf, DownloadError> {
    for strategy in strategies {
        match strategy.run(req, ctx).await {
            Ok(path) => {
                info!(platform, strategy = strategy.name(), path = %path.display(), "✅ resolved");
                return Ok(path);
            }
            Err(StrategyError::Unavailable(reason)) => {
                warn!(platform, strategy = strategy.name(), %reason, "strategy failed, trying next");
            }
            Err(StrategyError::Fatal(err)) => return Err(err),
        }
    }
    Err(DownloadError::ResolutionFailed(exhausted.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn test_ctx() -> ChainContext {
        ChainContext {
            cfg: Arc::new(Config {
                downloads_dir:      std::env::temp_dir(),
                max_file_bytes:     50 * 1024 * 1024,
                download_timeout_s: 120,
                cdn_retry_count:    3,
                cdn_retry_delay_s:  1,
                request_timeout_s:  20,
            }),
            http: reqwest::Client::new(),
        }
    }

    fn test_req() -> DownloadRequest {
        DownloadRequest {
            source_url:   "https://example.com/v".to_string(),
            requester_id: 7,
        }
    }

    struct Scripted {
        name:  &'static str,
        calls: AtomicUsize,
        kind:  Kind,
    }

    enum Kind {
        Succeed,
        Yield,
        Abort,
    }

    impl Scripted {
        fn new(name: &'static str, kind: Kind) -> Self {
            Self { name, calls: AtomicUsize::new(0), kind }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Strategy for Scripted {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn run(
            &self,
            _req: &DownloadRequest,
            _ctx: &ChainContext,
        ) -> Result<PathBuf, StrategyError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.kind {
                Kind::Succeed => Ok(PathBuf::from("/tmp/out.mp4")),
                Kind::Yield => Err(StrategyError::Unavailable("nope".to_string())),
                Kind::Abort => Err(StrategyError::Fatal(DownloadError::TooLarge { limit_mb: 50 })),
            }
        }
    }

    #[tokio::test]
    async fn first_success_short_circuits() {
        let a = Scripted::new("a", Kind::Yield);
        let b = Scripted::new("b", Kind::Succeed);
        let c = Scripted::new("c", Kind::Succeed);
        let out = run_chain("test", &[&a, &b, &c], &test_req(), &test_ctx(), "all failed").await;
        assert!(out.is_ok());
        assert_eq!(a.calls(), 1);
        assert_eq!(b.calls(), 1);
        assert_eq!(c.calls(), 0);
    }

    #[tokio::test]
    async fn exhausted_chain_reports_resolution_failure() {
        let a = Scripted::new("a", Kind::Yield);
        let b = Scripted::new("b", Kind::Yield);
        let out = run_chain("test", &[&a, &b], &test_req(), &test_ctx(), "all failed").await;
        match out {
            Err(DownloadError::ResolutionFailed(msg)) => assert_eq!(msg, "all failed"),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn fatal_error_aborts_without_trying_the_rest() {
        let a = Scripted::new("a", Kind::Abort);
        let b = Scripted::new("b", Kind::Succeed);
        let out = run_chain("test", &[&a, &b], &test_req(), &test_ctx(), "all failed").await;
        assert!(matches!(out, Err(DownloadError::TooLarge { .. })));
        assert_eq!(b.calls(), 0);
    }
}
