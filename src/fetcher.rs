/// fetcher.rs — streamed media retrieval with a live size ceiling.
///
/// The ceiling is enforced twice: a content-length pre-check before any byte
/// moves, and a running counter while streaming. Crossing it mid-stream
/// aborts the transfer and deletes the partial file.
use std::path::Path;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use reqwest::header::HeaderMap;
use reqwest::{Client, StatusCode};
use thiserror::Error;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

/// Bodies smaller than this are error pages masquerading as media.
pub const MIN_MEDIA_BYTES: u64 = 1000;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP status {0}")]
    BadStatus(StatusCode),

    #[error("size ceiling exceeded")]
    TooLarge,

    #[error("body too small ({0} bytes)")]
    TooSmall(u64),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Stream `url` into `dest`, returning the byte count on success.
pub async fn fetch_to_file(
    client: &Client,
    url: &str,
    headers: HeaderMap,
    dest: &Path,
    max_bytes: u64,
) -> Result<u64, FetchError> {
    let response = client.get(url).headers(headers).send().await?;
    if !response.status().is_success() {
        return Err(FetchError::BadStatus(response.status()));
    }

    if let Some(len) = response.content_length() {
        if len > max_bytes {
            return Err(FetchError::TooLarge);
        }
    }

    write_stream_capped(response.bytes_stream(), dest, max_bytes).await?;
    validate_media_file(dest).await
}

/// Write a byte stream to `dest`, aborting the instant the running total
/// crosses `max_bytes`. The partial file never outlives a failure here.
pub(crate) async fn write_stream_capped<S, E>(
    stream: S,
    dest: &Path,
    max_bytes: u64,
) -> Result<u64, FetchError>
where
    S: Stream<Item = Result<Bytes, E>>,
    FetchError: From<E>,
{
    let mut stream = std::pin::pin!(stream);
    let mut file = File::create(dest).await?;
    let mut written: u64 = 0;

    while let Some(chunk) = stream.next().await {
        let chunk = match chunk {
            Ok(c) => c,
            Err(e) => {
                drop(file);
                let _ = tokio::fs::remove_file(dest).await;
                return Err(e.into());
            }
        };

        written += chunk.len() as u64;
        if written > max_bytes {
            drop(file);
            let _ = tokio::fs::remove_file(dest).await;
            return Err(FetchError::TooLarge);
        }

        file.write_all(&chunk).await?;
    }

    file.flush().await?;
    Ok(written)
}

/// Completion check shared by chain callers: the file must exist and exceed
/// the plausibility floor, otherwise it is removed and the fetch fails.
pub async fn validate_media_file(path: &Path) -> Result<u64, FetchError> {
    let len = tokio::fs::metadata(path).await?.len();
    if len < MIN_MEDIA_BYTES {
        let _ = tokio::fs::remove_file(path).await;
        return Err(FetchError::TooSmall(len));
    }
    Ok(len)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::path::PathBuf;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("clipfetch_test_{}_{name}", std::process::id()))
    }

    fn byte_stream(
        chunks: Vec<Vec<u8>>,
    ) -> impl Stream<Item = Result<Bytes, io::Error>> + Unpin {
        futures::stream::iter(chunks.into_iter().map(|c| Ok(Bytes::from(c))))
    }

    #[tokio::test]
    async fn writes_stream_under_the_ceiling() {
        let dest = temp_path("under_cap.bin");
        let written = write_stream_capped(byte_stream(vec![vec![1u8; 512], vec![2u8; 512]]), &dest, 4096)
            .await
            .unwrap();
        assert_eq!(written, 1024);
        assert_eq!(tokio::fs::metadata(&dest).await.unwrap().len(), 1024);
        let _ = tokio::fs::remove_file(&dest).await;
    }

    #[tokio::test]
    async fn aborts_and_deletes_partial_on_ceiling() {
        let dest = temp_path("over_cap.bin");
        let result = write_stream_capped(
            byte_stream(vec![vec![0u8; 512], vec![0u8; 512], vec![0u8; 512]]),
            &dest,
            1024,
        )
        .await;
        assert!(matches!(result, Err(FetchError::TooLarge)));
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn deletes_partial_on_stream_error() {
        let dest = temp_path("stream_err.bin");
        let stream = futures::stream::iter(vec![
            Ok(Bytes::from(vec![0u8; 128])),
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset")),
        ]);
        let result = write_stream_capped(stream, &dest, 4096).await;
        assert!(matches!(result, Err(FetchError::Io(_))));
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn rejects_implausibly_small_files() {
        let dest = temp_path("tiny.bin");
        tokio::fs::write(&dest, vec![0u8; 10]).await.unwrap();
        let result = validate_media_file(&dest).await;
        assert!(matches!(result, Err(FetchError::TooSmall(10))));
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn accepts_files_above_the_floor() {
        let dest = temp_path("plausible.bin");
        tokio::fs::write(&dest, vec![0u8; 2048]).await.unwrap();
        assert_eq!(validate_media_file(&dest).await.unwrap(), 2048);
        let _ = tokio::fs::remove_file(&dest).await;
    }
}
