//! Atomic output writes: bytes go to `<final>.part`, are synced, then renamed.
//!
//! A crash mid-write leaves at most a `.part` file behind, never a truncated
//! output under the final name.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use futures_util::StreamExt;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, warn};

use super::error::{FetchError, ProcessError};

/// Suffix of in-progress output files.
pub const PARTIAL_SUFFIX: &str = ".part";

/// Returns the temporary path used while `final_path` is being written.
#[must_use]
pub fn partial_path(final_path: &Path) -> PathBuf {
    let mut name = OsString::from(final_path.as_os_str());
    name.push(PARTIAL_SUFFIX);
    PathBuf::from(name)
}

/// Writes `bytes` to `final_path` atomically and returns the byte count.
///
/// # Errors
///
/// Returns [`ProcessError::Storage`] if any write, sync or rename fails.
pub async fn write_bytes_atomically(final_path: &Path, bytes: &[u8]) -> Result<u64, ProcessError> {
    let part = partial_path(final_path);
    let result = write_bytes(&part, bytes, final_path).await;
    if result.is_err() {
        cleanup_partial(&part).await;
    }
    result.map(|()| bytes.len() as u64)
}

/// Streams a response body to `final_path` atomically and returns the byte count.
///
/// # Errors
///
/// Returns [`ProcessError::Fetch`] if the body stream fails and
/// [`ProcessError::Storage`] if writing fails.
pub async fn write_stream_atomically(
    response: reqwest::Response,
    url: &str,
    final_path: &Path,
) -> Result<u64, ProcessError> {
    let part = partial_path(final_path);
    let result = write_stream(response, url, &part, final_path).await;
    if result.is_err() {
        cleanup_partial(&part).await;
    }
    result
}

async fn write_bytes(part: &Path, bytes: &[u8], final_path: &Path) -> Result<(), ProcessError> {
    let mut file = File::create(part)
        .await
        .map_err(|e| ProcessError::storage(part, e))?;
    file.write_all(bytes)
        .await
        .map_err(|e| ProcessError::storage(part, e))?;
    finish(file, part, final_path).await
}

async fn write_stream(
    response: reqwest::Response,
    url: &str,
    part: &Path,
    final_path: &Path,
) -> Result<u64, ProcessError> {
    let file = File::create(part)
        .await
        .map_err(|e| ProcessError::storage(part, e))?;
    let mut writer = BufWriter::new(file);
    let mut stream = response.bytes_stream();
    let mut bytes_written: u64 = 0;

    while let Some(chunk_result) = stream.next().await {
        let chunk = chunk_result.map_err(|e| FetchError::network(url, e))?;
        writer
            .write_all(&chunk)
            .await
            .map_err(|e| ProcessError::storage(part, e))?;
        bytes_written += chunk.len() as u64;
    }

    writer
        .flush()
        .await
        .map_err(|e| ProcessError::storage(part, e))?;
    finish(writer.into_inner(), part, final_path).await?;
    Ok(bytes_written)
}

async fn finish(mut file: File, part: &Path, final_path: &Path) -> Result<(), ProcessError> {
    file.flush()
        .await
        .map_err(|e| ProcessError::storage(part, e))?;
    file.sync_data()
        .await
        .map_err(|e| ProcessError::storage(part, e))?;
    drop(file);
    tokio::fs::rename(part, final_path)
        .await
        .map_err(|e| ProcessError::storage(final_path, e))?;
    debug!(path = %final_path.display(), "output written");
    Ok(())
}

async fn cleanup_partial(part: &Path) {
    match tokio::fs::remove_file(part).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %part.display(), error = %e, "failed to remove partial file"),
    }
}
