// Segment Fetcher: downloads one segment to disk, skipping files that are
// already present and non-empty.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::StreamExt;
use indicatif::ProgressStyle;
use parking_lot::Mutex;
use reqwest::Client;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::OwnedMutexGuard;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span, debug, info, info_span, warn};
use tracing_indicatif::span_ext::IndicatifSpanExt;
use url::Url;

use crate::config::DEFAULT_CHUNK_SIZE;
use crate::error::SegmentError;
use crate::utils::non_empty_file_len;

const PROGRESS_TEMPLATE: &str =
    "{span_child_prefix}{spinner:.yellow} [{bar:20.yellow/white}] {bytes}/{total_bytes} {msg}";

/// Local file name for a segment: the last path component of its URL, without
/// query string or fragment.
pub fn segment_file_name(url: &str) -> Result<String, SegmentError> {
    let parsed = Url::parse(url).map_err(|e| SegmentError::invalid_url(url, e.to_string()))?;
    let name = parsed
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .unwrap_or_default();

    if name.is_empty() || name == "." || name == ".." {
        return Err(SegmentError::invalid_url(url, "URL has no file name"));
    }
    Ok(name.to_string())
}

/// Per-destination locks so two concurrent fetches never write the same file.
/// An entry lives only while some fetch holds or waits for it.
#[derive(Debug, Default)]
struct PathLocks {
    inner: Mutex<HashMap<PathBuf, Arc<tokio::sync::Mutex<()>>>>,
}

impl PathLocks {
    async fn lock(&self, path: &Path) -> PathGuard<'_> {
        let lock = {
            let mut locks = self.inner.lock();
            locks.entry(path.to_path_buf()).or_default().clone()
        };
        PathGuard {
            locks: self,
            path: path.to_path_buf(),
            guard: Some(lock.lock_owned().await),
        }
    }
}

struct PathGuard<'a> {
    locks: &'a PathLocks,
    path: PathBuf,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for PathGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut locks = self.locks.inner.lock();
        // Only the map's own reference left: no holder, no waiter.
        if locks
            .get(&self.path)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&self.path);
        }
    }
}

/// Streams segments to disk.
#[derive(Debug)]
pub struct SegmentFetcher {
    http_client: Client,
    chunk_size: usize,
    locks: PathLocks,
}

impl SegmentFetcher {
    pub fn new(http_client: Client) -> Self {
        Self::with_chunk_size(http_client, DEFAULT_CHUNK_SIZE)
    }

    pub fn with_chunk_size(http_client: Client, chunk_size: usize) -> Self {
        Self {
            http_client,
            chunk_size: chunk_size.max(1),
            locks: PathLocks::default(),
        }
    }

    /// Download `url` into `destination_dir`.
    ///
    /// Returns the local path of a non-empty file. When such a file already
    /// exists no request is made. Every failure is reported as a
    /// [`SegmentError`]; nothing panics past this boundary.
    pub async fn fetch_segment(
        &self,
        url: &str,
        destination_dir: &Path,
        token: &CancellationToken,
    ) -> Result<PathBuf, SegmentError> {
        let file_name = segment_file_name(url)?;
        let path = destination_dir.join(&file_name);

        let _guard = self.locks.lock(&path).await;

        if let Some(size) = non_empty_file_len(&path).await {
            info!(file = %file_name, size, "File already exists, skipping download");
            return Ok(path);
        }

        let span = info_span!("segment", file = %file_name);
        if let Ok(style) = ProgressStyle::with_template(PROGRESS_TEMPLATE) {
            span.pb_set_style(&style.progress_chars("=> "));
        }
        span.pb_set_message(&format!("Downloading {file_name}"));

        let result = self
            .stream_to_file(url, &path, token, &span)
            .instrument(span.clone())
            .await;

        match &result {
            Ok(bytes) => {
                span.pb_set_finish_message(&format!("{file_name} done"));
                debug!(file = %file_name, bytes, "Segment stream finished");
            }
            Err(e) => span.pb_set_finish_message(&format!("{file_name} failed: {e}")),
        }
        result?;

        // The HTTP call may succeed and still leave nothing on disk.
        match non_empty_file_len(&path).await {
            Some(_) => Ok(path),
            None => Err(SegmentError::EmptyFile { path }),
        }
    }

    async fn stream_to_file(
        &self,
        url: &str,
        path: &Path,
        token: &CancellationToken,
        span: &Span,
    ) -> Result<u64, SegmentError> {
        // Nothing is on disk yet, so a cancel here leaves no partial file.
        let response = tokio::select! {
            biased;
            _ = token.cancelled() => {
                return Err(SegmentError::Cancelled { path: path.to_path_buf() });
            }
            response = self.http_client.get(url).send() => {
                response.map_err(|e| SegmentError::network(url, e))?
            }
        };

        let status = response.status();
        if !status.is_success() {
            return Err(SegmentError::HttpStatus {
                status,
                url: url.to_string(),
            });
        }

        // Unknown length leaves the bar indeterminate.
        span.pb_set_length(response.content_length().unwrap_or(0));

        let file = File::create(path)
            .await
            .map_err(|e| SegmentError::io("creating", path, e))?;
        let mut writer = BufWriter::with_capacity(self.chunk_size, file);
        let mut stream = response.bytes_stream();
        let mut downloaded: u64 = 0;

        loop {
            let next = tokio::select! {
                biased;
                _ = token.cancelled() => {
                    let _ = writer.flush().await;
                    warn_partial(path, downloaded);
                    return Err(SegmentError::Cancelled { path: path.to_path_buf() });
                }
                next = stream.next() => next,
            };

            let Some(chunk) = next else {
                break;
            };
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    let _ = writer.flush().await;
                    warn_partial(path, downloaded);
                    return Err(SegmentError::network(url, e));
                }
            };

            for block in chunk.chunks(self.chunk_size) {
                writer
                    .write_all(block)
                    .await
                    .map_err(|e| SegmentError::io("writing", path, e))?;
                downloaded += block.len() as u64;
                span.pb_set_position(downloaded);
            }
        }

        writer
            .flush()
            .await
            .map_err(|e| SegmentError::io("flushing", path, e))?;

        Ok(downloaded)
    }
}

/// A non-empty partial file passes the existence check on the next run and is
/// then treated as complete.
fn warn_partial(path: &Path, downloaded: u64) {
    if downloaded > 0 {
        warn!(
            path = %path.display(),
            bytes = downloaded,
            "Partial segment left on disk; delete it to force a fresh download"
        );
    }
}
