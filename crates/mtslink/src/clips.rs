//! Clip Processor: walks a manifest's segments, downloads each one and sorts
//! the local files into ordered video and audio lists.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::StreamExt;
use indicatif::ProgressStyle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, info, info_span, warn};
use tracing_indicatif::span_ext::IndicatifSpanExt;

use crate::config::SegmentFailurePolicy;
use crate::error::ProcessError;
use crate::fetcher::SegmentFetcher;
use crate::manifest::{Manifest, TrackKind};

/// Downloaded clips, each list in manifest order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessedClips {
    /// Sum of the declared durations of the downloaded segments, in seconds
    pub total_duration: f64,
    pub video_clips: Vec<PathBuf>,
    pub audio_clips: Vec<PathBuf>,
    /// Segments that failed and were left out
    pub skipped: usize,
}

impl ProcessedClips {
    /// Nothing to merge. Not an error by itself; the orchestrator decides.
    pub fn is_empty(&self) -> bool {
        self.video_clips.is_empty() && self.audio_clips.is_empty()
    }

    pub fn clip_count(&self) -> usize {
        self.video_clips.len() + self.audio_clips.len()
    }

    fn push(&mut self, kind: TrackKind, path: PathBuf, duration: f64) {
        match kind {
            TrackKind::Video => self.video_clips.push(path),
            TrackKind::Audio => self.audio_clips.push(path),
        }
        self.total_duration += duration;
    }
}

/// Downloads every segment of a manifest through a shared [`SegmentFetcher`].
#[derive(Debug, Clone)]
pub struct ClipProcessor {
    fetcher: Arc<SegmentFetcher>,
    concurrency: usize,
    failure_policy: SegmentFailurePolicy,
}

impl ClipProcessor {
    pub fn new(fetcher: Arc<SegmentFetcher>) -> Self {
        Self {
            fetcher,
            concurrency: 1,
            failure_policy: SegmentFailurePolicy::Skip,
        }
    }

    /// Allow up to `concurrency` downloads in flight. Results are still
    /// collected in manifest order.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_failure_policy(mut self, failure_policy: SegmentFailurePolicy) -> Self {
        self.failure_policy = failure_policy;
        self
    }

    /// Download all segments of `manifest` into `directory`.
    ///
    /// Fails with [`ProcessError::MissingSegments`] only when the manifest has
    /// no segment collection; a collection that yields no clips returns empty
    /// lists.
    pub async fn process_segments(
        &self,
        directory: &Path,
        manifest: &Manifest,
        token: &CancellationToken,
    ) -> Result<ProcessedClips, ProcessError> {
        let segments = manifest
            .segments
            .as_ref()
            .ok_or(ProcessError::MissingSegments)?;

        let span = info_span!("clips", recording = %manifest.name);
        if let Ok(style) =
            ProgressStyle::with_template("{spinner:.green} [{bar:30.green/white}] {pos}/{len} {msg}")
        {
            span.pb_set_style(&style.progress_chars("=> "));
        }
        span.pb_set_length(segments.len() as u64);
        span.pb_set_message("segments");

        let policy = self.failure_policy;
        let process = async {
            let mut results = futures::stream::iter(segments.iter())
                .map(|segment| async move {
                    let result = self
                        .fetcher
                        .fetch_segment(&segment.url, directory, token)
                        .await;
                    (segment, result)
                })
                // `buffered` yields in input order whatever order downloads finish in.
                .buffered(self.concurrency);

            let mut clips = ProcessedClips::default();
            loop {
                let next = tokio::select! {
                    biased;
                    _ = token.cancelled() => return Err(ProcessError::Cancelled),
                    next = results.next() => next,
                };
                let Some((segment, result)) = next else {
                    break;
                };
                span.pb_inc(1);
                match result {
                    Ok(path) => clips.push(segment.kind, path, segment.duration),
                    Err(e) if e.is_cancelled() || token.is_cancelled() => {
                        return Err(ProcessError::Cancelled);
                    }
                    Err(e) => match policy {
                        SegmentFailurePolicy::Skip => {
                            warn!(
                                index = segment.index,
                                url = %segment.url,
                                error = %e,
                                "Segment download failed, skipping"
                            );
                            clips.skipped += 1;
                        }
                        SegmentFailurePolicy::Abort => {
                            return Err(ProcessError::Segment {
                                index: segment.index,
                                source: e,
                            });
                        }
                    },
                }
            }

            if token.is_cancelled() {
                return Err(ProcessError::Cancelled);
            }
            Ok(clips)
        };

        let clips = process.instrument(span.clone()).await?;

        info!(
            video = clips.video_clips.len(),
            audio = clips.audio_clips.len(),
            skipped = clips.skipped,
            total_duration = clips.total_duration,
            "Segments processed"
        );
        Ok(clips)
    }
}
