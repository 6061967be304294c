//! Orchestrator: resolve manifest, process clips, compile output.
//!
//! A run is strictly linear and never retried. Downloaded segments survive a
//! failed run, so re-running the same request only fetches what is missing.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::clips::ClipProcessor;
use crate::compiler::{AssemblyJob, Compiler, FfmpegCompiler};
use crate::config::{DownloaderConfig, PipelineConfig};
use crate::error::{Error, Result};
use crate::fetcher::SegmentFetcher;
use crate::manifest::{ManifestResolver, build_manifest_url};
use crate::utils::{ensure_dir, sanitize_recording_name};

/// Where a run currently is. `Done` and `Failed` are terminal.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PipelineState {
    #[default]
    Idle,
    ResolvingManifest,
    ProcessingClips,
    Compiling,
    Done,
    Failed(String),
}

impl PipelineState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed(_))
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::ResolvingManifest => f.write_str("resolving manifest"),
            Self::ProcessingClips => f.write_str("processing clips"),
            Self::Compiling => f.write_str("compiling"),
            Self::Done => f.write_str("done"),
            Self::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

/// Which recording to fetch, and how.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordingRequest {
    /// Event session id; required
    pub session_id: String,
    /// Recording id; empty selects the whole session
    pub recording_id: String,
    /// Value of the `sessionId` cookie for gated recordings
    pub session_credential: Option<String>,
    /// Cap on the output duration, in seconds
    pub max_duration: Option<f64>,
}

impl RecordingRequest {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            ..Self::default()
        }
    }

    pub fn with_recording_id(mut self, recording_id: impl Into<String>) -> Self {
        self.recording_id = recording_id.into();
        self
    }

    pub fn with_session_credential(mut self, credential: Option<String>) -> Self {
        self.session_credential = credential;
        self
    }

    pub fn with_max_duration(mut self, max_duration: Option<f64>) -> Self {
        self.max_duration = max_duration;
        self
    }
}

/// Result of a successful run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub recording_name: String,
    pub output_path: PathBuf,
    pub video_clips: usize,
    pub audio_clips: usize,
    pub skipped: usize,
    /// Sum of declared clip durations, in seconds
    pub total_duration: f64,
    /// Expected output duration after the cap, in seconds
    pub output_duration: f64,
}

/// Sequences one download run end to end.
pub struct Orchestrator {
    base_url: String,
    config: PipelineConfig,
    resolver: ManifestResolver,
    clip_processor: ClipProcessor,
    compiler: Arc<dyn Compiler>,
    state: Mutex<PipelineState>,
}

impl fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("base_url", &self.base_url)
            .field("config", &self.config)
            .field("state", &*self.state.lock())
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    pub fn new(downloader_config: DownloaderConfig, config: PipelineConfig) -> Result<Self> {
        let client = downloader_config.build_client().map_err(Error::Client)?;
        let fetcher = Arc::new(SegmentFetcher::with_chunk_size(
            client.clone(),
            downloader_config.chunk_size,
        ));
        let clip_processor = ClipProcessor::new(fetcher)
            .with_concurrency(config.concurrency)
            .with_failure_policy(config.failure_policy);
        let compiler: Arc<dyn Compiler> = Arc::new(FfmpegCompiler::new(config.ffmpeg_path.clone()));

        Ok(Self {
            base_url: downloader_config.base_url,
            config,
            resolver: ManifestResolver::new(client),
            clip_processor,
            compiler,
            state: Mutex::new(PipelineState::Idle),
        })
    }

    /// Replace the ffmpeg compiler with another implementation.
    pub fn with_compiler(mut self, compiler: Arc<dyn Compiler>) -> Self {
        self.compiler = compiler;
        self
    }

    pub fn state(&self) -> PipelineState {
        self.state.lock().clone()
    }

    fn transition(&self, next: PipelineState) {
        let mut state = self.state.lock();
        debug!(from = %*state, to = %next, "Pipeline state transition");
        *state = next;
    }

    /// Run the pipeline and report the outcome as a boolean. Diagnostics go to
    /// the log; no error crosses this boundary.
    pub async fn run_download(&self, request: &RecordingRequest, token: &CancellationToken) -> bool {
        match self.execute(request, token).await {
            Ok(summary) => {
                info!(
                    output = %summary.output_path.display(),
                    "Final video saved to {}",
                    summary.output_path.display()
                );
                true
            }
            Err(Error::Manifest(e)) if e.is_access_denied() => {
                error!(error = %e, "Access denied: this recording requires a session credential");
                false
            }
            Err(Error::Manifest(e)) if e.is_transport() => {
                error!("Failed to fetch webinar data. Check the session ID or URL: {e}");
                false
            }
            Err(e) if e.is_cancelled() => {
                error!("Download cancelled");
                false
            }
            Err(e) => {
                error!("Failed to process webinar: {e}");
                false
            }
        }
    }

    /// Run the pipeline, returning the failure that stopped it.
    pub async fn execute(
        &self,
        request: &RecordingRequest,
        token: &CancellationToken,
    ) -> Result<RunSummary> {
        self.transition(PipelineState::ResolvingManifest);
        let result = self.execute_stages(request, token).await;
        match &result {
            Ok(_) => self.transition(PipelineState::Done),
            Err(e) => self.transition(PipelineState::Failed(e.to_string())),
        }
        result
    }

    async fn execute_stages(
        &self,
        request: &RecordingRequest,
        token: &CancellationToken,
    ) -> Result<RunSummary> {
        if let Some(max) = request.max_duration
            && !(max.is_finite() && max > 0.0)
        {
            return Err(Error::InvalidInput(format!(
                "max duration must be a positive number of seconds, got {max}"
            )));
        }

        let url = build_manifest_url(&self.base_url, &request.session_id, &request.recording_id)?;
        info!(url = %url, "Fetching webinar manifest");

        let manifest = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(Error::Cancelled),
            manifest = self.resolver.fetch(&url, request.session_credential.as_deref()) => manifest?,
        };

        self.transition(PipelineState::ProcessingClips);
        let name = sanitize_recording_name(&manifest.name);
        let directory = self.config.output_root.join(&name);
        ensure_dir(&directory)
            .await
            .map_err(|e| Error::io("creating directory", &directory, e))?;
        let output_path = directory.join(format!("{name}.{}", self.config.output_extension));

        let clips = self
            .clip_processor
            .process_segments(&directory, &manifest, token)
            .await?;

        if clips.is_empty() {
            return Err(Error::NothingToMerge);
        }

        info!(
            "Downloaded and processed {} files ({} sec) for merging.",
            clips.clip_count(),
            clips.total_duration
        );

        self.transition(PipelineState::Compiling);
        let job = AssemblyJob {
            video_clips: clips.video_clips,
            audio_clips: clips.audio_clips,
            total_duration: clips.total_duration,
            output_path,
            max_duration: request.max_duration,
        };
        self.compiler.compile(&job, token).await?;

        Ok(RunSummary {
            recording_name: name,
            output_duration: job.target_duration(),
            video_clips: job.video_clips.len(),
            audio_clips: job.audio_clips.len(),
            skipped: clips.skipped,
            total_duration: job.total_duration,
            output_path: job.output_path,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states() {
        assert!(PipelineState::Done.is_terminal());
        assert!(PipelineState::Failed("x".into()).is_terminal());
        assert!(!PipelineState::Compiling.is_terminal());
        assert!(!PipelineState::Idle.is_terminal());
    }

    #[test]
    fn failed_state_displays_reason() {
        let state = PipelineState::Failed("no video or audio clips found to merge".into());
        assert_eq!(
            state.to_string(),
            "failed: no video or audio clips found to merge"
        );
    }

    #[test]
    fn request_builder() {
        let request = RecordingRequest::new("123")
            .with_recording_id("456")
            .with_session_credential(Some("secret".into()))
            .with_max_duration(Some(60.0));
        assert_eq!(request.session_id, "123");
        assert_eq!(request.recording_id, "456");
        assert_eq!(request.session_credential.as_deref(), Some("secret"));
        assert_eq!(request.max_duration, Some(60.0));
    }

    #[tokio::test]
    async fn empty_session_fails_without_network() {
        let orchestrator =
            Orchestrator::new(DownloaderConfig::default(), PipelineConfig::default()).unwrap();
        let err = orchestrator
            .execute(&RecordingRequest::new(""), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Manifest(crate::ManifestError::InvalidInput { .. })
        ));
        assert!(matches!(orchestrator.state(), PipelineState::Failed(_)));
    }

    #[tokio::test]
    async fn non_positive_cap_is_rejected() {
        let orchestrator =
            Orchestrator::new(DownloaderConfig::default(), PipelineConfig::default()).unwrap();
        for cap in [0.0, -5.0, f64::NAN] {
            let request = RecordingRequest::new("1").with_max_duration(Some(cap));
            let ok = orchestrator
                .run_download(&request, &CancellationToken::new())
                .await;
            assert!(!ok);
            assert!(matches!(orchestrator.state(), PipelineState::Failed(_)));
        }
    }
}
