//! Fetch-and-assemble engine for MTS Link webinar recordings.
//!
//! A run resolves a recording manifest, downloads every segment it lists into
//! a per-recording directory and hands the local clips to ffmpeg, which
//! concatenates them into one output file. [`Orchestrator`] drives the whole
//! sequence; the stages are usable on their own.

pub mod clips;
pub mod compiler;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod manifest;
pub mod pipeline;
pub mod proxy;
mod utils;

pub use clips::{ClipProcessor, ProcessedClips};
pub use compiler::{AssemblyJob, Compiler, FfmpegCompiler};
pub use config::{DownloaderConfig, PipelineConfig, SegmentFailurePolicy};
pub use error::{CompileError, Error, ManifestError, ProcessError, Result, SegmentError};
pub use fetcher::SegmentFetcher;
pub use manifest::{Manifest, ManifestResolver, Segment, TrackKind, build_manifest_url};
pub use pipeline::{Orchestrator, PipelineState, RecordingRequest, RunSummary};
pub use proxy::{ProxyAuth, ProxyConfig, ProxyType};
pub use utils::sanitize_recording_name;
