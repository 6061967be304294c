//! Compiler: merges ordered clips into one output file with ffmpeg.
//!
//! Each track is joined with the concat demuxer and stream-copied, so nothing
//! is re-encoded. A duration cap is applied with `-t` on the output, which cuts
//! the assembled file at the boundary no matter how many clips extend past it.
//! ffmpeg writes to a temporary sibling file that is renamed into place only on
//! success, so the output path holds either a complete file or nothing.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use indicatif::ProgressStyle;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};
use tracing_indicatif::span_ext::IndicatifSpanExt;

use crate::config::DEFAULT_FFMPEG_PATH;
use crate::error::CompileError;
use crate::utils::non_empty_file_len;

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Lines of ffmpeg stderr kept for the failure diagnostic.
const STDERR_TAIL_LINES: usize = 20;

/// Everything the compiler needs for one output file.
#[derive(Debug, Clone, PartialEq)]
pub struct AssemblyJob {
    pub video_clips: Vec<PathBuf>,
    pub audio_clips: Vec<PathBuf>,
    /// Sum of declared clip durations, in seconds
    pub total_duration: f64,
    pub output_path: PathBuf,
    /// Hard cap on the output duration, in seconds
    pub max_duration: Option<f64>,
}

impl AssemblyJob {
    /// Duration the output is expected to have.
    pub fn target_duration(&self) -> f64 {
        match self.max_duration {
            Some(max) => self.total_duration.min(max),
            None => self.total_duration,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.video_clips.is_empty() && self.audio_clips.is_empty()
    }

    /// Temporary file ffmpeg writes to, keeping the real extension so the
    /// container format is still inferred from it.
    pub fn partial_output_path(&self) -> PathBuf {
        sibling_with_suffix(&self.output_path, "partial", self.extension())
    }

    fn extension(&self) -> &str {
        self.output_path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("mp4")
    }
}

fn sibling_with_suffix(path: &Path, suffix: &str, extension: &str) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    path.with_file_name(format!("{stem}.{suffix}.{extension}"))
}

/// Builds the final output file from an [`AssemblyJob`].
#[async_trait]
pub trait Compiler: Send + Sync {
    async fn compile(
        &self,
        job: &AssemblyJob,
        token: &CancellationToken,
    ) -> Result<(), CompileError>;
}

/// [`Compiler`] backed by an external ffmpeg binary.
#[derive(Debug, Clone)]
pub struct FfmpegCompiler {
    binary_path: String,
}

impl Default for FfmpegCompiler {
    fn default() -> Self {
        Self::new(DEFAULT_FFMPEG_PATH)
    }
}

impl FfmpegCompiler {
    pub fn new(binary_path: impl Into<String>) -> Self {
        Self {
            binary_path: binary_path.into(),
        }
    }

    pub fn binary_path(&self) -> &str {
        &self.binary_path
    }

    /// Build ffmpeg command arguments.
    ///
    /// `video_list` / `audio_list` are concat lists for the respective tracks;
    /// at least one must be present.
    pub fn build_args(
        job: &AssemblyJob,
        video_list: Option<&Path>,
        audio_list: Option<&Path>,
        output: &Path,
    ) -> Vec<String> {
        let mut args: Vec<String> = ["-y", "-hide_banner", "-nostdin", "-loglevel", "error"]
            .into_iter()
            .map(String::from)
            .collect();

        for list in [video_list, audio_list].into_iter().flatten() {
            args.extend(["-f", "concat", "-safe", "0", "-i"].map(String::from));
            args.push(list.to_string_lossy().into_owned());
        }

        // With a separate audio track, audio carried inside the video clips is
        // kept as extra streams after the primary track.
        match (video_list, audio_list) {
            (Some(_), Some(_)) => {
                args.extend(["-map", "0:v", "-map", "1:a", "-map", "0:a?"].map(String::from))
            }
            (Some(_), None) => args.extend(["-map", "0"].map(String::from)),
            (None, _) => args.extend(["-map", "0:a"].map(String::from)),
        }

        // Copy streams without re-encoding
        args.extend(["-c", "copy"].map(String::from));

        if let Some(max) = job.max_duration {
            args.push("-t".to_string());
            args.push(format!("{:.3}", max.max(0.0)));
        }

        if matches!(job.extension(), "mp4" | "mov" | "m4a" | "m4v") {
            args.extend(["-movflags", "+faststart"].map(String::from));
        }

        args.extend(["-progress", "pipe:1", "-nostats"].map(String::from));
        args.push(output.to_string_lossy().into_owned());
        args
    }

    /// Contents of a concat demuxer list. Single quotes in paths are escaped
    /// the way the demuxer expects (`'\''`).
    pub fn concat_list(clips: &[PathBuf]) -> String {
        let mut list = String::from("ffconcat version 1.0\n");
        for clip in clips {
            let path = clip.to_string_lossy().replace('\'', r"'\''");
            list.push_str(&format!("file '{path}'\n"));
        }
        list
    }

    /// Parse time string (HH:MM:SS.micro) to seconds.
    fn parse_time(time_str: &str) -> Option<f64> {
        let parts: Vec<&str> = time_str.trim().split(':').collect();
        if parts.len() != 3 {
            return None;
        }

        let hours: f64 = parts[0].parse().ok()?;
        let minutes: f64 = parts[1].parse().ok()?;
        let seconds: f64 = parts[2].parse().ok()?;

        Some(hours * 3600.0 + minutes * 60.0 + seconds)
    }

    /// Seconds written so far, from one `-progress` line.
    fn parse_progress(line: &str) -> Option<f64> {
        let value = line.strip_prefix("out_time=")?;
        Self::parse_time(value).filter(|secs| *secs >= 0.0)
    }

    /// Absolute paths of every clip, failing on missing or empty files.
    async fn resolve_inputs(clips: &[PathBuf]) -> Result<Vec<PathBuf>, CompileError> {
        let mut resolved = Vec::with_capacity(clips.len());
        for clip in clips {
            if non_empty_file_len(clip).await.is_none() {
                return Err(CompileError::MissingInput { path: clip.clone() });
            }
            let absolute = tokio::fs::canonicalize(clip)
                .await
                .map_err(|_| CompileError::MissingInput { path: clip.clone() })?;
            resolved.push(absolute);
        }
        Ok(resolved)
    }

    async fn write_list(
        job: &AssemblyJob,
        track: &str,
        clips: &[PathBuf],
    ) -> Result<Option<PathBuf>, CompileError> {
        if clips.is_empty() {
            return Ok(None);
        }
        let path = sibling_with_suffix(&job.output_path, track, "concat.txt");
        tokio::fs::write(&path, Self::concat_list(clips))
            .await
            .map_err(|e| CompileError::io("writing concat list", &path, e))?;
        Ok(Some(path))
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.binary_path);
        cmd.kill_on_drop(true);
        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            cmd.as_std_mut().creation_flags(CREATE_NO_WINDOW);
        }
        cmd
    }

    async fn run(
        &self,
        args: &[String],
        target_secs: f64,
        token: &CancellationToken,
    ) -> Result<(), CompileError> {
        debug!(program = %self.binary_path, ?args, "Spawning ffmpeg");

        let mut child = self
            .command()
            .args(args)
            .env("LC_ALL", "C") // Force consistent output
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| CompileError::Spawn {
                program: self.binary_path.clone(),
                source,
            })?;

        let stderr_task = child.stderr.take().map(|stderr| tokio::spawn(tail_lines(stderr)));
        let span = tracing::Span::current();
        span.pb_set_length(target_secs.ceil().max(0.0) as u64);

        if let Some(stdout) = child.stdout.take() {
            let mut lines = BufReader::new(stdout).lines();
            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => {
                        let _ = child.kill().await;
                        return Err(CompileError::Cancelled);
                    }
                    line = lines.next_line() => match line {
                        Ok(Some(line)) => {
                            if let Some(secs) = Self::parse_progress(&line) {
                                span.pb_set_position(secs as u64);
                            }
                        }
                        Ok(None) => break,
                        Err(e) => {
                            warn!(error = %e, "Error reading ffmpeg progress");
                            break;
                        }
                    }
                }
            }
        }

        let status = tokio::select! {
            biased;
            _ = token.cancelled() => {
                let _ = child.kill().await;
                return Err(CompileError::Cancelled);
            }
            status = child.wait() => status.map_err(|source| CompileError::Spawn {
                program: self.binary_path.clone(),
                source,
            })?,
        };

        let stderr = match stderr_task {
            Some(task) => task.await.unwrap_or_default(),
            None => String::new(),
        };

        if status.success() {
            if !stderr.is_empty() {
                debug!(stderr = %stderr, "ffmpeg finished with diagnostics");
            }
            Ok(())
        } else {
            Err(CompileError::Tool {
                program: self.binary_path.clone(),
                status: status.to_string(),
                stderr,
            })
        }
    }
}

/// Keep the last few lines of a child's stderr.
async fn tail_lines<R: AsyncRead + Unpin>(reader: R) -> String {
    let mut lines = BufReader::new(reader).lines();
    let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
    while let Ok(Some(line)) = lines.next_line().await {
        if tail.len() == STDERR_TAIL_LINES {
            tail.pop_front();
        }
        tail.push_back(line);
    }
    tail.into_iter().collect::<Vec<_>>().join("\n")
}

async fn remove_if_exists(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await
        && e.kind() != std::io::ErrorKind::NotFound
    {
        warn!(path = %path.display(), error = %e, "Failed to remove temporary file");
    }
}

#[async_trait]
impl Compiler for FfmpegCompiler {
    async fn compile(
        &self,
        job: &AssemblyJob,
        token: &CancellationToken,
    ) -> Result<(), CompileError> {
        if job.is_empty() {
            return Err(CompileError::NoInputs);
        }

        let video = Self::resolve_inputs(&job.video_clips).await?;
        let audio = Self::resolve_inputs(&job.audio_clips).await?;

        let video_list = Self::write_list(job, "video", &video).await?;
        let audio_list = match Self::write_list(job, "audio", &audio).await {
            Ok(list) => list,
            Err(e) => {
                if let Some(list) = &video_list {
                    remove_if_exists(list).await;
                }
                return Err(e);
            }
        };

        let partial = job.partial_output_path();
        let args = Self::build_args(job, video_list.as_deref(), audio_list.as_deref(), &partial);

        info!(
            video = video.len(),
            audio = audio.len(),
            target_duration = job.target_duration(),
            output = %job.output_path.display(),
            "Compiling final video"
        );

        let span = info_span!("compile");
        if let Ok(style) = ProgressStyle::with_template(
            "{spinner:.cyan} [{bar:30.cyan/white}] {pos}/{len}s {msg}",
        ) {
            span.pb_set_style(&style.progress_chars("=> "));
        }
        span.pb_set_message("merging");

        let result = self
            .run(&args, job.target_duration(), token)
            .instrument(span)
            .await;

        for list in [&video_list, &audio_list].into_iter().flatten() {
            remove_if_exists(list).await;
        }

        if let Err(e) = result {
            remove_if_exists(&partial).await;
            return Err(e);
        }

        if non_empty_file_len(&partial).await.is_none() {
            remove_if_exists(&partial).await;
            return Err(CompileError::Tool {
                program: self.binary_path.clone(),
                status: "success".to_string(),
                stderr: "no output was written".to_string(),
            });
        }

        tokio::fs::rename(&partial, &job.output_path)
            .await
            .map_err(|e| CompileError::io("renaming output to", &job.output_path, e))?;

        Ok(())
    }
}
