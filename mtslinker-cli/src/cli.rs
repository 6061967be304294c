use clap::Parser;
use mtslink_engine::{ProxyType, SegmentFailurePolicy};
use std::path::PathBuf;

/// Download an MTS Link webinar recording and merge it into a single video
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Webinar recording URL (`.../record-new/<session>[/record-file/<recording>]`)
    /// or a bare event session ID
    #[arg(value_name = "URL_OR_ID")]
    pub input: String,

    /// Recording ID, when INPUT is a bare session ID
    #[arg(short = 'r', long)]
    pub record_id: Option<String>,

    /// Value of the `sessionId` cookie, required for private recordings
    #[arg(short = 's', long, env = "MTSLINK_SESSION_ID", hide_env_values = true)]
    pub session_id: Option<String>,

    /// Cut the output at this many seconds
    #[arg(short = 'm', long, value_name = "SECONDS")]
    pub max_duration: Option<f64>,

    /// Directory the recording folder is created in
    #[arg(short = 'o', long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Number of segments downloaded at the same time
    #[arg(short = 'j', long, value_name = "N")]
    pub concurrency: Option<usize>,

    /// What to do when a segment cannot be downloaded
    #[arg(long, value_enum, value_name = "POLICY")]
    pub on_segment_error: Option<SegmentFailurePolicy>,

    /// Stop at the first segment that fails (same as `--on-segment-error abort`)
    #[arg(long, conflicts_with = "on_segment_error")]
    pub fail_fast: bool,

    /// Path to the ffmpeg binary
    #[arg(long, value_name = "PATH")]
    pub ffmpeg: Option<String>,

    /// API base URL
    #[arg(long, value_name = "URL")]
    pub base_url: Option<String>,

    /// Overall request timeout in seconds (0 disables it)
    #[arg(long, value_name = "SECONDS")]
    pub timeout: Option<u64>,

    /// Connection timeout in seconds (0 disables it)
    #[arg(long, value_name = "SECONDS")]
    pub connect_timeout: Option<u64>,

    /// Proxy URL (e.g. `http://host:8080`, `socks5://host:1080`)
    #[arg(long, value_name = "URL")]
    pub proxy: Option<String>,

    /// Proxy type, inferred from the proxy URL when omitted
    #[arg(long, value_enum, requires = "proxy")]
    pub proxy_type: Option<ProxyType>,

    /// Proxy username
    #[arg(long, requires = "proxy")]
    pub proxy_username: Option<String>,

    /// Proxy password
    #[arg(long, requires = "proxy_username")]
    pub proxy_password: Option<String>,

    /// Configuration file (defaults to `<config dir>/mtslinker/config.toml`)
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Also write logs to this file
    #[arg(long, value_name = "FILE")]
    pub log_file: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only log errors
    #[arg(short, long)]
    pub quiet: bool,
}
