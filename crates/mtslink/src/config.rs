use std::path::PathBuf;
use std::time::Duration;

use reqwest::Client;
use reqwest::header::{HeaderMap, HeaderValue};

use crate::proxy::ProxyConfig;

pub const DEFAULT_BASE_URL: &str = "https://hse.mts-link.ru";

pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:109.0) Gecko/20100101 Firefox/115.0";

/// Size of the blocks segment bodies are written in.
pub const DEFAULT_CHUNK_SIZE: usize = 8 * 1024;

pub const DEFAULT_OUTPUT_EXTENSION: &str = "mp4";

pub const DEFAULT_FFMPEG_PATH: &str = "ffmpeg";

/// HTTP-level options shared by the manifest resolver and the segment fetcher.
#[derive(Debug, Clone)]
pub struct DownloaderConfig {
    /// Scheme and host of the MTS Link API
    pub base_url: String,

    /// User agent string
    pub user_agent: String,

    /// Overall timeout for each HTTP request. `None` disables it, so a stalled
    /// request may block indefinitely.
    pub timeout: Option<Duration>,

    /// Connection timeout. `None` disables it.
    pub connect_timeout: Option<Duration>,

    /// Whether to follow redirects
    pub follow_redirects: bool,

    /// Custom HTTP headers for requests
    pub headers: HeaderMap,

    /// Proxy configuration (optional)
    pub proxy: Option<ProxyConfig>,

    /// Write block size for segment bodies
    pub chunk_size: usize,
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_owned(),
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            timeout: None,
            connect_timeout: None,
            follow_redirects: true,
            headers: DownloaderConfig::get_default_headers(),
            proxy: None,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl DownloaderConfig {
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_connect_timeout(mut self, connect_timeout: Option<Duration>) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    pub fn with_proxy(mut self, proxy: Option<ProxyConfig>) -> Self {
        self.proxy = proxy;
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn get_default_headers() -> HeaderMap {
        let mut default_headers = HeaderMap::new();

        default_headers.insert(
            reqwest::header::ACCEPT,
            HeaderValue::from_static("application/json, text/plain, */*"),
        );

        default_headers.insert(
            reqwest::header::ACCEPT_LANGUAGE,
            HeaderValue::from_static("ru-RU,ru;q=0.8,en-US;q=0.5,en;q=0.3"),
        );
        default_headers
    }

    /// Build the HTTP client used for every request of a run.
    pub fn build_client(&self) -> Result<Client, String> {
        let mut builder = Client::builder()
            .user_agent(&self.user_agent)
            .default_headers(self.headers.clone())
            .redirect(if self.follow_redirects {
                reqwest::redirect::Policy::limited(10)
            } else {
                reqwest::redirect::Policy::none()
            });

        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(connect_timeout) = self.connect_timeout {
            builder = builder.connect_timeout(connect_timeout);
        }
        if let Some(proxy) = &self.proxy {
            builder = builder.proxy(proxy.build()?);
        }

        builder
            .build()
            .map_err(|e| format!("failed to build HTTP client: {e}"))
    }
}

/// What to do when a single segment cannot be downloaded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum SegmentFailurePolicy {
    /// Log the failure, omit the segment and keep going
    #[default]
    Skip,
    /// Abort the whole run on the first failed segment
    Abort,
}

/// Engine behavior for one run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Directory the `<recording name>/` folder is created in
    pub output_root: PathBuf,

    /// Container extension of the assembled file
    pub output_extension: String,

    /// Maximum number of segments downloaded at once. 1 keeps downloads sequential.
    pub concurrency: usize,

    pub failure_policy: SegmentFailurePolicy,

    /// Path or name of the ffmpeg binary
    pub ffmpeg_path: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            output_root: PathBuf::from("."),
            output_extension: DEFAULT_OUTPUT_EXTENSION.to_owned(),
            concurrency: 1,
            failure_policy: SegmentFailurePolicy::Skip,
            ffmpeg_path: DEFAULT_FFMPEG_PATH.to_owned(),
        }
    }
}

impl PipelineConfig {
    pub fn with_output_root(mut self, output_root: impl Into<PathBuf>) -> Self {
        self.output_root = output_root.into();
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_failure_policy(mut self, failure_policy: SegmentFailurePolicy) -> Self {
        self.failure_policy = failure_policy;
        self
    }

    pub fn with_ffmpeg_path(mut self, ffmpeg_path: impl Into<String>) -> Self {
        self.ffmpeg_path = ffmpeg_path.into();
        self
    }

    pub fn with_output_extension(mut self, extension: impl Into<String>) -> Self {
        self.output_extension = extension.into().trim_start_matches('.').to_owned();
        self
    }
}
