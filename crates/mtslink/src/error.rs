use std::path::PathBuf;

use reqwest::StatusCode;

/// Application error code the MTS Link API uses for "session credential required".
pub const ACCESS_DENIED_CODE: i64 = 403;

/// Errors raised while resolving a recording manifest.
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("invalid input: {reason}")]
    InvalidInput { reason: String },

    #[error("access denied: a session credential is required for {url}")]
    AccessDenied { url: String },

    #[error("manifest request failed with HTTP {status} for {url}")]
    HttpStatus { status: StatusCode, url: String },

    #[error("manifest request failed: {source}")]
    Network {
        #[from]
        source: reqwest::Error,
    },

    #[error("failed to parse manifest from {url}: {source}")]
    Parse {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid manifest: {reason}")]
    Invalid { reason: String },
}

impl ManifestError {
    pub fn invalid_input(reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            reason: reason.into(),
        }
    }

    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::Invalid {
            reason: reason.into(),
        }
    }

    /// Whether the caller can fix this by supplying a session credential.
    pub fn is_access_denied(&self) -> bool {
        matches!(self, Self::AccessDenied { .. })
    }

    /// Transport-class failures: network, HTTP status and body parsing.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::HttpStatus { .. } | Self::Network { .. } | Self::Parse { .. }
        )
    }
}

/// Errors raised while downloading a single segment.
#[derive(Debug, thiserror::Error)]
pub enum SegmentError {
    #[error("invalid segment URL `{url}`: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("segment request failed for {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("segment request failed with HTTP {status} for {url}")]
    HttpStatus { status: StatusCode, url: String },

    #[error("I/O error while {op} {}: {source}", path.display())]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("downloaded file is empty: {}", path.display())]
    EmptyFile { path: PathBuf },

    #[error("download cancelled: {}", path.display())]
    Cancelled { path: PathBuf },
}

impl SegmentError {
    pub fn invalid_url(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidUrl {
            url: url.into(),
            reason: reason.into(),
        }
    }

    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    pub fn io(op: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            op,
            path: path.into(),
            source,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

/// Errors raised while walking a manifest's segment list.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("manifest has no segment collection (`eventLogs` is missing)")]
    MissingSegments,

    #[error("segment #{index} failed: {source}")]
    Segment {
        index: usize,
        #[source]
        source: SegmentError,
    },

    #[error("clip processing cancelled")]
    Cancelled,
}

/// Errors raised while assembling the output file.
#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    #[error("no clips to compile")]
    NoInputs,

    #[error("input clip is missing or empty: {}", path.display())]
    MissingInput { path: PathBuf },

    #[error("I/O error while {op} {}: {source}", path.display())]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to spawn `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{program}` exited with {status}: {stderr}")]
    Tool {
        program: String,
        status: String,
        stderr: String,
    },

    #[error("compilation cancelled")]
    Cancelled,
}

impl CompileError {
    pub fn io(op: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            op,
            path: path.into(),
            source,
        }
    }
}

/// Crate-level result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Any failure that aborts a run.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("no video or audio clips found to merge")]
    NothingToMerge,

    #[error("run cancelled")]
    Cancelled,

    #[error("I/O error while {op} {}: {source}", path.display())]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to build HTTP client: {0}")]
    Client(String),
}

impl Error {
    pub fn io(op: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            op,
            path: path.into(),
            source,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            Self::Cancelled
                | Self::Process(ProcessError::Cancelled)
                | Self::Compile(CompileError::Cancelled)
        )
    }
}
