use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Engine error: {0}")]
    Engine(#[from] mtslink_engine::Error),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Failed to read config file {}: {source}", path.display())]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {}: {source}", path.display())]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Logging setup failed: {0}")]
    Logging(String),

    #[error("Download failed")]
    DownloadFailed,
}

pub type Result<T> = std::result::Result<T, AppError>;
