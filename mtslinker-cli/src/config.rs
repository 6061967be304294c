use std::path::{Path, PathBuf};
use std::time::Duration;

use mtslink_engine::{DownloaderConfig, PipelineConfig, ProxyConfig, SegmentFailurePolicy};
use serde::Deserialize;
use tracing::debug;

use crate::cli::Args;
use crate::error::{AppError, Result};

/// Optional settings read from `config.toml`. Command-line flags win.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub base_url: Option<String>,
    pub user_agent: Option<String>,
    pub session_id: Option<String>,
    pub output_dir: Option<PathBuf>,
    pub concurrency: Option<usize>,
    pub fail_fast: Option<bool>,
    pub ffmpeg: Option<String>,
    /// Seconds
    pub timeout: Option<u64>,
    /// Seconds
    pub connect_timeout: Option<u64>,
    pub proxy: Option<String>,
}

/// Default location: `<config dir>/mtslinker/config.toml`.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("mtslinker").join("config.toml"))
}

impl AppConfig {
    /// Load the file at `path`, or the default location when `path` is `None`.
    ///
    /// A missing file at the default location yields defaults; a missing file
    /// the user named explicitly is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, explicit) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => match default_config_path() {
                Some(path) => (path, false),
                None => return Ok(Self::default()),
            },
        };

        if !explicit && !path.exists() {
            debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(&path).map_err(|source| AppError::ConfigRead {
            path: path.clone(),
            source,
        })?;
        let config = Self::parse(&contents).map_err(|source| AppError::ConfigParse {
            path: path.clone(),
            source,
        })?;
        debug!(path = %path.display(), "Loaded config file");
        Ok(config)
    }

    pub fn parse(contents: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    /// Merge with command-line flags into the engine's HTTP settings.
    pub fn downloader_config(&self, args: &Args) -> DownloaderConfig {
        let mut config = DownloaderConfig::default();
        if let Some(base_url) = args.base_url.as_ref().or(self.base_url.as_ref()) {
            config = config.with_base_url(base_url.trim_end_matches('/'));
        }
        if let Some(user_agent) = &self.user_agent {
            config = config.with_user_agent(user_agent);
        }

        let seconds = |value: Option<u64>| value.filter(|s| *s > 0).map(Duration::from_secs);
        config = config
            .with_timeout(seconds(args.timeout.or(self.timeout)))
            .with_connect_timeout(seconds(args.connect_timeout.or(self.connect_timeout)));

        let proxy = args
            .proxy
            .as_ref()
            .or(self.proxy.as_ref())
            .map(|url| {
                let mut proxy = ProxyConfig::from_url(url);
                if let Some(proxy_type) = args.proxy_type {
                    proxy.proxy_type = proxy_type;
                }
                if let Some(username) = &args.proxy_username {
                    proxy = proxy.with_auth(username, args.proxy_password.clone().unwrap_or_default());
                }
                proxy
            });
        config.with_proxy(proxy)
    }

    /// Merge with command-line flags into the engine's pipeline settings.
    pub fn pipeline_config(&self, args: &Args) -> PipelineConfig {
        let mut config = PipelineConfig::default();
        if let Some(output_dir) = args.output_dir.as_ref().or(self.output_dir.as_ref()) {
            config = config.with_output_root(output_dir);
        }
        if let Some(concurrency) = args.concurrency.or(self.concurrency) {
            config = config.with_concurrency(concurrency);
        }
        if let Some(ffmpeg) = args.ffmpeg.as_ref().or(self.ffmpeg.as_ref()) {
            config = config.with_ffmpeg_path(ffmpeg);
        }

        let policy = if args.fail_fast {
            SegmentFailurePolicy::Abort
        } else if let Some(policy) = args.on_segment_error {
            policy
        } else if self.fail_fast == Some(true) {
            SegmentFailurePolicy::Abort
        } else {
            SegmentFailurePolicy::Skip
        };
        config.with_failure_policy(policy)
    }

    /// Session credential: flag or environment first, then the file.
    pub fn session_credential(&self, args: &Args) -> Option<String> {
        args.session_id
            .as_ref()
            .or(self.session_id.as_ref())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use mtslink_engine::ProxyType;

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec!["mtslinker", "111"];
        argv.extend_from_slice(extra);
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn parses_all_keys() {
        let config = AppConfig::parse(
            r#"
            base_url = "https://events.example.com"
            session_id = "cookie"
            output_dir = "/data/webinars"
            concurrency = 3
            fail_fast = true
            ffmpeg = "/opt/ffmpeg/bin/ffmpeg"
            timeout = 60
            connect_timeout = 10
            proxy = "socks5://127.0.0.1:1080"
            "#,
        )
        .unwrap();
        assert_eq!(config.concurrency, Some(3));
        assert_eq!(config.fail_fast, Some(true));
        assert_eq!(config.output_dir, Some(PathBuf::from("/data/webinars")));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(AppConfig::parse("output = \"x\"").is_err());
    }

    #[test]
    fn missing_default_file_gives_defaults_but_explicit_one_fails() {
        let temp = tempfile::TempDir::new().unwrap();
        let missing = temp.path().join("nope.toml");
        assert!(matches!(
            AppConfig::load(Some(&missing)),
            Err(AppError::ConfigRead { .. })
        ));

        let present = temp.path().join("config.toml");
        std::fs::write(&present, "concurrency = 2\n").unwrap();
        assert_eq!(
            AppConfig::load(Some(&present)).unwrap().concurrency,
            Some(2)
        );
    }

    #[test]
    fn flags_override_file() {
        let config = AppConfig {
            concurrency: Some(2),
            ffmpeg: Some("/usr/bin/ffmpeg".into()),
            session_id: Some("from-file".into()),
            ..AppConfig::default()
        };
        let args = args(&["-j", "5", "--session-id", "from-flag"]);

        let pipeline = config.pipeline_config(&args);
        assert_eq!(pipeline.concurrency, 5);
        assert_eq!(pipeline.ffmpeg_path, "/usr/bin/ffmpeg");
        assert_eq!(config.session_credential(&args).as_deref(), Some("from-flag"));
    }

    #[test]
    fn failure_policy_resolution() {
        let file_abort = AppConfig {
            fail_fast: Some(true),
            ..AppConfig::default()
        };
        assert_eq!(
            AppConfig::default().pipeline_config(&args(&[])).failure_policy,
            SegmentFailurePolicy::Skip
        );
        assert_eq!(
            file_abort.pipeline_config(&args(&[])).failure_policy,
            SegmentFailurePolicy::Abort
        );
        assert_eq!(
            file_abort
                .pipeline_config(&args(&["--on-segment-error", "skip"]))
                .failure_policy,
            SegmentFailurePolicy::Skip
        );
        assert_eq!(
            AppConfig::default()
                .pipeline_config(&args(&["--fail-fast"]))
                .failure_policy,
            SegmentFailurePolicy::Abort
        );
    }

    #[test]
    fn zero_timeout_disables_it() {
        let config = AppConfig {
            timeout: Some(30),
            ..AppConfig::default()
        };
        let downloader = config.downloader_config(&args(&["--connect-timeout", "0"]));
        assert_eq!(downloader.timeout, Some(Duration::from_secs(30)));
        assert_eq!(downloader.connect_timeout, None);
    }

    #[test]
    fn proxy_flags_build_proxy_config() {
        let downloader = AppConfig::default().downloader_config(&args(&[
            "--proxy",
            "http://127.0.0.1:8080",
            "--proxy-type",
            "socks5",
            "--proxy-username",
            "user",
            "--proxy-password",
            "pass",
        ]));
        let proxy = downloader.proxy.unwrap();
        assert_eq!(proxy.proxy_type, ProxyType::Socks5);
        assert_eq!(proxy.auth.unwrap().username, "user");
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let downloader = AppConfig::default()
            .downloader_config(&args(&["--base-url", "https://events.example.com/"]));
        assert_eq!(downloader.base_url, "https://events.example.com");
    }
}
