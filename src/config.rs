//! Command line and config file handling

use clap::{Args, Parser, Subcommand};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;
use crate::sampler::SamplerSettings;

#[derive(Debug, Parser)]
#[command(name = "gpx", version, about = "Live GPU utilization dashboard")]
pub struct Cli {
    /// TOML config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Show the dashboard (default)
    Watch(WatchArgs),

    /// Sample local GPUs and serve them to dashboards
    Serve(ServeArgs),
}

impl Default for Command {
    fn default() -> Self {
        Command::Watch(WatchArgs::default())
    }
}

#[derive(Debug, Default, Args)]
pub struct WatchArgs {
    /// Telemetry endpoint URL
    #[arg(short, long)]
    pub endpoint: Option<String>,

    /// Pause between polls in milliseconds
    #[arg(long)]
    pub interval_ms: Option<u64>,

    /// Delay before the first poll in milliseconds
    #[arg(long)]
    pub warmup_ms: Option<u64>,

    /// Request timeout in milliseconds (none by default)
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

#[derive(Debug, Default, Args)]
pub struct ServeArgs {
    /// Address to listen on
    #[arg(short, long)]
    pub bind: Option<SocketAddr>,

    /// GPU readings per second
    #[arg(long)]
    pub sample_rate: Option<f64>,

    /// Values kept per series
    #[arg(long)]
    pub max_aggregation_length: Option<usize>,

    /// Exponential smoothing weight in [0, 1)
    #[arg(long)]
    pub smoothing: Option<f64>,

    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct GpxConfig {
    pub dashboard: DashboardConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    pub endpoint: String,
    pub poll_interval_ms: u64,
    pub warmup_ms: u64,
    pub request_timeout_ms: Option<u64>,
    pub log_file: PathBuf,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:8080/".to_string(),
            poll_interval_ms: 100,
            warmup_ms: 1000,
            request_timeout_ms: None,
            log_file: PathBuf::from("/tmp/gpx.log"),
        }
    }
}

impl DashboardConfig {
    pub fn apply(&mut self, args: &WatchArgs) {
        if let Some(endpoint) = &args.endpoint {
            self.endpoint.clone_from(endpoint);
        }
        if let Some(interval) = args.interval_ms {
            self.poll_interval_ms = interval;
        }
        if let Some(warmup) = args.warmup_ms {
            self.warmup_ms = warmup;
        }
        if args.timeout_ms.is_some() {
            self.request_timeout_ms = args.timeout_ms;
        }
        if let Some(path) = &args.log_file {
            self.log_file.clone_from(path);
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn warmup(&self) -> Duration {
        Duration::from_millis(self.warmup_ms)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !self.endpoint.starts_with("http://") && !self.endpoint.starts_with("https://") {
            return Err(ConfigError::Invalid(format!(
                "dashboard.endpoint must be an http(s) URL, got {:?}",
                self.endpoint
            )));
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "dashboard.poll_interval_ms must be greater than 0".to_string(),
            ));
        }
        if self.request_timeout_ms == Some(0) {
            return Err(ConfigError::Invalid(
                "dashboard.request_timeout_ms must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    pub sample_rate_hz: f64,
    pub max_aggregation_length: usize,
    pub smoothing: f64,
    pub log_file: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let sampler = SamplerSettings::default();
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 8080)),
            sample_rate_hz: sampler.sample_rate_hz,
            max_aggregation_length: sampler.max_aggregation_length,
            smoothing: sampler.smoothing,
            log_file: PathBuf::from("/tmp/gpx-server.log"),
        }
    }
}

impl ServerConfig {
    pub fn apply(&mut self, args: &ServeArgs) {
        if let Some(bind) = args.bind {
            self.bind = bind;
        }
        if let Some(rate) = args.sample_rate {
            self.sample_rate_hz = rate;
        }
        if let Some(length) = args.max_aggregation_length {
            self.max_aggregation_length = length;
        }
        if let Some(smoothing) = args.smoothing {
            self.smoothing = smoothing;
        }
        if let Some(path) = &args.log_file {
            self.log_file.clone_from(path);
        }
    }

    pub fn sampler_settings(&self) -> SamplerSettings {
        SamplerSettings {
            sample_rate_hz: self.sample_rate_hz,
            max_aggregation_length: self.max_aggregation_length,
            smoothing: self.smoothing,
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !(self.sample_rate_hz.is_finite() && self.sample_rate_hz > 0.0) {
            return Err(ConfigError::Invalid(
                "server.sample_rate_hz must be a positive number".to_string(),
            ));
        }
        if let Err(e) = self.sampler_settings().period() {
            return Err(ConfigError::Invalid(format!(
                "server.sample_rate_hz {} gives an unusable sampling period: {}",
                self.sample_rate_hz, e
            )));
        }
        if self.max_aggregation_length == 0 {
            return Err(ConfigError::Invalid(
                "server.max_aggregation_length must be at least 1".to_string(),
            ));
        }
        if !(0.0..1.0).contains(&self.smoothing) {
            return Err(ConfigError::Invalid(
                "server.smoothing must be in [0, 1)".to_string(),
            ));
        }
        Ok(())
    }
}

impl GpxConfig {
    /// Reads `path`, or returns defaults when no file is given.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => {
                let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })?;
                Self::from_toml_str(&content)
            }
            None => Ok(Self::default()),
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Checks both sections after CLI overrides have been applied.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.dashboard.validate()?;
        self.server.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_without_file() {
        let config = GpxConfig::load(None).unwrap();

        assert_eq!(config.dashboard.poll_interval(), Duration::from_millis(100));
        assert_eq!(config.dashboard.warmup(), Duration::from_secs(1));
        assert_eq!(config.dashboard.request_timeout(), None);
        assert_eq!(config.server.sampler_settings(), SamplerSettings::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_file_keeps_remaining_defaults() {
        let config = GpxConfig::from_toml_str(
            r#"
            [dashboard]
            endpoint = "http://gpu-box:9000/"
            request_timeout_ms = 2500

            [server]
            smoothing = 0.0
            "#,
        )
        .unwrap();

        assert_eq!(config.dashboard.endpoint, "http://gpu-box:9000/");
        assert_eq!(config.dashboard.request_timeout(), Some(Duration::from_millis(2500)));
        assert_eq!(config.dashboard.poll_interval_ms, 100);
        assert_eq!(config.server.smoothing, 0.0);
        assert_eq!(config.server.max_aggregation_length, 1000);
    }

    #[test]
    fn loads_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[server]\nbind = \"0.0.0.0:9090\"\nsample_rate_hz = 2.0").unwrap();

        let config = GpxConfig::load(Some(file.path())).unwrap();

        assert_eq!(config.server.bind, "0.0.0.0:9090".parse::<SocketAddr>().unwrap());
        assert_eq!(config.server.sample_rate_hz, 2.0);
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let err = GpxConfig::load(Some(Path::new("/nonexistent/gpx.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let err = GpxConfig::from_toml_str("[dashboard]\npoll_interval_ms = \"fast\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn cli_overrides_file_values() {
        let cli = Cli::try_parse_from([
            "gpx",
            "watch",
            "--endpoint",
            "http://10.0.0.5:8080/",
            "--interval-ms",
            "250",
        ])
        .unwrap();
        let mut config = GpxConfig::from_toml_str("[dashboard]\npoll_interval_ms = 500").unwrap();

        match cli.command.unwrap_or_default() {
            Command::Watch(args) => config.dashboard.apply(&args),
            Command::Serve(_) => panic!("expected watch"),
        }

        assert_eq!(config.dashboard.endpoint, "http://10.0.0.5:8080/");
        assert_eq!(config.dashboard.poll_interval_ms, 250);
    }

    #[test]
    fn serve_flags_parse() {
        let cli = Cli::try_parse_from([
            "gpx",
            "-v",
            "serve",
            "--bind",
            "0.0.0.0:8081",
            "--max-aggregation-length",
            "50",
        ])
        .unwrap();
        assert!(cli.verbose);

        let mut server = ServerConfig::default();
        match cli.command {
            Some(Command::Serve(args)) => server.apply(&args),
            other => panic!("expected serve, got {:?}", other),
        }
        assert_eq!(server.bind.port(), 8081);
        assert_eq!(server.max_aggregation_length, 50);
    }

    #[test]
    fn no_subcommand_means_watch() {
        let cli = Cli::try_parse_from(["gpx"]).unwrap();
        assert!(matches!(cli.command.unwrap_or_default(), Command::Watch(_)));
    }

    #[test]
    fn rejects_out_of_range_values() {
        let mut config = GpxConfig::default();
        config.dashboard.poll_interval_ms = 0;
        assert!(config.validate().is_err());

        let mut config = GpxConfig::default();
        config.dashboard.endpoint = "gpu-box:8080".to_string();
        assert!(config.validate().is_err());

        let mut config = GpxConfig::default();
        config.server.smoothing = 1.0;
        assert!(config.validate().is_err());

        let mut config = GpxConfig::default();
        config.server.sample_rate_hz = 0.0;
        assert!(config.validate().is_err());

        let mut config = GpxConfig::default();
        config.server.max_aggregation_length = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_rate_too_slow_for_a_period() {
        let config = GpxConfig::from_toml_str("[server]\nsample_rate_hz = 1e-20").unwrap();

        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(ref msg) if msg.contains("sample_rate_hz")));

        let config = GpxConfig::from_toml_str("[server]\nsample_rate_hz = 0.5").unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.server.sampler_settings().period(), Ok(Duration::from_secs(2)));
    }
}
