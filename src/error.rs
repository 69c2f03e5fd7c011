use std::path::PathBuf;
use thiserror::Error;

/// A poll cycle that could not produce a snapshot.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    #[error("error during request: no connection ({0})")]
    Connect(String),

    #[error("endpoint answered with HTTP {0}")]
    Status(u16),

    #[error("malformed telemetry body: {0}")]
    Decode(String),

    #[error("failed to build HTTP client: {0}")]
    Client(String),
}

impl TransportError {
    /// Short tag used in logs and on the status line
    pub fn kind(&self) -> &'static str {
        match self {
            TransportError::Connect(_) => "connect",
            TransportError::Status(_) => "status",
            TransportError::Decode(_) => "decode",
            TransportError::Client(_) => "client",
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            TransportError::Status(status.as_u16())
        } else if err.is_decode() {
            TransportError::Decode(err.to_string())
        } else if err.is_builder() {
            TransportError::Client(err.to_string())
        } else {
            TransportError::Connect(err.to_string())
        }
    }
}

#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("nvidia-smi not found - is the NVIDIA driver installed?")]
    NotFound,

    #[error("failed to execute nvidia-smi: {0}")]
    Execution(#[from] std::io::Error),

    #[error("nvidia-smi exited with {status}: {stderr}")]
    Failed { status: i32, stderr: String },

    #[error("nvidia-smi output is not UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}
