use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, instrument, warn};

use crate::error::ProbeError;

const QUERY: &str = "--query-gpu=index,name,utilization.gpu,memory.used,memory.total,driver_version";

/// One instantaneous reading of a GPU.
#[derive(Clone, Debug, PartialEq)]
pub struct DeviceReading {
    pub index: u32,
    pub name: String,
    /// Engine load, percent
    pub engine_pct: f64,
    /// VRAM in use, percent of total
    pub memory_pct: f64,
    pub memory_total_mb: f64,
    pub driver: String,
}

/// Source of GPU readings for the sampler.
#[async_trait]
pub trait DeviceProbe: Send + Sync {
    async fn read(&self) -> Result<Vec<DeviceReading>, ProbeError>;
}

/// Reads every visible GPU through `nvidia-smi`.
#[derive(Clone, Debug, Default)]
pub struct NvidiaSmi;

#[async_trait]
impl DeviceProbe for NvidiaSmi {
    #[instrument(skip(self))]
    async fn read(&self) -> Result<Vec<DeviceReading>, ProbeError> {
        let output = Command::new("nvidia-smi")
            .arg(QUERY)
            .arg("--format=csv,noheader,nounits")
            .output()
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => ProbeError::NotFound,
                _ => ProbeError::Execution(e),
            })?;

        if !output.status.success() {
            return Err(ProbeError::Failed {
                status: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let readings = parse_query_output(&String::from_utf8(output.stdout)?);
        debug!(devices = readings.len(), "nvidia-smi read");
        Ok(readings)
    }
}

/// Parses `--format=csv,noheader,nounits` output. Lines that do not carry
/// every queried column are skipped.
pub fn parse_query_output(output: &str) -> Vec<DeviceReading> {
    let mut readings = Vec::new();

    for (idx, line) in output.lines().enumerate() {
        let parts: Vec<&str> = line.split(',').map(|s| s.trim()).collect();
        if parts.len() < 6 {
            if !line.trim().is_empty() {
                warn!(line, "skipping malformed nvidia-smi line");
            }
            continue;
        }

        let index: u32 = parts[0].parse().unwrap_or(idx as u32);
        let engine: f64 = parts[2].parse().unwrap_or(0.0);
        let memory_used: f64 = parts[3].parse().unwrap_or(0.0);
        let memory_total: f64 = parts[4].parse().unwrap_or(0.0);

        let memory_pct = if memory_total > 0.0 {
            memory_used / memory_total * 100.0
        } else {
            0.0
        };

        readings.push(DeviceReading {
            index,
            name: parts[1].to_string(),
            engine_pct: round1(engine),
            memory_pct: round1(memory_pct),
            memory_total_mb: memory_total,
            driver: parts[5].to_string(),
        });
    }

    readings
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
