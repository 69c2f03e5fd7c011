//! Backend side: samples local GPUs into bounded, smoothed utilization histories.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, TryFromFloatSecsError};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::models::{DeviceMap, DeviceSample, TelemetrySnapshot};
use crate::nvidia::{DeviceProbe, DeviceReading};

#[derive(Clone, Debug, PartialEq)]
pub struct SamplerSettings {
    pub sample_rate_hz: f64,
    /// Values kept per series
    pub max_aggregation_length: usize,
    /// Weight of the previous value, 0 disables smoothing
    pub smoothing: f64,
}

impl SamplerSettings {
    /// Time between two readings. Fails for rates whose period does not fit a `Duration`.
    pub fn period(&self) -> Result<Duration, TryFromFloatSecsError> {
        Duration::try_from_secs_f64(1.0 / self.sample_rate_hz)
    }
}

impl Default for SamplerSettings {
    fn default() -> Self {
        Self {
            sample_rate_hz: 10.0,
            max_aggregation_length: 1000,
            smoothing: 0.3,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct DeviceHistory {
    pub index: u32,
    pub name: String,
    pub memory_total_mb: f64,
    pub driver: String,
    pub engine: VecDeque<f64>,
    pub memory: VecDeque<f64>,
}

impl DeviceHistory {
    /// Series start zero-filled so every device reports a full window from the first poll.
    fn new(reading: &DeviceReading, length: usize) -> Self {
        Self {
            index: reading.index,
            name: reading.name.clone(),
            memory_total_mb: reading.memory_total_mb,
            driver: reading.driver.clone(),
            engine: VecDeque::from(vec![0.0; length]),
            memory: VecDeque::from(vec![0.0; length]),
        }
    }

    fn record(&mut self, reading: &DeviceReading, settings: &SamplerSettings) {
        self.name.clone_from(&reading.name);
        self.memory_total_mb = reading.memory_total_mb;
        self.driver.clone_from(&reading.driver);
        push_bounded(&mut self.engine, reading.engine_pct, settings);
        push_bounded(&mut self.memory, reading.memory_pct, settings);
    }

    fn to_sample(&self) -> DeviceSample {
        DeviceSample {
            id: self.index.to_string(),
            name: self.name.clone(),
            engine_usage_timeseries: self.engine.iter().copied().collect(),
            memory_usage_timeseries: self.memory.iter().copied().collect(),
            memory_total_mb: Some(self.memory_total_mb),
            driver: Some(self.driver.clone()),
        }
    }
}

fn push_bounded(series: &mut VecDeque<f64>, raw: f64, settings: &SamplerSettings) {
    let value = if settings.smoothing > 0.0 {
        let last = series.back().copied().unwrap_or(0.0);
        (1.0 - settings.smoothing) * raw + settings.smoothing * last
    } else {
        raw
    };

    series.push_back(value);
    while series.len() > settings.max_aggregation_length {
        series.pop_front();
    }
}

#[derive(Debug, Default)]
pub struct TelemetryState {
    pub devices: BTreeMap<u32, DeviceHistory>,
    pub last_error: Option<String>,
}

/// Sampler state shared with the HTTP handlers.
#[derive(Clone, Debug, Default)]
pub struct SharedTelemetry(Arc<RwLock<TelemetryState>>);

impl SharedTelemetry {
    pub fn read(&self) -> RwLockReadGuard<'_, TelemetryState> {
        self.0.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, TelemetryState> {
        self.0.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Wire view of the current histories, ordered by device index.
    pub fn snapshot(&self) -> TelemetrySnapshot {
        let state = self.read();
        let data: DeviceMap = state
            .devices
            .values()
            .map(|history| (history.index.to_string(), history.to_sample()))
            .collect();

        TelemetrySnapshot {
            errors: state.last_error.iter().cloned().collect(),
            data,
        }
    }
}

pub struct Sampler<P> {
    probe: P,
    settings: SamplerSettings,
    state: SharedTelemetry,
    read_latency: Duration,
}

impl<P: DeviceProbe> Sampler<P> {
    pub fn new(probe: P, settings: SamplerSettings, state: SharedTelemetry) -> Self {
        Self {
            probe,
            settings,
            state,
            read_latency: Duration::ZERO,
        }
    }

    pub fn state(&self) -> &SharedTelemetry {
        &self.state
    }

    /// Takes one reading of every device. A failed probe keeps the previous
    /// histories and records the error for the next response.
    pub async fn read_all(&mut self) {
        match self.probe.read().await {
            Ok(readings) => {
                let mut state = self.state.write();
                for reading in &readings {
                    let length = self.settings.max_aggregation_length;
                    state
                        .devices
                        .entry(reading.index)
                        .or_insert_with(|| {
                            info!(index = reading.index, name = %reading.name, "tracking device");
                            DeviceHistory::new(reading, length)
                        })
                        .record(reading, &self.settings);
                }
                state.last_error = None;
            }
            Err(e) => {
                warn!("device probe failed: {}", e);
                self.state.write().last_error = Some(e.to_string());
            }
        }
    }

    /// Times one read; the result is subtracted from the sampling period.
    pub async fn calibrate(&mut self) -> Duration {
        let start = Instant::now();
        self.read_all().await;
        self.read_latency = start.elapsed();
        debug!(latency_ms = self.read_latency.as_millis() as u64, "sampler calibrated");
        self.read_latency
    }

    /// Pause after each read. Unrepresentable periods wait as long as tokio allows.
    pub fn sample_delay(&self) -> Duration {
        let period = self.settings.period().unwrap_or(Duration::MAX);
        period.saturating_sub(self.read_latency)
    }

    pub async fn run(&mut self, cancel: CancellationToken) {
        let delay = self.sample_delay();
        info!(
            rate_hz = self.settings.sample_rate_hz,
            delay_ms = delay.as_millis() as u64,
            "sampler started"
        );

        while !cancel.is_cancelled() {
            self.read_all().await;

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        info!("sampler stopped");
    }
}
