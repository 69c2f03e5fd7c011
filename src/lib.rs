//! gpx: live GPU utilization charts in the terminal, polled from a small
//! telemetry server that samples local GPUs.

pub mod app;
pub mod client;
pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod nvidia;
pub mod poller;
pub mod projector;
pub mod sampler;
pub mod server;
pub mod theme;
pub mod ui;

pub use client::{SnapshotSource, TelemetryClient};
pub use error::{ConfigError, ProbeError, TransportError};
pub use models::{ChartData, ChartFrame, ChartSeries, DeviceMap, DeviceSample, TelemetrySnapshot};
pub use poller::{ChartSink, DashboardFeed, PollOutcome, PollStatus, Poller, WatchSink};
