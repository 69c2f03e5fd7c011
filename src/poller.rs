//! Fixed-cadence telemetry poll loop

use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use std::fmt::Display;
use tracing::{debug, error, info, warn};

use crate::client::SnapshotSource;
use crate::error::TransportError;
use crate::models::{ChartFrame, TelemetrySnapshot};
use crate::projector::project;

/// Result of a single poll cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    Fresh(TelemetrySnapshot),
    /// Decoded fine, but the server flagged problems. Still rendered.
    Degraded {
        snapshot: TelemetrySnapshot,
        errors: Vec<String>,
    },
    Failed(TransportError),
}

impl PollOutcome {
    pub fn classify(result: Result<TelemetrySnapshot, TransportError>) -> Self {
        match result {
            Ok(snapshot) if snapshot.has_errors() => PollOutcome::Degraded {
                errors: snapshot.errors.clone(),
                snapshot,
            },
            Ok(snapshot) => PollOutcome::Fresh(snapshot),
            Err(err) => PollOutcome::Failed(err),
        }
    }

    pub fn snapshot(&self) -> Option<&TelemetrySnapshot> {
        match self {
            PollOutcome::Fresh(snapshot) | PollOutcome::Degraded { snapshot, .. } => Some(snapshot),
            PollOutcome::Failed(_) => None,
        }
    }
}

/// What the dashboard shows on its status line.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum PollStatus {
    #[default]
    Waiting,
    Healthy {
        at: DateTime<Utc>,
        devices: usize,
    },
    ServerErrors {
        at: DateTime<Utc>,
        errors: Vec<String>,
    },
    Unreachable {
        at: DateTime<Utc>,
        error: TransportError,
    },
}

impl PollStatus {
    fn from_outcome(outcome: &PollOutcome, at: DateTime<Utc>) -> Self {
        match outcome {
            PollOutcome::Fresh(snapshot) => PollStatus::Healthy {
                at,
                devices: snapshot.data.len(),
            },
            PollOutcome::Degraded { errors, .. } => PollStatus::ServerErrors {
                at,
                errors: errors.clone(),
            },
            PollOutcome::Failed(error) => PollStatus::Unreachable {
                at,
                error: error.clone(),
            },
        }
    }
}

/// Rendering boundary of the poll loop.
pub trait ChartSink: Send {
    /// Replaces everything currently displayed
    fn push_frame(&mut self, frame: ChartFrame);

    fn report(&mut self, status: PollStatus);
}

/// Sink that publishes the latest frame and status over watch channels.
pub struct WatchSink {
    frames: watch::Sender<Option<ChartFrame>>,
    status: watch::Sender<PollStatus>,
}

/// Receiving half of a [`WatchSink`], read by the UI.
#[derive(Clone)]
pub struct DashboardFeed {
    pub frames: watch::Receiver<Option<ChartFrame>>,
    pub status: watch::Receiver<PollStatus>,
}

impl WatchSink {
    pub fn channel() -> (Self, DashboardFeed) {
        let (frames_tx, frames_rx) = watch::channel(None);
        let (status_tx, status_rx) = watch::channel(PollStatus::Waiting);
        (
            Self {
                frames: frames_tx,
                status: status_tx,
            },
            DashboardFeed {
                frames: frames_rx,
                status: status_rx,
            },
        )
    }
}

impl ChartSink for WatchSink {
    fn push_frame(&mut self, frame: ChartFrame) {
        self.frames.send_replace(Some(frame));
    }

    fn report(&mut self, status: PollStatus) {
        self.status.send_replace(status);
    }
}

pub struct Poller<S, K> {
    source: S,
    sink: K,
    interval: Duration,
    cycles: u64,
}

impl<S: SnapshotSource, K: ChartSink> Poller<S, K> {
    pub fn new(source: S, sink: K, interval: Duration) -> Self {
        Self {
            source,
            sink,
            interval,
            cycles: 0,
        }
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn sink(&self) -> &K {
        &self.sink
    }

    /// Runs one fetch/project/push cycle. A failed fetch leaves the sink's
    /// frame untouched so the last good data stays on screen.
    pub async fn poll_once(&mut self) -> PollOutcome {
        self.cycles += 1;
        let outcome = PollOutcome::classify(self.source.fetch_snapshot().await);
        let now = Utc::now();

        match &outcome {
            PollOutcome::Failed(err) => {
                warn!(cycle = self.cycles, kind = err.kind(), "poll failed: {}", err);
            }
            PollOutcome::Degraded { errors, .. } => {
                warn!(cycle = self.cycles, ?errors, "server reported errors");
            }
            PollOutcome::Fresh(snapshot) => {
                debug!(cycle = self.cycles, devices = snapshot.data.len(), "poll ok");
            }
        }

        if let Some(snapshot) = outcome.snapshot() {
            self.sink.push_frame(project(snapshot));
        }
        self.sink.report(PollStatus::from_outcome(&outcome, now));

        outcome
    }

    /// Polls until `cancel` fires. A cycle in flight always finishes; only the
    /// pause between cycles is cut short.
    pub async fn run(&mut self, cancel: CancellationToken) {
        info!(interval_ms = self.interval.as_millis() as u64, "poll loop started");

        while !cancel.is_cancelled() {
            self.poll_once().await;

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        info!(cycles = self.cycles, "poll loop stopped");
    }
}

/// Starts the poll loop on its own task after `warmup`. Returns the poller
/// once the loop has stopped.
pub fn spawn<S, K>(
    mut poller: Poller<S, K>,
    warmup: Duration,
    cancel: CancellationToken,
) -> JoinHandle<Poller<S, K>>
where
    S: SnapshotSource + 'static,
    K: ChartSink + 'static,
{
    tokio::spawn(async move {
        tokio::select! {
            _ = cancel.cancelled() => return poller,
            _ = tokio::time::sleep(warmup) => {}
        }
        poller.run(cancel).await;
        poller
    })
}

/// Runs `init` (terminal setup in the binary) and only then starts the poll
/// loop via [`spawn`]. A failed `init` is logged and returned, and the poller
/// is dropped without a single fetch.
pub fn mount<S, K, T, E>(
    init: impl FnOnce() -> Result<T, E>,
    poller: Poller<S, K>,
    warmup: Duration,
    cancel: CancellationToken,
) -> Result<(T, JoinHandle<Poller<S, K>>), E>
where
    S: SnapshotSource + 'static,
    K: ChartSink + 'static,
    E: Display,
{
    let mounted = init().map_err(|e| {
        error!("initialization failed, poll loop not started: {:#}", e);
        e
    })?;
    Ok((mounted, spawn(poller, warmup, cancel)))
}
