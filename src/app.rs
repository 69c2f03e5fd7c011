use chrono::{DateTime, Utc};

use crate::models::ChartFrame;
use crate::poller::{DashboardFeed, PollStatus};

/// Main application state
pub struct App {
    pub endpoint: String,
    pub frame: Option<ChartFrame>,
    pub status: PollStatus,
    pub started_at: DateTime<Utc>,
    pub frame_count: u64,
}

impl App {
    pub fn new(endpoint: impl Into<String>) -> Self {
        App {
            endpoint: endpoint.into(),
            frame: None,
            status: PollStatus::Waiting,
            started_at: Utc::now(),
            frame_count: 0,
        }
    }

    /// Pulls whatever the poll loop published since the last call.
    /// Returns true when the charts changed.
    pub fn sync(&mut self, feed: &mut DashboardFeed) -> bool {
        if feed.status.has_changed().unwrap_or(false) {
            self.status = feed.status.borrow_and_update().clone();
        }

        if feed.frames.has_changed().unwrap_or(false) {
            if let Some(frame) = feed.frames.borrow_and_update().as_ref() {
                self.frame = Some(frame.clone());
                return true;
            }
        }
        false
    }

    pub fn device_count(&self) -> usize {
        self.frame.as_ref().map_or(0, ChartFrame::device_count)
    }

    /// Increment frame counter
    pub fn tick(&mut self) {
        self.frame_count += 1;
    }
}
