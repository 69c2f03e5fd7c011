use chrono::Utc;

use crate::models::{ChartData, ChartFrame, ChartSeries, DeviceSample, TelemetrySnapshot};

/// Line width handed to the chart sink for every series
pub const BORDER_WIDTH: u16 = 2;

/// Legend text for a device, e.g. `[ 0 ] RTX 4090`
pub fn series_label(sample: &DeviceSample) -> String {
    format!("[ {} ] {}", sample.id, sample.name)
}

/// Reshapes a snapshot into fresh engine and memory charts, one series per
/// device in snapshot order. Nothing is carried over from earlier frames.
pub fn project(snapshot: &TelemetrySnapshot) -> ChartFrame {
    let mut engine = Vec::with_capacity(snapshot.data.len());
    let mut memory = Vec::with_capacity(snapshot.data.len());

    for sample in snapshot.data.samples() {
        let label = series_label(sample);
        engine.push(ChartSeries {
            label: label.clone(),
            data: sample.engine_usage_timeseries.clone(),
            border_width: BORDER_WIDTH,
        });
        memory.push(ChartSeries {
            label,
            data: sample.memory_usage_timeseries.clone(),
            border_width: BORDER_WIDTH,
        });
    }

    let labels = axis_labels(&engine);

    ChartFrame {
        engine: ChartData {
            labels: labels.clone(),
            datasets: engine,
        },
        memory: ChartData {
            labels,
            datasets: memory,
        },
        projected_at: Utc::now(),
    }
}

/// Shared x-axis sized after the first device's engine series; empty with no devices.
fn axis_labels(engine: &[ChartSeries]) -> Vec<usize> {
    let len = engine.first().map_or(0, |series| series.data.len());
    (0..len).collect()
}
