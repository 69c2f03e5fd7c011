use chrono::Utc;
use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    symbols,
    text::{Line, Span},
    widgets::{Axis, Block, BorderType, Borders, Chart, Dataset, GraphType, LegendPosition, Paragraph},
    Frame,
};

use crate::app::App;
use crate::models::ChartData;
use crate::poller::PollStatus;
use crate::theme::*;

pub const ENGINE_TITLE: &str = "GPU Engine Utilization (%)";
pub const MEMORY_TITLE: &str = "GPU Memory Utilization (%)";

/// Renders the main UI with header, both utilization charts and status line
pub fn render(frame: &mut Frame, app: &App) {
    // Main container with dark background
    let main_block = Block::default().style(Style::default().bg(DARK_BG));
    frame.render_widget(main_block, frame.area());

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(1)
        .constraints([
            Constraint::Length(3), // Header
            Constraint::Min(0),    // Charts
            Constraint::Length(1), // Status
        ])
        .split(frame.area());

    render_header(frame, chunks[0], app);
    render_status(frame, chunks[2], app);

    let Some(charts) = &app.frame else {
        render_waiting(frame, chunks[1], app);
        return;
    };

    let chart_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Ratio(1, 2), Constraint::Ratio(1, 2)])
        .split(chunks[1]);

    render_chart(frame, chart_chunks[0], ENGINE_TITLE, &charts.engine);
    render_chart(frame, chart_chunks[1], MEMORY_TITLE, &charts.memory);
}

fn render_header(frame: &mut Frame, area: Rect, app: &App) {
    let now = Utc::now();
    let uptime = now - app.started_at;

    let glitch_char = if app.frame_count % 10 < 2 { "█" } else { " " };

    let header_text = vec![
        Line::from(vec![Span::styled(
            "╔══════════════════════════════════════════════════════════════╗",
            Style::default().fg(NEON_GREEN),
        )]),
        Line::from(vec![
            Span::styled("║  ", Style::default().fg(NEON_GREEN)),
            Span::styled(glitch_char, Style::default().fg(NEON_MAGENTA)),
            Span::styled(
                " GPX MONITOR ",
                Style::default().fg(NEON_GREEN).add_modifier(Modifier::BOLD),
            ),
            Span::styled("│ ", Style::default().fg(NEON_GREEN)),
            Span::styled(
                format!("{}", now.format("%H:%M:%S")),
                Style::default().fg(NEON_YELLOW),
            ),
            Span::styled(" │ ", Style::default().fg(NEON_GREEN)),
            Span::styled(
                format!(
                    "UPTIME: {:02}:{:02}:{:02}",
                    uptime.num_hours(),
                    uptime.num_minutes() % 60,
                    uptime.num_seconds() % 60
                ),
                Style::default().fg(NEON_CYAN),
            ),
            Span::styled(" │ ", Style::default().fg(NEON_GREEN)),
            Span::styled(
                format!("GPUs: {:<3}", app.device_count()),
                Style::default().fg(NEON_MAGENTA),
            ),
            Span::styled("     ║", Style::default().fg(NEON_GREEN)),
        ]),
        Line::from(vec![Span::styled(
            "╚══════════════════════════════════════════════════════════════╝",
            Style::default().fg(NEON_GREEN),
        )]),
    ];

    let header = Paragraph::new(header_text)
        .style(Style::default().bg(DARK_BG))
        .alignment(Alignment::Left);
    frame.render_widget(header, area);
}

fn render_waiting(frame: &mut Frame, area: Rect, app: &App) {
    let blink = if app.frame_count % 20 < 10 { "█" } else { " " };
    let text = vec![
        Line::from(""),
        Line::from(vec![
            Span::styled("  [", Style::default().fg(NEON_RED)),
            Span::styled(
                "!",
                Style::default()
                    .fg(NEON_YELLOW)
                    .add_modifier(Modifier::BOLD),
            ),
            Span::styled("] ", Style::default().fg(NEON_RED)),
            Span::styled(
                "WAITING FOR TELEMETRY",
                Style::default().fg(NEON_RED).add_modifier(Modifier::BOLD),
            ),
            Span::styled(blink, Style::default().fg(NEON_GREEN)),
        ]),
        Line::from(""),
        Line::from(vec![Span::styled(
            format!("      Polling {} ...", app.endpoint),
            Style::default().fg(Color::DarkGray),
        )]),
    ];

    let block = Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Double)
        .border_style(Style::default().fg(NEON_RED))
        .style(Style::default().bg(DARK_BG));

    let paragraph = Paragraph::new(text).block(block);
    frame.render_widget(paragraph, area);
}

/// One line chart with a fixed 0..=100 y-axis and a hidden x-axis.
fn render_chart(frame: &mut Frame, area: Rect, title: &str, chart: &ChartData) {
    let points: Vec<Vec<(f64, f64)>> = chart
        .datasets
        .iter()
        .map(|series| {
            series
                .data
                .iter()
                .enumerate()
                .map(|(i, &value)| (i as f64, value.clamp(0.0, 100.0)))
                .collect()
        })
        .collect();

    let datasets: Vec<Dataset> = chart
        .datasets
        .iter()
        .zip(&points)
        .enumerate()
        .map(|(idx, (series, data))| {
            let marker = if series.border_width > 1 {
                symbols::Marker::Braille
            } else {
                symbols::Marker::Dot
            };
            Dataset::default()
                .name(series.label.clone())
                .marker(marker)
                .graph_type(GraphType::Line)
                .style(Style::default().fg(series_color(idx)))
                .data(data)
        })
        .collect();

    let x_max = chart.labels.len().saturating_sub(1).max(1) as f64;

    let widget = Chart::new(datasets)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_type(BorderType::Rounded)
                .border_style(Style::default().fg(MATRIX_GREEN))
                .title(Span::styled(
                    format!(" ◇ {} ", title),
                    Style::default().fg(NEON_GREEN).add_modifier(Modifier::BOLD),
                ))
                .style(Style::default().bg(DARK_BG)),
        )
        .x_axis(Axis::default().bounds([0.0, x_max]))
        .y_axis(
            Axis::default()
                .style(Style::default().fg(GRID))
                .bounds([0.0, 100.0])
                .labels(["0", "50", "100"]),
        )
        .legend_position(Some(LegendPosition::TopLeft))
        .hidden_legend_constraints((Constraint::Ratio(1, 2), Constraint::Ratio(1, 2)));

    frame.render_widget(widget, area);
}

fn render_status(frame: &mut Frame, area: Rect, app: &App) {
    let (marker, text, color) = match &app.status {
        PollStatus::Waiting => ("○", "connecting".to_string(), Color::DarkGray),
        PollStatus::Healthy { at, devices } => (
            "●",
            format!("ok {} │ {} device(s)", at.format("%H:%M:%S"), devices),
            NEON_GREEN,
        ),
        PollStatus::ServerErrors { at, errors } => (
            "▲",
            format!("server {} │ {}", at.format("%H:%M:%S"), errors.join("; ")),
            NEON_YELLOW,
        ),
        PollStatus::Unreachable { at, error } => (
            "✖",
            format!("{} │ {} │ showing last good data", at.format("%H:%M:%S"), error),
            NEON_RED,
        ),
    };

    let mut spans = vec![
        Span::styled(format!(" {} ", marker), Style::default().fg(color)),
        Span::styled(text, Style::default().fg(color)),
        Span::styled(" │ ", Style::default().fg(Color::DarkGray)),
        Span::styled(app.endpoint.as_str(), Style::default().fg(CYBER_BLUE)),
    ];
    if let Some(charts) = &app.frame {
        spans.push(Span::styled(
            format!(" │ frame {}", charts.projected_at.format("%H:%M:%S")),
            Style::default().fg(Color::DarkGray),
        ));
    }
    spans.push(Span::styled("   q/esc: quit", Style::default().fg(Color::DarkGray)));

    frame.render_widget(Paragraph::new(Line::from(spans)).style(Style::default().bg(DARK_BG)), area);
}
