use anyhow::{Context, Result};
use clap::Parser;
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use ratatui::{backend::CrosstermBackend, Terminal};
use std::io::{self, Stdout};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use gpx::app::App;
use gpx::config::{Cli, Command, DashboardConfig, GpxConfig, ServerConfig};
use gpx::nvidia::NvidiaSmi;
use gpx::poller::{self, Poller, WatchSink};
use gpx::sampler::{Sampler, SharedTelemetry};
use gpx::{logging, server, ui, DashboardFeed, TelemetryClient};

type Tui = Terminal<CrosstermBackend<Stdout>>;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = GpxConfig::load(cli.config.as_deref())?;

    match cli.command.unwrap_or_default() {
        Command::Watch(args) => {
            config.dashboard.apply(&args);
            config.validate()?;
            watch(config.dashboard, cli.verbose).await
        }
        Command::Serve(args) => {
            config.server.apply(&args);
            config.validate()?;
            serve(config.server, cli.verbose).await
        }
    }
}

async fn watch(config: DashboardConfig, verbose: bool) -> Result<()> {
    let _guard = logging::init(&config.log_file, false, verbose)?;
    info!(endpoint = %config.endpoint, "starting dashboard");

    let client = TelemetryClient::new(&config.endpoint, config.request_timeout())
        .context("failed to create telemetry client")?;
    let (sink, feed) = WatchSink::channel();

    let cancel = CancellationToken::new();
    let (mut terminal, poll_task) = match poller::mount(
        init_terminal,
        Poller::new(client, sink, config.poll_interval()),
        config.warmup(),
        cancel.clone(),
    ) {
        Ok(mounted) => mounted,
        Err(e) => {
            let _ = restore_terminal();
            return Err(e);
        }
    };

    let mut app = App::new(config.endpoint.as_str());
    let result = run_dashboard(&mut terminal, &mut app, feed);

    cancel.cancel();
    restore_terminal()?;

    let poller = poll_task.await.context("poll task panicked")?;
    info!(cycles = poller.cycles(), "dashboard closed");
    result
}

fn run_dashboard(terminal: &mut Tui, app: &mut App, mut feed: DashboardFeed) -> Result<()> {
    loop {
        if app.sync(&mut feed) {
            debug!(devices = app.device_count(), "charts updated");
        }

        app.tick();
        terminal.draw(|f| ui::render(f, app))?;

        if event::poll(Duration::from_millis(100))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    match key.code {
                        KeyCode::Char('q') | KeyCode::Esc => return Ok(()),
                        _ => {}
                    }
                }
            }
        }
    }
}

fn init_terminal() -> Result<Tui> {
    crossterm::terminal::enable_raw_mode()?;
    crossterm::execute!(
        io::stdout(),
        crossterm::terminal::EnterAlternateScreen,
        crossterm::event::EnableMouseCapture
    )?;
    let mut terminal = Terminal::new(CrosstermBackend::new(io::stdout()))?;
    terminal.clear()?;
    Ok(terminal)
}

fn restore_terminal() -> Result<()> {
    crossterm::execute!(
        io::stdout(),
        crossterm::terminal::LeaveAlternateScreen,
        crossterm::event::DisableMouseCapture
    )?;
    crossterm::terminal::disable_raw_mode()?;
    Ok(())
}

async fn serve(config: ServerConfig, verbose: bool) -> Result<()> {
    let _guard = logging::init(&config.log_file, true, verbose)?;

    let state = SharedTelemetry::default();
    let mut sampler = Sampler::new(NvidiaSmi, config.sampler_settings(), state.clone());
    let latency = sampler.calibrate().await;
    info!(latency_ms = latency.as_millis() as u64, "probe calibrated");

    let listener = TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.bind))?;

    let cancel = CancellationToken::new();
    let sampler_cancel = cancel.clone();
    let sampler_task = tokio::spawn(async move { sampler.run(sampler_cancel).await });

    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown requested");
        }
        shutdown.cancel();
    });

    server::serve(listener, state, cancel.clone()).await?;
    cancel.cancel();
    sampler_task.await.context("sampler task panicked")?;
    Ok(())
}
