//! skiff - terminal chat client
//!
//! Talks to a remote assistant backend over a realtime WebSocket channel,
//! falling back to plain HTTP requests when the channel is down, and keeps
//! every conversation on local disk across restarts.

mod app;
mod ui;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use crossterm::{
    event::{self, Event},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use skiff_core::{BackendClient, Config, FileStore, MessageDispatcher, SessionRegistry};
use tokio::sync::watch;

use crate::app::App;

#[derive(Parser, Debug)]
#[command(name = "skiff", about = "Terminal chat client for a remote assistant backend")]
struct Cli {
    /// Path to an alternate config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the backend HTTP base (e.g. http://127.0.0.1:8000/api)
    #[arg(long)]
    server: Option<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    Config::ensure_xdg_env();

    // Load configuration
    let mut config = match &cli.config {
        Some(path) => Config::load_from(path).context("failed to load configuration")?,
        None => Config::load().context("failed to load configuration")?,
    };
    if let Some(server) = cli.server {
        config.server.http_base = server;
        config.server.validate().context("invalid --server value")?;
    }

    // Initialize logging (to file, not stdout since we have a TUI)
    let _log_guard =
        skiff_core::logging::init(&config.logging).context("failed to initialize logging")?;

    tracing::info!("skiff starting up");

    let runtime = tokio::runtime::Runtime::new().context("failed to create tokio runtime")?;

    // Hydrate the persisted session state before anything touches it
    let store = Arc::new(FileStore::at_default_path());
    tracing::info!(path = %store.path().display(), "Loading persisted sessions");
    let mut registry = SessionRegistry::new(store);
    runtime.block_on(registry.hydrate());

    let client = BackendClient::new(&config.server).context("failed to create backend client")?;
    let dispatcher = MessageDispatcher::new(client.clone());

    // Background health probe driving the availability banner
    let (health_tx, health_rx) = watch::channel(true);
    runtime.spawn(async move {
        loop {
            let healthy = client.health_check().await;
            if health_tx.send(healthy).is_err() {
                break;
            }
            tokio::time::sleep(Duration::from_secs(30)).await;
        }
    });

    // Create app
    let mut app = App::new(
        registry,
        dispatcher,
        config.server.clone(),
        config.chat.include_web,
        runtime.handle().clone(),
        health_rx,
    );

    // Setup terminal
    enable_raw_mode().context("failed to enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen).context("failed to enter alternate screen")?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("failed to create terminal")?;

    // Run the main loop
    let result = run_app(&mut terminal, &mut app);

    // Restore terminal
    disable_raw_mode().context("failed to disable raw mode")?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)
        .context("failed to leave alternate screen")?;
    terminal.show_cursor().context("failed to show cursor")?;

    tracing::info!("skiff shutting down");

    result
}

/// Run the main application loop.
fn run_app(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>, app: &mut App) -> Result<()> {
    loop {
        // Drain channel frames and fallback outcomes, reconnect if needed
        app.on_tick();

        // Render
        terminal.draw(|frame| ui::render(frame, app))?;

        // Handle events
        if event::poll(Duration::from_millis(100))? {
            if let Event::Key(key) = event::read()? {
                app.handle_key(key);
            }
        }

        // Check if we should quit
        if app.should_quit {
            break;
        }
    }

    Ok(())
}
