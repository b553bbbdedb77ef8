use std::sync::Arc;

use anyhow::{anyhow, Result};
use clap::Parser;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

mod api;
mod app;
mod config;
mod handler;
mod session;
mod sse;
mod tui;
mod ui;

use app::App;
use config::Config;
use tui::EventHandler;

#[derive(Parser)]
#[command(name = "streamchat")]
#[command(about = "TUI chat client for a streaming question-answer service")]
struct Cli {
    /// Server base URL (overrides the config file)
    #[arg(short, long)]
    server: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging()?;

    let config = Config::load().unwrap_or_else(|_| Config::new());
    let server_url = config.resolve_server_url(cli.server);

    tui::install_panic_hook();
    let mut terminal = tui::init()?;
    let result = run(&mut terminal, &server_url).await;
    tui::restore()?;
    result
}

async fn run(terminal: &mut tui::Tui, server_url: &str) -> Result<()> {
    let (updates_tx, mut updates_rx) = mpsc::unbounded_channel();
    let mut app = App::new(server_url, updates_tx);
    tracing::info!(session = %app.session, server_url, "starting chat session");

    app.load_history();

    let mut events = EventHandler::new();
    while !app.should_quit {
        terminal.draw(|frame| ui::render(&mut app, frame))?;

        tokio::select! {
            Some(event) = events.next() => handler::handle_event(&mut app, event),
            Some(update) = updates_rx.recv() => app.apply_update(update),
        }
    }

    Ok(())
}

/// Log to a file under the config directory; stderr belongs to the TUI.
fn init_logging() -> Result<()> {
    let log_dir = dirs::config_dir()
        .ok_or_else(|| anyhow!("Could not determine config directory"))?
        .join("streamchat");
    std::fs::create_dir_all(&log_dir)?;
    let log_file = std::fs::File::create(log_dir.join("streamchat.log"))?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(Arc::new(log_file))
        .with_ansi(false)
        .init();

    Ok(())
}
