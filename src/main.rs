use std::io;
use std::time::Duration;

use crossterm::event::KeyEventKind;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::prelude::*;

mod app;
mod config;
mod db;
mod error;
mod import;
mod models;
mod providers;
mod ranking;
mod scheduler;
mod tui;

use app::App;
use config::Config;
use error::Result;
use tui::{draw, handle_key_event};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging (only show warnings and errors by default)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    // Parse command line arguments
    let args: Vec<String> = std::env::args().collect();

    // Load configuration
    let config = Config::load()?;

    // Check for --import flag
    let import_url = if args.len() >= 3 && args[1] == "--import" {
        Some(args[2].clone())
    } else {
        None
    };

    // Headless modes
    let headless_refresh = args.len() >= 2 && args[1] == "--refresh";
    let headless_backfill = args.len() >= 2 && args[1] == "--backfill";
    let teardown = args.len() >= 2 && args[1] == "--teardown";

    // Initialize app
    let mut app = App::new(&config).await?;

    // If an import URL was provided, import the feed and exit
    if let Some(url) = import_url {
        let imported = app.import_feed(&url).await?;
        println!("Imported {} items from {}", imported, url);
        return Ok(());
    }

    // Headless refresh: queue every stale item, drain the queue, exit
    if headless_refresh {
        let queued = app.refresh_stale_blocking().await?;
        println!("Refreshed {} stale items", queued);
        return Ok(());
    }

    // Headless backfill: staggered refresh of the whole corpus
    if headless_backfill {
        let scheduled = app.backfill_blocking().await?;
        println!("Backfilled {} items", scheduled);
        return Ok(());
    }

    if teardown {
        app.teardown().await?;
        println!("Cancelled pending jobs, cleared metrics and configuration");
        return Ok(());
    }

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // Run the app
    let result = run_app(&mut terminal, &mut app).await;

    // Restore terminal
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    if let Err(e) = result {
        eprintln!("Error: {}", e);
    }

    Ok(())
}

async fn run_app<B: Backend>(terminal: &mut Terminal<B>, app: &mut App) -> Result<()> {
    loop {
        terminal.draw(|frame| draw(frame, app))?;

        // Pick up completed refreshes and reload the ranking
        app.poll_refresh_events().await?;

        // Poll for events with timeout to allow async operations
        if event::poll(Duration::from_millis(100))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    if let Some(action) =
                        handle_key_event(key, app.import_input_active, app.show_help)
                    {
                        let should_quit = app.handle_action(action).await?;
                        if should_quit {
                            return Ok(());
                        }
                    }
                }
            }
        }
    }
}
