//! Interactive terminal browser for picking grail files to ingest.

pub mod keys;
pub mod state;
pub mod view;

use crossterm::{
    event::{self, Event},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use std::io::{self, Stdout};
use std::path::Path;
use std::time::Duration;

pub use keys::{map_key, Action};
pub use state::{BrowserState, Entry, Status, StatusLevel};

use crate::db::Db;
use crate::error::Result;
use crate::ingest::ingest_many;

const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Run the browser until the user quits, starting in `start_dir`.
pub async fn run(db: &Db, start_dir: &Path) -> Result<()> {
    let mut state = BrowserState::new(start_dir)?;

    let _guard = TerminalGuard::enter()?;
    let mut terminal = Terminal::new(CrosstermBackend::new(io::stdout()))?;

    loop {
        terminal.draw(|f| view::render(f, &state))?;

        let Some(Event::Key(key)) = tokio::task::block_in_place(next_event)? else {
            continue;
        };
        let Some(action) = map_key(key) else {
            continue;
        };

        match action {
            Action::Quit => break,
            Action::MoveUp => state.move_up(),
            Action::MoveDown => state.move_down(),
            Action::Open => state.open(),
            Action::Parent => state.parent(),
            Action::ToggleSelect => state.toggle_selected(),
            Action::Ingest => ingest_selection(db, &mut state, &mut terminal).await?,
        }
    }

    Ok(())
}

/// Wait up to `POLL_INTERVAL` for the next terminal event. Blocks the calling thread.
fn next_event() -> io::Result<Option<Event>> {
    if event::poll(POLL_INTERVAL)? {
        event::read().map(Some)
    } else {
        Ok(None)
    }
}

async fn ingest_selection(
    db: &Db,
    state: &mut BrowserState,
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
) -> Result<()> {
    let Some(paths) = state.selection_for_ingest() else {
        return Ok(());
    };
    terminal.draw(|f| view::render(f, state))?;

    // a store that went away mid-session is reported, not fatal
    match db.connect().await {
        Ok(_) => {
            let summary = ingest_many(db, &paths).await;
            state.finish_ingest(&summary);
        }
        Err(e) => {
            log::error!("Store unavailable during browser ingest: {}", e);
            state.ingest_failed(e);
        }
    }
    Ok(())
}

/// Raw mode and the alternate screen for as long as it lives.
struct TerminalGuard;

impl TerminalGuard {
    fn enter() -> io::Result<Self> {
        enable_raw_mode()?;
        let guard = TerminalGuard;
        execute!(io::stdout(), EnterAlternateScreen)?;
        Ok(guard)
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen);
    }
}
