//! Terminal session driver for the chat screen.
//!
//! Owns raw mode and the alternate screen for the length of one session.

use std::io;
use std::time::Duration;

use crossterm::event::{self, Event, KeyEventKind};
use crossterm::execute;
use crossterm::terminal::{EnterAlternateScreen, LeaveAlternateScreen};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;

use aiwrap_ai::AiService;

use crate::app::{AppAction, ChatSettings, TuiApp};
use crate::error::Result;
use crate::ui;

/// How long to wait for a key before checking for stream events.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Run an interactive chat session until the user quits.
///
/// The provider named in `settings` must already be registered with
/// `service`; this is checked before the terminal is touched.
///
/// # Errors
///
/// Returns a [`TuiError`](crate::error::TuiError) if the provider is unknown
/// or terminal setup, drawing or event handling fails. Failed chat requests
/// are shown in the transcript and do not end the session.
pub async fn run_tui(service: AiService, settings: ChatSettings) -> Result<()> {
    service.get(&settings.provider)?;

    let mut terminal = enter_terminal()?;
    let mut app = TuiApp::new(service, settings);
    tracing::info!(model = %app.model_name(), "chat session started");

    let outcome = event_loop(&mut terminal, &mut app).await;
    restore_terminal(&mut terminal)?;
    tracing::info!(transcript = app.entries().len(), "chat session ended");

    outcome
}

type ChatTerminal = Terminal<CrosstermBackend<io::Stdout>>;

fn enter_terminal() -> Result<ChatTerminal> {
    crossterm::terminal::enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    Ok(Terminal::new(CrosstermBackend::new(stdout))?)
}

// Called on both the success and error paths of the loop.
fn restore_terminal(terminal: &mut ChatTerminal) -> Result<()> {
    crossterm::terminal::disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

/// Draw, poll one key, drain stream events; repeat until quit.
async fn event_loop(terminal: &mut ChatTerminal, app: &mut TuiApp) -> Result<()> {
    loop {
        terminal.draw(|frame| ui::draw(frame, app))?;

        if event::poll(POLL_INTERVAL)?
            && let Event::Key(key) = event::read()?
            && key.kind == KeyEventKind::Press
            && app.handle_key(key) == AppAction::Quit
        {
            break;
        }

        app.check_stream_events();
    }

    Ok(())
}
