//! Chat screen layout, top to bottom:
//!
//! - a one-line title with the model and reply status
//! - the transcript, which takes the remaining height and scrolls
//! - a three-line prompt box

use ratatui::Frame;
use ratatui::layout::{Constraint, Direction, Layout, Position};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};

use crate::app::{EntryKind, TuiApp};

// ---------------------------------------------------------------------------
// Frame
// ---------------------------------------------------------------------------

/// Render one frame of the chat screen.
pub fn draw(frame: &mut Frame, app: &TuiApp) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1), // header
            Constraint::Min(1),    // transcript
            Constraint::Length(3), // input
        ])
        .split(frame.area());

    draw_header(frame, app, chunks[0]);
    draw_transcript(frame, app, chunks[1]);
    draw_input(frame, app, chunks[2]);
}

// ---------------------------------------------------------------------------
// Header
// ---------------------------------------------------------------------------

/// Title line with the active model and reply status.
fn draw_header(frame: &mut Frame, app: &TuiApp, area: ratatui::layout::Rect) {
    let status = if app.is_thinking() {
        Span::styled(" Streaming... ", Style::default().fg(Color::Yellow))
    } else {
        Span::styled(" Ready ", Style::default().fg(Color::Green))
    };

    let header = Line::from(vec![
        Span::styled(
            concat!(" aiwrap chat v", env!("CARGO_PKG_VERSION"), " "),
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw("| Model: "),
        Span::styled(app.model_name(), Style::default().fg(Color::White)),
        Span::raw(" | "),
        status,
        Span::raw("| Esc to quit "),
    ]);

    let header_widget = Paragraph::new(header).style(Style::default().bg(Color::DarkGray));

    frame.render_widget(header_widget, area);
}

// ---------------------------------------------------------------------------
// Transcript
// ---------------------------------------------------------------------------

/// Prefix and style for a transcript line.
fn entry_style(kind: EntryKind) -> (&'static str, Style) {
    match kind {
        EntryKind::User => ("You: ", Style::default().fg(Color::Cyan)),
        EntryKind::Assistant => ("AI: ", Style::default().fg(Color::Green)),
        EntryKind::Error => ("[!] ", Style::default().fg(Color::Red)),
        EntryKind::System => (
            "",
            Style::default()
                .fg(Color::Magenta)
                .add_modifier(Modifier::DIM),
        ),
    }
}

/// Draw the scrollable transcript area.
fn draw_transcript(frame: &mut Frame, app: &TuiApp, area: ratatui::layout::Rect) {
    let mut lines: Vec<Line<'_>> = Vec::new();

    for entry in app.entries() {
        let (prefix, style) = entry_style(entry.kind);

        for (i, content_line) in entry.content.split('\n').enumerate() {
            let spans = if i == 0 {
                vec![
                    Span::styled(prefix, style),
                    Span::styled(content_line.to_owned(), style),
                ]
            } else {
                // Continuation lines line up with the first one.
                let indent = " ".repeat(prefix.len());
                vec![
                    Span::raw(indent),
                    Span::styled(content_line.to_owned(), style),
                ]
            };
            lines.push(Line::from(spans));
        }

        lines.push(Line::from(""));
    }

    // The indicator only shows until the first fragment arrives.
    let awaiting_first_delta = app
        .entries()
        .last()
        .is_some_and(|e| e.kind == EntryKind::Assistant && e.content.is_empty());
    if app.is_thinking() && awaiting_first_delta {
        lines.push(Line::from(vec![Span::styled(
            "  Thinking...",
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        )]));
    }

    // Pin to the bottom unless the user scrolled up.
    let total_lines = lines.len() as u16;
    let visible_height = area.height.saturating_sub(2);
    let max_scroll = total_lines.saturating_sub(visible_height);
    let effective_scroll = max_scroll.saturating_sub(app.scroll_offset());

    let transcript_block = Block::default()
        .borders(Borders::ALL)
        .title(" Conversation ")
        .border_style(Style::default().fg(Color::DarkGray));

    let transcript_widget = Paragraph::new(lines)
        .block(transcript_block)
        .wrap(Wrap { trim: false })
        .scroll((effective_scroll, 0));

    frame.render_widget(transcript_widget, area);
}

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

/// Prompt box; dimmed while a reply is streaming.
fn draw_input(frame: &mut Frame, app: &TuiApp, area: ratatui::layout::Rect) {
    let input_block = Block::default()
        .borders(Borders::ALL)
        .title(if app.is_thinking() {
            " Input (waiting...) "
        } else {
            " Input "
        })
        .border_style(if app.is_thinking() {
            Style::default().fg(Color::DarkGray)
        } else {
            Style::default().fg(Color::Cyan)
        });

    let input_widget = Paragraph::new(app.input())
        .block(input_block)
        .style(Style::default().fg(Color::White));

    frame.render_widget(input_widget, area);

    // Cursor sits inside the border, after the typed chars.
    if !app.is_thinking() {
        let column = u16::try_from(app.cursor_pos()).unwrap_or(u16::MAX);
        let cursor_x = (area.x + 1).saturating_add(column);
        let cursor_y = area.y + 1;
        frame.set_cursor_position(Position::new(cursor_x, cursor_y));
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_kind_has_distinct_style() {
        let kinds = [
            EntryKind::System,
            EntryKind::User,
            EntryKind::Assistant,
            EntryKind::Error,
        ];
        let prefixes: Vec<&str> = kinds.iter().map(|k| entry_style(*k).0).collect();
        assert_eq!(prefixes, vec!["", "You: ", "AI: ", "[!] "]);
        assert_eq!(entry_style(EntryKind::Error).1.fg, Some(Color::Red));
    }

    #[test]
    fn draw_renders_header_and_welcome() {
        use std::time::Duration;

        use ratatui::Terminal;
        use ratatui::backend::TestBackend;

        use crate::app::ChatSettings;

        let app = TuiApp::new(
            aiwrap_ai::AiService::new(),
            ChatSettings {
                provider: "openai".into(),
                model: "gpt-5".into(),
                system_prompt: "You are a helpful assistant.".into(),
                request_timeout: Duration::from_secs(60),
            },
        );

        let mut terminal = Terminal::new(TestBackend::new(100, 12)).unwrap();
        terminal.draw(|frame| draw(frame, &app)).unwrap();

        let rendered: String = terminal
            .backend()
            .buffer()
            .content()
            .iter()
            .map(|cell| cell.symbol())
            .collect();
        assert!(rendered.contains("Model: gpt-5"));
        assert!(rendered.contains("Welcome to AI Chat!"));
        assert!(rendered.contains("Ready"));
    }
}
