//! Rendering for the file browser.

use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph},
    Frame,
};

use super::state::{BrowserState, StatusLevel};

const HELP: &str =
    "↑/↓ move  Enter/→ open  ←/Backspace up  Space select .json  i ingest  q quit";

pub fn render(f: &mut Frame<'_>, state: &BrowserState) {
    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(0),
            Constraint::Length(3),
        ])
        .split(f.size());

    render_header(f, state, layout[0]);
    render_listing(f, state, layout[1]);
    render_status(f, state, layout[2]);
}

fn render_header(f: &mut Frame<'_>, state: &BrowserState, area: Rect) {
    let header = Paragraph::new(Line::from(vec![
        Span::styled(
            state.cwd.display().to_string(),
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        ),
        Span::raw("  "),
        Span::styled(HELP, Style::default().fg(Color::DarkGray)),
    ]))
    .block(
        Block::default()
            .borders(Borders::ALL)
            .title("Save Grail JSON - File Browser"),
    );
    f.render_widget(header, area);
}

fn render_listing(f: &mut Frame<'_>, state: &BrowserState, area: Rect) {
    let items: Vec<ListItem> = state
        .entries
        .iter()
        .map(|entry| {
            let (marker, style) = if entry.is_dir {
                ("   ", Style::default().fg(Color::Blue))
            } else if state.is_selected(&entry.path) {
                ("[x]", Style::default().fg(Color::Green))
            } else if entry.is_json() {
                ("[ ]", Style::default())
            } else {
                ("   ", Style::default().fg(Color::DarkGray))
            };
            let name = if entry.is_dir {
                format!("{}/", entry.name)
            } else {
                entry.name.clone()
            };
            let mut spans = vec![Span::raw(format!("{} ", marker)), Span::styled(name, style)];
            if entry.valid_json == Some(false) {
                spans.push(Span::styled(
                    "  (invalid JSON)",
                    Style::default().fg(Color::Red),
                ));
            }
            ListItem::new(Line::from(spans))
        })
        .collect();

    let title = format!("{} selected", state.selected.len());
    let list = List::new(items)
        .block(Block::default().borders(Borders::ALL).title(title))
        .highlight_style(Style::default().add_modifier(Modifier::REVERSED));

    let mut list_state = ListState::default().with_selected(Some(state.cursor));
    f.render_stateful_widget(list, area, &mut list_state);
}

fn render_status(f: &mut Frame<'_>, state: &BrowserState, area: Rect) {
    let color = match state.status.level {
        StatusLevel::Info => Color::White,
        StatusLevel::Success => Color::Green,
        StatusLevel::Warning => Color::Yellow,
        StatusLevel::Error => Color::Red,
    };
    let status = Paragraph::new(state.status.message.as_str())
        .style(Style::default().fg(color))
        .block(Block::default().borders(Borders::ALL));
    f.render_widget(status, area);
}
