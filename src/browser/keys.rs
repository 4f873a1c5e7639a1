//! Keybindings for the file browser.

use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Quit,
    MoveUp,
    MoveDown,
    Open,
    Parent,
    ToggleSelect,
    Ingest,
}

pub fn map_key(event: KeyEvent) -> Option<Action> {
    let KeyEvent {
        code,
        modifiers,
        kind,
        ..
    } = event;

    if kind == KeyEventKind::Release {
        return None;
    }

    if modifiers.contains(KeyModifiers::CONTROL) {
        return match code {
            KeyCode::Char('c') => Some(Action::Quit),
            _ => None,
        };
    }

    match code {
        KeyCode::Char('q') | KeyCode::Esc => Some(Action::Quit),
        KeyCode::Up | KeyCode::Char('k') => Some(Action::MoveUp),
        KeyCode::Down | KeyCode::Char('j') => Some(Action::MoveDown),
        KeyCode::Enter | KeyCode::Right | KeyCode::Char('l') => Some(Action::Open),
        KeyCode::Backspace | KeyCode::Left | KeyCode::Char('h') => Some(Action::Parent),
        KeyCode::Char(' ') => Some(Action::ToggleSelect),
        KeyCode::Char('i') => Some(Action::Ingest),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn test_navigation_keys() {
        assert_eq!(map_key(key(KeyCode::Up)), Some(Action::MoveUp));
        assert_eq!(map_key(key(KeyCode::Char('j'))), Some(Action::MoveDown));
        assert_eq!(map_key(key(KeyCode::Enter)), Some(Action::Open));
        assert_eq!(map_key(key(KeyCode::Char('l'))), Some(Action::Open));
        assert_eq!(map_key(key(KeyCode::Backspace)), Some(Action::Parent));
        assert_eq!(map_key(key(KeyCode::Left)), Some(Action::Parent));
    }

    #[test]
    fn test_action_keys() {
        assert_eq!(map_key(key(KeyCode::Char(' '))), Some(Action::ToggleSelect));
        assert_eq!(map_key(key(KeyCode::Char('i'))), Some(Action::Ingest));
        assert_eq!(map_key(key(KeyCode::Char('q'))), Some(Action::Quit));
        assert_eq!(map_key(key(KeyCode::Esc)), Some(Action::Quit));
        assert_eq!(
            map_key(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL)),
            Some(Action::Quit)
        );
        assert_eq!(map_key(key(KeyCode::Char('z'))), None);
    }
}
