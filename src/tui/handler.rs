use crossterm::event::{KeyCode, KeyEvent};

#[derive(Debug, Clone)]
pub enum AppAction {
    Quit,
    MoveUp,
    MoveDown,
    NextPage,
    PrevPage,
    CycleSort,
    CycleRange,
    RefreshSelected,
    Backfill,
    OpenInBrowser,
    ShowHelp,
    HideHelp,
    // Feed import input actions
    ImportStart,
    ImportInputChar(char),
    ImportInputBackspace,
    ImportInputConfirm,
    ImportInputCancel,
}

pub fn handle_key_event(
    key: KeyEvent,
    import_input_active: bool,
    show_help: bool,
) -> Option<AppAction> {
    // If help is showing, any key closes it
    if show_help {
        return Some(AppAction::HideHelp);
    }

    if import_input_active {
        return match key.code {
            KeyCode::Esc => Some(AppAction::ImportInputCancel),
            KeyCode::Enter => Some(AppAction::ImportInputConfirm),
            KeyCode::Backspace => Some(AppAction::ImportInputBackspace),
            KeyCode::Char(c) => Some(AppAction::ImportInputChar(c)),
            _ => None,
        };
    }

    match key.code {
        KeyCode::Char('q') | KeyCode::Esc => Some(AppAction::Quit),
        KeyCode::Up | KeyCode::Char('k') => Some(AppAction::MoveUp),
        KeyCode::Down | KeyCode::Char('j') => Some(AppAction::MoveDown),
        KeyCode::Right | KeyCode::Char('n') => Some(AppAction::NextPage),
        KeyCode::Left | KeyCode::Char('p') => Some(AppAction::PrevPage),
        KeyCode::Char('s') => Some(AppAction::CycleSort),
        KeyCode::Char('d') => Some(AppAction::CycleRange),
        KeyCode::Char('r') => Some(AppAction::RefreshSelected),
        KeyCode::Char('B') => Some(AppAction::Backfill),
        KeyCode::Char('o') | KeyCode::Enter => Some(AppAction::OpenInBrowser),
        KeyCode::Char('a') => Some(AppAction::ImportStart),
        KeyCode::Char('?') | KeyCode::Char('h') => Some(AppAction::ShowHelp),
        _ => None,
    }
}
