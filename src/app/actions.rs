use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use crate::transform::{Case, Transform};

/// Editor commands bound to control chords. Plain typing and caret motion
/// are handled separately by the editor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Quit,
    Undo,
    Redo,
    SelectAll,
    Transform(Transform),
    Transfer,
    CopyLink,
    AttachImage,
    ClearNote,
    ToggleWrap,
    ShowInfo,
}

pub fn action_for_key(key: &KeyEvent) -> Option<Action> {
    if !key.modifiers.contains(KeyModifiers::CONTROL) {
        return None;
    }
    let action = match key.code {
        KeyCode::Char('q') | KeyCode::Char('c') => Action::Quit,
        KeyCode::Char('z') => Action::Undo,
        KeyCode::Char('y') => Action::Redo,
        KeyCode::Char('a') => Action::SelectAll,
        KeyCode::Char('l') => Action::Transform(Transform::Cleanup),
        KeyCode::Char('b') => Action::Transform(Transform::Bullets),
        KeyCode::Char('u') => Action::Transform(Transform::Case(Case::Upper)),
        KeyCode::Char('k') => Action::Transform(Transform::Case(Case::Lower)),
        KeyCode::Char('t') => Action::Transfer,
        KeyCode::Char('e') => Action::CopyLink,
        KeyCode::Char('o') => Action::AttachImage,
        KeyCode::Char('x') => Action::ClearNote,
        KeyCode::Char('w') => Action::ToggleWrap,
        KeyCode::Char('g') => Action::ShowInfo,
        _ => return None,
    };
    Some(action)
}

/// One-line key reference shown in the footer and the info dialog.
pub const KEY_HINTS: &[(&str, &str)] = &[
    ("^T", "QR"),
    ("^E", "copy link"),
    ("^O", "image"),
    ("^L", "cleanup"),
    ("^B", "bullets"),
    ("^U/^K", "case"),
    ("^X", "clear"),
    ("^Q", "quit"),
];
