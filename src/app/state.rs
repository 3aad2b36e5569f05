use std::ops::Range;

use unicode_segmentation::UnicodeSegmentation;

use crate::note::Note;
use crate::transform::EditableDocument;

#[derive(Debug, Clone, Default)]
pub struct AttachPromptOverlay {
    pub input: String,
}

#[derive(Debug, Clone)]
pub struct TransferOverlay {
    pub summary: String,
    pub url: Option<String>,
    pub qr: Option<String>,
    pub skipped: Vec<String>,
}

#[derive(Debug, Clone)]
pub enum OverlayState {
    Info,
    Transfer(TransferOverlay),
    AttachPrompt(AttachPromptOverlay),
    ConfirmClear,
}

/// Text buffer with a caret, an optional selection anchor and undo history.
/// All offsets are byte offsets on grapheme boundaries.
#[derive(Debug, Clone)]
pub struct EditorState {
    buffer: String,
    cursor: usize,
    anchor: Option<usize>,
    preferred_column: Option<usize>,
    history: Vec<String>,
    history_index: usize,
}

impl EditorState {
    pub fn new(buffer: String) -> Self {
        let cursor = buffer.len();
        let mut history = Vec::with_capacity(128);
        history.push(buffer.clone());
        Self {
            buffer,
            cursor,
            anchor: None,
            preferred_column: None,
            history,
            history_index: 0,
        }
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    pub fn selection_range(&self) -> Option<Range<usize>> {
        let anchor = self.anchor?;
        if anchor == self.cursor {
            return None;
        }
        Some(anchor.min(self.cursor)..anchor.max(self.cursor))
    }

    pub fn has_selection(&self) -> bool {
        self.selection_range().is_some()
    }

    pub fn clear_selection(&mut self) -> bool {
        self.anchor.take().is_some()
    }

    pub fn select_all(&mut self) -> bool {
        if self.buffer.is_empty() {
            return false;
        }
        self.anchor = Some(0);
        self.cursor = self.buffer.len();
        self.preferred_column = None;
        true
    }

    /// Replaces the whole buffer as a single undoable edit.
    pub fn set_buffer(&mut self, text: &str) -> bool {
        if self.buffer == text {
            return false;
        }
        self.buffer = text.to_string();
        self.cursor = self.buffer.len();
        self.anchor = None;
        self.preferred_column = None;
        self.record_history();
        true
    }

    pub fn insert_char(&mut self, ch: char) -> bool {
        let mut scratch = [0u8; 4];
        let encoded = ch.encode_utf8(&mut scratch);
        self.delete_selection();
        self.buffer.insert_str(self.cursor, encoded);
        self.cursor += encoded.len();
        self.preferred_column = None;
        self.record_history();
        true
    }

    pub fn insert_newline(&mut self) -> bool {
        self.delete_selection();
        self.buffer.insert(self.cursor, '\n');
        self.cursor += 1;
        self.preferred_column = Some(0);
        self.record_history();
        true
    }

    pub fn backspace(&mut self) -> bool {
        if self.delete_selection() {
            self.record_history();
            return true;
        }
        if self.cursor == 0 {
            return false;
        }
        let prev = prev_grapheme_boundary(&self.buffer, self.cursor);
        self.buffer.drain(prev..self.cursor);
        self.cursor = prev;
        self.preferred_column = None;
        self.record_history();
        true
    }

    pub fn delete(&mut self) -> bool {
        if self.delete_selection() {
            self.record_history();
            return true;
        }
        if self.cursor >= self.buffer.len() {
            return false;
        }
        let next = next_grapheme_boundary(&self.buffer, self.cursor);
        if next == self.cursor {
            return false;
        }
        self.buffer.drain(self.cursor..next);
        self.preferred_column = None;
        self.record_history();
        true
    }

    /// Moves the caret. With `extend` the selection grows from where the
    /// caret started; without it any selection is dropped.
    pub fn move_left(&mut self, extend: bool) -> bool {
        self.begin_motion(extend);
        if self.cursor == 0 {
            return false;
        }
        self.cursor = prev_grapheme_boundary(&self.buffer, self.cursor);
        self.preferred_column = None;
        true
    }

    pub fn move_right(&mut self, extend: bool) -> bool {
        self.begin_motion(extend);
        if self.cursor >= self.buffer.len() {
            return false;
        }
        let next = next_grapheme_boundary(&self.buffer, self.cursor);
        if next == self.cursor {
            return false;
        }
        self.cursor = next;
        self.preferred_column = None;
        true
    }

    pub fn move_home(&mut self, extend: bool) -> bool {
        self.begin_motion(extend);
        let line_start = line_start(&self.buffer, self.cursor);
        if self.cursor == line_start {
            return false;
        }
        self.cursor = line_start;
        self.preferred_column = Some(0);
        true
    }

    pub fn move_end(&mut self, extend: bool) -> bool {
        self.begin_motion(extend);
        let line_end = line_end(&self.buffer, self.cursor);
        if self.cursor == line_end {
            return false;
        }
        self.cursor = line_end;
        self.preferred_column = Some(column_at(
            &self.buffer,
            line_start(&self.buffer, self.cursor),
            self.cursor,
        ));
        true
    }

    pub fn move_up(&mut self, extend: bool) -> bool {
        self.begin_motion(extend);
        let current_line_start = line_start(&self.buffer, self.cursor);
        let current_column = self
            .preferred_column
            .unwrap_or_else(|| column_at(&self.buffer, current_line_start, self.cursor));
        if current_line_start == 0 {
            if self.cursor == 0 {
                return false;
            }
            self.cursor = 0;
            self.preferred_column = Some(current_column);
            return true;
        }
        let prev_line_start = line_start(&self.buffer, current_line_start - 1);
        let target = position_for_column(&self.buffer, prev_line_start, current_column);
        self.cursor = target;
        self.preferred_column = Some(current_column);
        true
    }

    pub fn move_down(&mut self, extend: bool) -> bool {
        self.begin_motion(extend);
        let current_line_start = line_start(&self.buffer, self.cursor);
        let current_column = self
            .preferred_column
            .unwrap_or_else(|| column_at(&self.buffer, current_line_start, self.cursor));
        let current_line_end = line_end(&self.buffer, self.cursor);
        if current_line_end == self.buffer.len() {
            if self.cursor == self.buffer.len() {
                return false;
            }
            self.cursor = self.buffer.len();
            self.preferred_column = Some(current_column);
            return true;
        }
        let target = position_for_column(&self.buffer, current_line_end + 1, current_column);
        self.cursor = target;
        self.preferred_column = Some(current_column);
        true
    }

    pub fn undo(&mut self) -> bool {
        if self.history_index == 0 {
            return false;
        }
        self.history_index -= 1;
        self.restore_history_snapshot();
        true
    }

    pub fn redo(&mut self) -> bool {
        if self.history_index + 1 >= self.history.len() {
            return false;
        }
        self.history_index += 1;
        self.restore_history_snapshot();
        true
    }

    fn begin_motion(&mut self, extend: bool) {
        if extend {
            self.anchor.get_or_insert(self.cursor);
        } else {
            self.anchor = None;
        }
    }

    fn delete_selection(&mut self) -> bool {
        let Some(range) = self.selection_range() else {
            self.anchor = None;
            return false;
        };
        self.buffer.drain(range.clone());
        self.cursor = range.start;
        self.anchor = None;
        self.preferred_column = None;
        true
    }

    fn record_history(&mut self) {
        const MAX_HISTORY: usize = 200;
        if let Some(current) = self.history.get(self.history_index) {
            if current.as_str() == self.buffer {
                return;
            }
        }
        self.history.truncate(self.history_index + 1);
        self.history.push(self.buffer.clone());
        if self.history.len() > MAX_HISTORY {
            let overflow = self.history.len() - MAX_HISTORY;
            self.history.drain(0..overflow);
        }
        self.history_index = self.history.len() - 1;
    }

    fn restore_history_snapshot(&mut self) {
        if let Some(snapshot) = self.history.get(self.history_index).cloned() {
            self.buffer = snapshot;
            self.cursor = floor_boundary(&self.buffer, self.cursor.min(self.buffer.len()));
            self.anchor = None;
            self.preferred_column = None;
        }
    }
}

impl EditableDocument for EditorState {
    fn text(&self) -> &str {
        &self.buffer
    }

    fn selection(&self) -> Option<Range<usize>> {
        self.selection_range()
    }

    /// The replacement stays selected so a second transform can follow.
    fn replace(&mut self, range: Range<usize>, replacement: &str) {
        let had_selection = self.has_selection();
        let start = range.start;
        self.buffer.replace_range(range, replacement);
        let end = start + replacement.len();
        if had_selection {
            self.anchor = Some(start);
            self.cursor = end;
        } else {
            self.anchor = None;
            self.cursor = self.cursor.min(self.buffer.len());
            self.cursor = floor_boundary(&self.buffer, self.cursor);
        }
        self.preferred_column = None;
        self.record_history();
    }
}

#[derive(Debug, Clone)]
pub struct AppState {
    pub editor: EditorState,
    pub images: Vec<String>,
    pub status_message: Option<String>,
    pub overlay: Option<OverlayState>,
    pub wrap_enabled: bool,
}

impl AppState {
    pub fn new(note: &Note, wrap_enabled: bool) -> Self {
        Self {
            editor: EditorState::new(note.text.clone()),
            images: note.images.clone(),
            status_message: None,
            overlay: None,
            wrap_enabled,
        }
    }

    pub fn editor(&self) -> &EditorState {
        &self.editor
    }

    pub fn editor_mut(&mut self) -> &mut EditorState {
        &mut self.editor
    }

    /// Brings the view in line with a note that changed underneath it,
    /// e.g. after a clear.
    pub fn sync_note(&mut self, note: &Note) {
        self.editor.set_buffer(&note.text);
        self.images = note.images.clone();
    }

    pub fn set_status_message<S: Into<String>>(&mut self, message: Option<S>) {
        self.status_message = message.map(Into::into);
    }

    pub fn clear_status_message(&mut self) {
        self.status_message = None;
    }

    pub fn overlay(&self) -> Option<&OverlayState> {
        self.overlay.as_ref()
    }

    pub fn overlay_mut(&mut self) -> Option<&mut OverlayState> {
        self.overlay.as_mut()
    }

    pub fn open_overlay(&mut self, overlay: OverlayState) {
        self.overlay = Some(overlay);
    }

    pub fn close_overlay(&mut self) -> Option<OverlayState> {
        self.overlay.take()
    }

    pub fn toggle_wrap(&mut self) -> bool {
        self.wrap_enabled = !self.wrap_enabled;
        self.wrap_enabled
    }
}

fn prev_grapheme_boundary(text: &str, cursor: usize) -> usize {
    if cursor == 0 {
        return 0;
    }
    text[..cursor]
        .grapheme_indices(true)
        .last()
        .map(|(idx, _)| idx)
        .unwrap_or(0)
}

fn next_grapheme_boundary(text: &str, cursor: usize) -> usize {
    if cursor >= text.len() {
        return text.len();
    }
    text[cursor..]
        .graphemes(true)
        .next()
        .map(|grapheme| cursor + grapheme.len())
        .unwrap_or(text.len())
}

fn floor_boundary(text: &str, mut idx: usize) -> usize {
    while idx > 0 && !text.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

fn line_start(text: &str, cursor: usize) -> usize {
    text[..cursor].rfind('\n').map(|idx| idx + 1).unwrap_or(0)
}

fn line_end(text: &str, cursor: usize) -> usize {
    text[cursor..]
        .find('\n')
        .map(|idx| cursor + idx)
        .unwrap_or(text.len())
}

fn column_at(text: &str, line_start: usize, cursor: usize) -> usize {
    text[line_start..cursor].graphemes(true).count()
}

fn position_for_column(text: &str, line_start: usize, column: usize) -> usize {
    let line_end = line_end(text, line_start);
    text[line_start..line_end]
        .grapheme_indices(true)
        .nth(column)
        .map(|(idx, _)| line_start + idx)
        .unwrap_or(line_end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::{self, Case, Transform, TransformOutcome};

    #[test]
    fn editor_undo_redo_cycles() {
        let mut editor = EditorState::new("hello".to_string());
        assert!(editor.insert_char('!'));
        assert_eq!(editor.buffer(), "hello!");
        assert!(editor.undo());
        assert_eq!(editor.buffer(), "hello");
        assert!(!editor.undo());
        assert!(editor.redo());
        assert_eq!(editor.buffer(), "hello!");
    }

    #[test]
    fn shift_motion_builds_selection_and_typing_replaces_it() {
        let mut editor = EditorState::new("hello world".to_string());
        editor.move_home(false);
        for _ in 0..5 {
            editor.move_right(true);
        }
        assert_eq!(editor.selection_range(), Some(0..5));
        editor.insert_char('J');
        assert_eq!(editor.buffer(), "J world");
        assert!(!editor.has_selection());
    }

    #[test]
    fn plain_motion_drops_selection() {
        let mut editor = EditorState::new("abc".to_string());
        editor.move_left(true);
        assert!(editor.has_selection());
        editor.move_left(false);
        assert!(!editor.has_selection());
    }

    #[test]
    fn vertical_motion_keeps_column_across_short_lines() {
        let mut editor = EditorState::new("abcdef\nxy\nlmnopq".to_string());
        editor.move_up(false);
        editor.move_up(false);
        editor.move_home(false);
        for _ in 0..4 {
            editor.move_right(false);
        }
        editor.move_down(false);
        assert_eq!(editor.cursor(), 9); // end of "xy"
        editor.move_down(false);
        assert_eq!(editor.cursor(), 14); // column 4 of "lmnopq"
    }

    #[test]
    fn case_transform_applies_to_selection_and_keeps_it() {
        let mut editor = EditorState::new("make this loud".to_string());
        editor.move_home(false);
        for _ in 0..9 {
            editor.move_right(true);
        }
        let outcome = transform::apply(&mut editor, Transform::Case(Case::Upper));
        assert_eq!(outcome, TransformOutcome::Applied);
        assert_eq!(editor.buffer(), "MAKE THIS loud");
        assert_eq!(editor.selection_range(), Some(0..9));
        assert!(editor.undo());
        assert_eq!(editor.buffer(), "make this loud");
    }

    #[test]
    fn case_transform_without_selection_is_refused() {
        let mut editor = EditorState::new("quiet".to_string());
        let outcome = transform::apply(&mut editor, Transform::Case(Case::Upper));
        assert_eq!(outcome, TransformOutcome::NeedsSelection);
        assert_eq!(editor.buffer(), "quiet");
    }

    #[test]
    fn whole_document_transform_clamps_cursor() {
        let mut editor = EditorState::new("  a  \n\n\n".to_string());
        let outcome = transform::apply(&mut editor, Transform::Cleanup);
        assert_eq!(outcome, TransformOutcome::Applied);
        assert_eq!(editor.buffer(), "a");
        assert!(editor.cursor() <= editor.buffer().len());
    }
}
