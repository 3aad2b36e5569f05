use std::io::Stdout;
use std::time::Duration;

use anyhow::{Context, Result};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use ratatui::backend::CrosstermBackend;
use ratatui::Terminal;

use crate::session::NoteSession;
use crate::share;
use crate::sync::EncodeStatus;
use crate::transform::{self, Transform};
use crate::ui;

mod actions;
pub mod state;

pub use actions::{Action, KEY_HINTS};
pub use state::{AppState, AttachPromptOverlay, EditorState, OverlayState, TransferOverlay};

const MAX_PROMPT_LEN: usize = 2048;

pub struct App {
    session: NoteSession,
    state: AppState,
    should_quit: bool,
    tick_rate: Duration,
}

impl App {
    pub fn new(session: NoteSession) -> Result<Self> {
        let mut state = AppState::new(session.note(), session.config().editor.wrap);
        if session.show_info().context("reading first-run flag")? {
            state.open_overlay(OverlayState::Info);
        }
        if session.note().has_images() {
            state.set_status_message(Some(format!(
                "{} image(s) attached",
                session.note().images.len()
            )));
        }
        Ok(Self {
            session,
            state,
            should_quit: false,
            tick_rate: Duration::from_millis(250),
        })
    }

    pub fn run(&mut self) -> Result<()> {
        let mut terminal = setup_terminal()?;
        let result = self.event_loop(&mut terminal);
        restore_terminal(&mut terminal)?;
        result
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    fn event_loop(&mut self, terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
        loop {
            terminal
                .draw(|frame| ui::draw_app(frame, &self.state))
                .context("rendering frame")?;

            if self.should_quit {
                break;
            }

            if event::poll(self.tick_rate).context("polling for terminal events")? {
                // Resize needs no handling; the next draw adapts.
                if let Event::Key(key) = event::read().context("reading terminal event")? {
                    self.handle_key(key);
                }
            }
        }
        Ok(())
    }

    fn handle_key(&mut self, key: KeyEvent) {
        if key.kind != KeyEventKind::Press {
            return;
        }

        if self.handle_overlay_key(key) {
            return;
        }

        if let Some(action) = actions::action_for_key(&key) {
            self.handle_action(action);
            return;
        }

        self.handle_editor_key(key);
    }

    fn handle_overlay_key(&mut self, key: KeyEvent) -> bool {
        match self.state.overlay() {
            None => false,
            Some(OverlayState::Info) => {
                if matches!(key.code, KeyCode::Esc | KeyCode::Enter | KeyCode::Char(' ')) {
                    self.state.close_overlay();
                    if let Err(err) = self.session.dismiss_info() {
                        tracing::error!(?err, "failed to store first-run flag");
                    }
                }
                true
            }
            Some(OverlayState::Transfer(overlay)) => {
                let url = overlay.url.clone();
                match key.code {
                    KeyCode::Esc | KeyCode::Enter | KeyCode::Char('q') => {
                        self.state.close_overlay();
                    }
                    KeyCode::Char('c') | KeyCode::Char('e') => match url {
                        Some(url) => self.copy_url(&url),
                        None => self
                            .state
                            .set_status_message(Some("No link to copy; the note is too large")),
                    },
                    _ => {}
                }
                true
            }
            Some(OverlayState::ConfirmClear) => {
                match key.code {
                    KeyCode::Char('y') | KeyCode::Char('Y') | KeyCode::Enter => {
                        self.state.close_overlay();
                        self.clear_note();
                    }
                    KeyCode::Esc | KeyCode::Char('n') | KeyCode::Char('N') => {
                        self.state.close_overlay();
                        self.state.set_status_message(Some("Clear canceled"));
                    }
                    _ => {}
                }
                true
            }
            Some(OverlayState::AttachPrompt(_)) => {
                match key.code {
                    KeyCode::Esc => {
                        self.state.close_overlay();
                        self.state.set_status_message(Some("Attach canceled"));
                    }
                    KeyCode::Enter => self.submit_attach_prompt(),
                    KeyCode::Backspace => {
                        if let Some(OverlayState::AttachPrompt(prompt)) = self.state.overlay_mut() {
                            prompt.input.pop();
                        }
                    }
                    KeyCode::Char(ch)
                        if !key.modifiers.intersects(
                            KeyModifiers::CONTROL | KeyModifiers::ALT | KeyModifiers::SUPER,
                        ) =>
                    {
                        if let Some(OverlayState::AttachPrompt(prompt)) = self.state.overlay_mut() {
                            if prompt.input.len() < MAX_PROMPT_LEN {
                                prompt.input.push(ch);
                            }
                        }
                    }
                    _ => {}
                }
                true
            }
        }
    }

    fn handle_action(&mut self, action: Action) {
        match action {
            Action::Quit => self.should_quit = true,
            Action::Undo => {
                if self.apply_editor_change(EditorState::undo) {
                    self.state.set_status_message(Some("Undid change"));
                } else {
                    self.state.set_status_message(Some("Nothing to undo"));
                }
            }
            Action::Redo => {
                if self.apply_editor_change(EditorState::redo) {
                    self.state.set_status_message(Some("Redid change"));
                } else {
                    self.state.set_status_message(Some("Nothing to redo"));
                }
            }
            Action::SelectAll => {
                self.state.editor_mut().select_all();
            }
            Action::Transform(transform) => self.apply_transform(transform),
            Action::Transfer => self.open_transfer(),
            Action::CopyLink => self.copy_link(),
            Action::AttachImage => {
                self.state
                    .open_overlay(OverlayState::AttachPrompt(AttachPromptOverlay::default()));
            }
            Action::ClearNote => self.state.open_overlay(OverlayState::ConfirmClear),
            Action::ToggleWrap => {
                let enabled = self.state.toggle_wrap();
                self.state.set_status_message(Some(if enabled {
                    "Wrap on"
                } else {
                    "Wrap off"
                }));
            }
            Action::ShowInfo => self.state.open_overlay(OverlayState::Info),
        }
    }

    fn handle_editor_key(&mut self, key: KeyEvent) -> bool {
        let extend = key.modifiers.contains(KeyModifiers::SHIFT);
        match key.code {
            KeyCode::Esc => {
                if self.state.editor_mut().clear_selection() {
                    return true;
                }
                self.should_quit = true;
                true
            }
            KeyCode::Enter => self.apply_editor_change(EditorState::insert_newline),
            KeyCode::Backspace => self.apply_editor_change(EditorState::backspace),
            KeyCode::Delete => self.apply_editor_change(EditorState::delete),
            KeyCode::Tab => self.apply_editor_change(|editor| editor.insert_char('\t')),
            KeyCode::Char(ch)
                if !key.modifiers.intersects(
                    KeyModifiers::CONTROL | KeyModifiers::ALT | KeyModifiers::SUPER,
                ) =>
            {
                self.apply_editor_change(|editor| editor.insert_char(ch))
            }
            KeyCode::Left => self.state.editor_mut().move_left(extend),
            KeyCode::Right => self.state.editor_mut().move_right(extend),
            KeyCode::Up => self.state.editor_mut().move_up(extend),
            KeyCode::Down => self.state.editor_mut().move_down(extend),
            KeyCode::Home => self.state.editor_mut().move_home(extend),
            KeyCode::End => self.state.editor_mut().move_end(extend),
            _ => false,
        }
    }

    fn apply_editor_change<F>(&mut self, f: F) -> bool
    where
        F: FnOnce(&mut EditorState) -> bool,
    {
        let changed = f(self.state.editor_mut());
        if changed {
            self.persist_editor();
        }
        changed
    }

    fn persist_editor(&mut self) {
        if let Err(err) = self.session.set_text(self.state.editor().buffer()) {
            tracing::error!(?err, "failed to save note");
            self.state
                .set_status_message(Some(format!("Save failed: {err:#}")));
        }
    }

    fn apply_transform(&mut self, transform: Transform) {
        let outcome = transform::apply(self.state.editor_mut(), transform);
        if outcome == transform::TransformOutcome::Applied {
            self.persist_editor();
        }
        self.state.set_status_message(Some(outcome.message(transform)));
    }

    fn open_transfer(&mut self) {
        let report = match self.session.prepare_transfer() {
            Ok(report) => report,
            Err(err) => {
                tracing::error!(?err, "failed to prepare transfer link");
                self.state
                    .set_status_message(Some(format!("Transfer failed: {err:#}")));
                return;
            }
        };

        let summary = report.status.summary();
        let url = report.status.url().map(str::to_string);
        let qr = match url.as_deref() {
            Some(url) => {
                match share::render_qr(url, self.session.config().transfer.qr_quiet_zone) {
                    Ok(rendered) => Some(rendered),
                    Err(err) => {
                        tracing::error!(?err, "failed to render QR code");
                        None
                    }
                }
            }
            None => None,
        };
        let skipped = report
            .skipped_images
            .iter()
            .map(|skipped| format!("{}: {}", skipped.reference, skipped.reason))
            .collect();
        self.state.set_status_message(Some(summary.clone()));
        self.state.open_overlay(OverlayState::Transfer(TransferOverlay {
            summary,
            url,
            qr,
            skipped,
        }));
    }

    fn copy_link(&mut self) {
        match self.session.prepare_transfer() {
            Ok(report) => match report.status {
                EncodeStatus::Ok { url } | EncodeStatus::Degraded { url, .. } => {
                    self.copy_url(&url)
                }
                status @ EncodeStatus::TooLarge { .. } => {
                    self.state.set_status_message(Some(status.summary()))
                }
            },
            Err(err) => {
                tracing::error!(?err, "failed to prepare transfer link");
                self.state
                    .set_status_message(Some(format!("Transfer failed: {err:#}")));
            }
        }
    }

    fn copy_url(&mut self, url: &str) {
        match share::copy_to_clipboard(url) {
            Ok(()) => self
                .state
                .set_status_message(Some(format!("Copied link ({} chars)", url.len()))),
            Err(err) => {
                tracing::warn!(%err, "clipboard copy failed");
                self.state
                    .set_status_message(Some(format!("Copy failed: {err}")));
            }
        }
    }

    fn submit_attach_prompt(&mut self) {
        let Some(OverlayState::AttachPrompt(prompt)) = self.state.close_overlay() else {
            return;
        };
        match self.session.attach_image(&prompt.input) {
            Ok(true) => {
                self.state.images = self.session.note().images.clone();
                self.state.set_status_message(Some(format!(
                    "Attached image ({} total)",
                    self.state.images.len()
                )));
            }
            Ok(false) => self.state.set_status_message(Some("Nothing to attach")),
            Err(err) => {
                tracing::error!(?err, "failed to attach image");
                self.state
                    .set_status_message(Some(format!("Attach failed: {err:#}")));
            }
        }
    }

    fn clear_note(&mut self) {
        match self.session.clear() {
            Ok(()) => {
                self.state.sync_note(self.session.note());
                self.state.set_status_message(Some("Note cleared"));
            }
            Err(err) => {
                tracing::error!(?err, "failed to clear note");
                self.state
                    .set_status_message(Some(format!("Clear failed: {err:#}")));
            }
        }
    }
}

fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>> {
    enable_raw_mode().context("enabling raw mode")?;
    let mut stdout = std::io::stdout();
    execute!(stdout, EnterAlternateScreen).context("switching to alternate screen")?;
    let backend = CrosstermBackend::new(stdout);
    let terminal = Terminal::new(backend).context("creating terminal backend")?;
    Ok(terminal)
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
    terminal.show_cursor().ok();
    disable_raw_mode().context("disabling raw mode")?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen).context("restoring screen state")?;
    Ok(())
}
