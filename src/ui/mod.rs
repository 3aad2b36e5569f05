use std::ops::Range;

use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, Borders, Clear, Paragraph, Wrap};
use ratatui::Frame;
use unicode_segmentation::UnicodeSegmentation;
use unicode_width::UnicodeWidthStr;

use crate::app::state::{AppState, EditorState, OverlayState, TransferOverlay};
use crate::app::KEY_HINTS;
use crate::note::is_data_uri;
use crate::share::qr_extent;

const MAX_IMAGE_ROWS: u16 = 4;

pub fn draw_app(frame: &mut Frame, state: &AppState) {
    let image_rows = if state.images.is_empty() {
        0
    } else {
        (state.images.len() as u16).min(MAX_IMAGE_ROWS) + 2
    };
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(3),
            Constraint::Length(image_rows),
            Constraint::Length(2),
        ])
        .split(frame.size());

    let editor = state.editor();
    let editor_area = vertical[0];
    let cursor = editor_cursor_screen_position(editor, editor_area, state.wrap_enabled);
    let inner_height = editor_area.height.saturating_sub(2);
    let scroll = cursor
        .map(|(_, row)| row.saturating_sub(inner_height.saturating_sub(1)))
        .unwrap_or(0);

    let title = if editor.has_selection() {
        "Note [selection]"
    } else {
        "Note"
    };
    let mut body = Paragraph::new(Text::from(selection_lines(
        editor.buffer(),
        editor.selection_range(),
    )))
    .block(
        Block::default()
            .title(title)
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan)),
    )
    .scroll((scroll, 0));
    if state.wrap_enabled {
        body = body.wrap(Wrap { trim: false });
    }
    frame.render_widget(body, editor_area);

    if state.overlay().is_none() {
        if let Some((col, row)) = cursor {
            frame.set_cursor(
                editor_area.x + 1 + col,
                editor_area.y + 1 + row.saturating_sub(scroll),
            );
        }
    }

    if image_rows > 0 {
        render_images(frame, state, vertical[1]);
    }

    let status = build_status_line(state);
    frame.render_widget(
        Paragraph::new(status).style(Style::default().fg(Color::Gray)),
        vertical[2],
    );

    render_overlay(frame, state);
}

fn render_images(frame: &mut Frame, state: &AppState, area: Rect) {
    let shown = MAX_IMAGE_ROWS as usize;
    let mut lines: Vec<Line<'static>> = state
        .images
        .iter()
        .take(shown)
        .enumerate()
        .map(|(idx, image)| Line::from(format!("{}. {}", idx + 1, describe_image(image))))
        .collect();
    if state.images.len() > shown {
        if let Some(last) = lines.last_mut() {
            *last = Line::from(Span::styled(
                format!("… and {} more", state.images.len() - shown + 1),
                Style::default().fg(Color::Gray),
            ));
        }
    }
    let block = Block::default()
        .title(format!("Images ({})", state.images.len()))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Gray));
    frame.render_widget(Paragraph::new(lines).block(block), area);
}

fn describe_image(reference: &str) -> String {
    if is_data_uri(reference) {
        let mime = reference
            .strip_prefix("data:")
            .and_then(|rest| rest.split(';').next())
            .unwrap_or("image");
        let payload = reference.split_once(',').map_or(0, |(_, data)| data.len());
        format!("embedded {mime}, {} KiB", (payload * 3 / 4).div_ceil(1024))
    } else {
        reference.to_string()
    }
}

fn build_status_line(state: &AppState) -> Text<'static> {
    let editor = state.editor();
    let chars = editor.buffer().chars().count();
    let mut spans = vec![
        Span::styled(format!("{chars} chars"), Style::default().add_modifier(Modifier::BOLD)),
        Span::raw(format!(" | {} image(s)", state.images.len())),
    ];
    if let Some(range) = editor.selection_range() {
        let selected = editor.buffer()[range].chars().count();
        spans.push(Span::raw(format!(" | {selected} selected")));
    }
    if !state.wrap_enabled {
        spans.push(Span::raw(" | nowrap"));
    }
    if let Some(message) = &state.status_message {
        spans.push(Span::raw(" | "));
        spans.push(Span::styled(
            message.clone(),
            Style::default().fg(Color::Yellow),
        ));
    }

    let hints = KEY_HINTS
        .iter()
        .map(|(key, label)| format!("{key} {label}"))
        .collect::<Vec<_>>()
        .join("  ");
    Text::from(vec![
        Line::from(spans),
        Line::from(Span::styled(hints, Style::default().fg(Color::DarkGray))),
    ])
}

/// Splits the buffer into display lines, rendering the selected byte range
/// reversed.
fn selection_lines(buffer: &str, selection: Option<Range<usize>>) -> Vec<Line<'static>> {
    let selected = Style::default().add_modifier(Modifier::REVERSED);
    let mut lines = Vec::new();
    let mut offset = 0;
    for line in buffer.split('\n') {
        let start = offset;
        let end = start + line.len();
        offset = end + 1;

        let Some(range) = selection
            .as_ref()
            .filter(|range| range.start < end && range.end > start)
        else {
            lines.push(Line::from(line.to_string()));
            continue;
        };
        let from = range.start.max(start) - start;
        let to = range.end.min(end) - start;
        let mut spans = Vec::with_capacity(3);
        if from > 0 {
            spans.push(Span::raw(line[..from].to_string()));
        }
        spans.push(Span::styled(line[from..to].to_string(), selected));
        if to < line.len() {
            spans.push(Span::raw(line[to..].to_string()));
        }
        lines.push(Line::from(spans));
    }
    lines
}

/// Caret position relative to the inside of `area`, as (column, row).
/// The row is not clamped; the caller scrolls to keep it visible.
fn editor_cursor_screen_position(
    editor: &EditorState,
    area: Rect,
    wrap_enabled: bool,
) -> Option<(u16, u16)> {
    let inner_width = area.width.saturating_sub(2);
    let inner_height = area.height.saturating_sub(2);
    if inner_width == 0 || inner_height == 0 {
        return None;
    }

    let width_limit = inner_width as usize;
    let buffer = editor.buffer();
    let cursor = editor.cursor().min(buffer.len());
    let mut row = 0usize;
    let mut col = 0usize;
    for grapheme in buffer[..cursor].graphemes(true) {
        if grapheme == "\n" {
            row += 1;
            col = 0;
            continue;
        }
        let glyph_width = UnicodeWidthStr::width(grapheme);
        if wrap_enabled && glyph_width > 0 && col + glyph_width > width_limit {
            row += 1;
            col = 0;
        }
        col += glyph_width;
    }

    let col = col.min(width_limit - 1) as u16;
    let row = u16::try_from(row).unwrap_or(u16::MAX);
    Some((col, row))
}

fn render_overlay(frame: &mut Frame, state: &AppState) {
    match state.overlay() {
        None => {}
        Some(OverlayState::Info) => {
            let area = centered_rect(70, 60, frame.size());
            frame.render_widget(Clear, area);
            let mut lines = vec![
                Line::from(Span::styled(
                    "notebeam",
                    Style::default().add_modifier(Modifier::BOLD),
                )),
                Line::from(""),
                Line::from("Write a note here, then press Ctrl-T to show it as a QR code."),
                Line::from("Scan it with your phone: the whole note travels inside the link,"),
                Line::from("nothing is uploaded anywhere. Large images are left out if the"),
                Line::from("link would get too long to scan."),
                Line::from(""),
            ];
            lines.extend(KEY_HINTS.iter().map(|(key, label)| {
                Line::from(vec![
                    Span::styled(format!("{key:>6} "), Style::default().fg(Color::Cyan)),
                    Span::raw(*label),
                ])
            }));
            lines.push(Line::from(""));
            lines.push(Line::from(Span::styled(
                "Enter to start • Ctrl-G shows this again",
                Style::default().fg(Color::Gray),
            )));
            let paragraph = Paragraph::new(lines)
                .block(
                    Block::default()
                        .title("Welcome")
                        .borders(Borders::ALL)
                        .border_style(Style::default().fg(Color::Cyan)),
                )
                .wrap(Wrap { trim: false });
            frame.render_widget(paragraph, area);
        }
        Some(OverlayState::Transfer(transfer)) => render_transfer(frame, transfer),
        Some(OverlayState::AttachPrompt(prompt)) => {
            let area = centered_rect(70, 30, frame.size());
            frame.render_widget(Clear, area);
            let mut input_display = prompt.input.clone();
            input_display.push('▌');
            let paragraph = Paragraph::new(vec![
                Line::from(Span::styled(
                    "Attach image",
                    Style::default().add_modifier(Modifier::BOLD),
                )),
                Line::from(Span::styled(
                    "File path, http(s) URL or data: URI",
                    Style::default().fg(Color::Gray),
                )),
                Line::from(""),
                Line::from(input_display),
                Line::from(""),
                Line::from(Span::styled(
                    "Enter to attach • Esc to cancel",
                    Style::default().fg(Color::Gray),
                )),
            ])
            .block(
                Block::default()
                    .title("Attach")
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(Color::Cyan)),
            )
            .wrap(Wrap { trim: false });
            frame.render_widget(paragraph, area);
        }
        Some(OverlayState::ConfirmClear) => {
            let area = centered_rect(50, 25, frame.size());
            frame.render_widget(Clear, area);
            let paragraph = Paragraph::new(vec![
                Line::from(Span::styled(
                    "Clear the note and all attached images?",
                    Style::default().add_modifier(Modifier::BOLD),
                )),
                Line::from(""),
                Line::from(Span::styled(
                    "y to clear • n or Esc to keep",
                    Style::default().fg(Color::Gray),
                )),
            ])
            .block(
                Block::default()
                    .title("Clear")
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(Color::Red)),
            )
            .wrap(Wrap { trim: false });
            frame.render_widget(paragraph, area);
        }
    }
}

fn render_transfer(frame: &mut Frame, transfer: &TransferOverlay) {
    let screen = frame.size();
    let mut lines: Vec<Line<'static>> = Vec::new();
    let (qr_rows, qr_cols) = transfer.qr.as_deref().map(qr_extent).unwrap_or((0, 0));
    let fits = qr_rows + 6 <= screen.height && qr_cols + 2 <= screen.width;

    match transfer.qr.as_deref() {
        Some(qr) if fits => lines.extend(qr.lines().map(|row| Line::from(row.to_string()))),
        Some(_) => lines.push(Line::from(Span::styled(
            format!("Enlarge the terminal to at least {}x{} to scan", qr_cols + 2, qr_rows + 6),
            Style::default().fg(Color::Yellow),
        ))),
        None => {}
    }

    let summary_style = if transfer.url.is_some() {
        Style::default().fg(Color::Green)
    } else {
        Style::default().fg(Color::Red).add_modifier(Modifier::BOLD)
    };
    lines.push(Line::from(Span::styled(transfer.summary.clone(), summary_style)));
    for skipped in &transfer.skipped {
        lines.push(Line::from(Span::styled(
            format!("skipped {skipped}"),
            Style::default().fg(Color::Yellow),
        )));
    }
    lines.push(Line::from(Span::styled(
        if transfer.url.is_some() {
            "c to copy link • Esc to close"
        } else {
            "Esc to close"
        },
        Style::default().fg(Color::Gray),
    )));

    let width = if fits {
        qr_cols.saturating_add(2).max(44)
    } else {
        60
    }
    .min(screen.width);
    let height = (lines.len() as u16).saturating_add(2).min(screen.height);
    let area = Rect {
        x: screen.x + (screen.width - width) / 2,
        y: screen.y + (screen.height - height) / 2,
        width,
        height,
    };
    frame.render_widget(Clear, area);
    let paragraph = Paragraph::new(lines).block(
        Block::default()
            .title("Transfer")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan)),
    );
    frame.render_widget(paragraph, area);
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(vertical[1])[1]
}
