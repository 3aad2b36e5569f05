//! Ways a finished transfer link leaves the process: a terminal QR code,
//! the system clipboard, or plain stdout.

use qrcode::render::unicode::Dense1x2;
use qrcode::types::QrError;
use qrcode::{EcLevel, QrCode};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ShareError {
    #[error("link does not fit in a QR symbol: {0}")]
    Qr(#[from] QrError),
    #[error("clipboard unavailable: {0}")]
    Clipboard(#[from] arboard::Error),
}

/// Renders `url` as a block-character QR code, two modules per text row.
/// Colours are inverted so the code reads correctly on dark terminals.
pub fn render_qr(url: &str, quiet_zone: bool) -> Result<String, ShareError> {
    let code = QrCode::with_error_correction_level(url.as_bytes(), EcLevel::L)?;
    Ok(code
        .render::<Dense1x2>()
        .dark_color(Dense1x2::Light)
        .light_color(Dense1x2::Dark)
        .quiet_zone(quiet_zone)
        .build())
}

/// Number of text rows and columns a rendered code occupies.
pub fn qr_extent(rendered: &str) -> (u16, u16) {
    let rows = rendered.lines().count();
    let cols = rendered
        .lines()
        .map(|line| line.chars().count())
        .max()
        .unwrap_or(0);
    (
        u16::try_from(rows).unwrap_or(u16::MAX),
        u16::try_from(cols).unwrap_or(u16::MAX),
    )
}

pub fn copy_to_clipboard(text: &str) -> Result<(), ShareError> {
    let mut clipboard = arboard::Clipboard::new()?;
    clipboard.set_text(text.to_string())?;
    tracing::debug!(chars = text.len(), "copied link to clipboard");
    Ok(())
}
