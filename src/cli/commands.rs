use std::io::{self, Read};

use anyhow::{bail, Context, Result};
use clap::{Args, ValueEnum};

use crate::app::App;
use crate::note::{is_data_uri, Note};
use crate::session::{NoteSession, OpenOutcome};
use crate::share;
use crate::sync::EncodeStatus;
use crate::transform::{Transform, TransformOutcome};

#[derive(Args, Debug, Clone)]
pub struct ShowArgs {
    /// Print the stored JSON form instead of plain text
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct AppendArgs {
    /// Text to append. If omitted, reads from stdin.
    #[arg()]
    pub text: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct AttachArgs {
    /// File path, http(s) URL or data: URI
    pub reference: String,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatKind {
    /// Trim lines and collapse blank runs
    Cleanup,
    /// Put a bullet in front of every line
    Bullets,
}

impl From<FormatKind> for Transform {
    fn from(kind: FormatKind) -> Self {
        match kind {
            FormatKind::Cleanup => Transform::Cleanup,
            FormatKind::Bullets => Transform::Bullets,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct FormatArgs {
    #[arg(value_enum)]
    pub kind: FormatKind,
}

#[derive(Args, Debug, Clone)]
pub struct ShareArgs {
    /// Copy the link to the clipboard
    #[arg(long)]
    pub copy: bool,
    /// Print only the link, without the QR code
    #[arg(long)]
    pub no_qr: bool,
}

#[derive(Args, Debug, Clone)]
pub struct OpenArgs {
    /// Full transfer link, or just its `#...` fragment
    pub link: String,
}

pub fn run_tui(session: NoteSession) -> Result<()> {
    let mut app = App::new(session)?;
    app.run()
}

pub fn show_note(session: &NoteSession, args: ShowArgs) -> Result<()> {
    let note = session.note();
    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(note).context("serialising note")?
        );
        return Ok(());
    }
    print!("{}", render_note(note));
    Ok(())
}

pub fn append_text(session: &mut NoteSession, args: AppendArgs) -> Result<()> {
    let text = match args.text {
        Some(text) => text,
        None => read_stdin()?.unwrap_or_default(),
    };
    let text = text.trim_end_matches('\n');
    if text.is_empty() {
        bail!("nothing to append");
    }
    session.append(text)?;
    println!("Note now has {} chars", session.note().text.chars().count());
    Ok(())
}

pub fn attach_image(session: &mut NoteSession, args: AttachArgs) -> Result<()> {
    if !session.attach_image(&args.reference)? {
        bail!("image reference cannot be empty");
    }
    println!(
        "Attached image #{} ({})",
        session.note().images.len(),
        if is_data_uri(args.reference.trim()) {
            "embedded"
        } else {
            "embedded at transfer time"
        }
    );
    Ok(())
}

pub fn clear_note(session: &mut NoteSession) -> Result<()> {
    session.clear()?;
    println!("Note cleared");
    Ok(())
}

pub fn format_note(session: &mut NoteSession, args: FormatArgs) -> Result<()> {
    let transform = Transform::from(args.kind);
    let outcome = session.apply_transform(transform)?;
    println!("{}", outcome.message(transform));
    if outcome == TransformOutcome::Applied {
        print!("{}", render_note(session.note()));
    }
    Ok(())
}

pub fn share_note(session: &NoteSession, args: ShareArgs) -> Result<()> {
    let report = session.prepare_transfer()?;
    for skipped in &report.skipped_images {
        eprintln!("skipped image {}: {}", skipped.reference, skipped.reason);
    }
    let url = match &report.status {
        EncodeStatus::Ok { url } | EncodeStatus::Degraded { url, .. } => url,
        EncodeStatus::TooLarge { .. } => bail!(report.status.summary()),
    };

    if !args.no_qr {
        let quiet_zone = session.config().transfer.qr_quiet_zone;
        print!("{}", share::render_qr(url, quiet_zone)?);
        println!();
    }
    println!("{url}");
    eprintln!("{}", report.status.summary());

    if args.copy {
        match share::copy_to_clipboard(url) {
            Ok(()) => eprintln!("Copied link to clipboard"),
            Err(err) => eprintln!("Could not copy link: {err}"),
        }
    }
    Ok(())
}

pub fn open_link(session: &mut NoteSession, args: OpenArgs) -> Result<()> {
    let link = args.link.trim();
    let link = if link.starts_with('#') {
        format!("{}{link}", session.config().transfer.base_url)
    } else {
        link.to_string()
    };
    match session.open_link(&link)? {
        OpenOutcome::Installed { base } => {
            println!("Loaded note from {base}");
            print!("{}", render_note(session.note()));
        }
        OpenOutcome::KeptStored { base } => {
            println!("Could not read a note from {base}; kept the stored note");
        }
    }
    Ok(())
}

fn render_note(note: &Note) -> String {
    let mut out = String::with_capacity(note.text.len() + 64);
    out.push_str(&note.text);
    if !note.text.is_empty() && !note.text.ends_with('\n') {
        out.push('\n');
    }
    for (idx, image) in note.images.iter().enumerate() {
        let label = if is_data_uri(image) {
            format!("embedded image, {} chars", image.len())
        } else {
            image.clone()
        };
        out.push_str(&format!("[image {}] {label}\n", idx + 1));
    }
    out
}

fn read_stdin() -> Result<Option<String>> {
    if atty::is(atty::Stream::Stdin) {
        return Ok(None);
    }
    let mut buf = String::new();
    io::stdin()
        .read_to_string(&mut buf)
        .context("reading stdin")?;
    Ok(Some(buf))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_note_lists_images_after_text() {
        let note = Note::new(
            "line",
            vec![
                "data:image/png;base64,AAAA".to_string(),
                "https://img.test/a.png".to_string(),
            ],
        );
        assert_eq!(
            render_note(&note),
            "line\n[image 1] embedded image, 26 chars\n[image 2] https://img.test/a.png\n"
        );
        assert_eq!(render_note(&Note::default()), "");
    }

    #[test]
    fn format_kinds_map_to_document_transforms() {
        assert_eq!(Transform::from(FormatKind::Cleanup), Transform::Cleanup);
        assert_eq!(Transform::from(FormatKind::Bullets), Transform::Bullets);
    }
}
