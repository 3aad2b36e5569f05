use std::sync::Arc;

use anyhow::{Context, Result};

use crate::config::AppConfig;
use crate::images::SourceFetcher;
use crate::note::Note;
use crate::storage::NoteStore;
use crate::sync::{self, EncodeReport, SyncEncoder};
use crate::transform::{self, TextDocument, Transform, TransformOutcome};

/// What happened to a transfer link handed to [`NoteSession::open_link`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpenOutcome {
    /// The link's note replaced the stored one.
    Installed { base: String },
    /// The link could not be decoded; the stored note stays.
    KeptStored { base: String },
}

impl OpenOutcome {
    /// The link without its fragment.
    pub fn base(&self) -> &str {
        match self {
            OpenOutcome::Installed { base } | OpenOutcome::KeptStored { base } => base,
        }
    }
}

/// The note being edited together with the store it is mirrored into.
/// Every mutating call persists before returning.
pub struct NoteSession {
    store: NoteStore,
    config: Arc<AppConfig>,
    note: Note,
}

impl NoteSession {
    pub fn open(store: NoteStore, config: Arc<AppConfig>) -> Result<Self> {
        let note = store.load().context("loading stored note")?;
        Ok(Self {
            store,
            config,
            note,
        })
    }

    pub fn note(&self) -> &Note {
        &self.note
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn store(&self) -> &NoteStore {
        &self.store
    }

    pub fn set_text(&mut self, text: &str) -> Result<()> {
        if self.note.text == text {
            return Ok(());
        }
        let mut next = self.note.clone();
        next.text = text.to_string();
        self.commit(next)
    }

    pub fn replace_note(&mut self, note: Note) -> Result<()> {
        self.commit(note)
    }

    pub fn append(&mut self, text: &str) -> Result<()> {
        let mut next = self.note.clone();
        next.append_text(text);
        self.commit(next)
    }

    /// Returns false when the reference was blank and nothing was attached.
    pub fn attach_image(&mut self, reference: &str) -> Result<bool> {
        let mut next = self.note.clone();
        next.attach_image(reference);
        if next.images.len() == self.note.images.len() {
            return Ok(false);
        }
        self.commit(next)?;
        Ok(true)
    }

    pub fn clear(&mut self) -> Result<()> {
        self.store.clear().context("clearing stored note")?;
        self.note.clear();
        Ok(())
    }

    /// Runs a transform over the whole note text. Case conversion needs a
    /// selection, which a session does not have, so it reports
    /// [`TransformOutcome::NeedsSelection`] here.
    pub fn apply_transform(&mut self, transform: Transform) -> Result<TransformOutcome> {
        let mut doc = TextDocument::new(self.note.text.clone());
        let outcome = transform::apply(&mut doc, transform);
        if outcome == TransformOutcome::Applied {
            let mut next = self.note.clone();
            next.text = doc.into_text();
            self.commit(next)?;
        }
        Ok(outcome)
    }

    /// Installs the note carried by `link`. A link that does not decode is
    /// not an error: the stored note is kept and the failure only logged.
    pub fn open_link(&mut self, link: &str) -> Result<OpenOutcome> {
        let base = sync::strip_fragment(link).to_string();
        match sync::decode_link(link) {
            Ok(note) => {
                tracing::info!(
                    chars = note.text.chars().count(),
                    images = note.images.len(),
                    "installed note from transfer link"
                );
                self.replace_note(note)?;
                Ok(OpenOutcome::Installed { base })
            }
            Err(err) => {
                tracing::debug!(%err, "transfer link ignored, keeping stored note");
                Ok(OpenOutcome::KeptStored { base })
            }
        }
    }

    pub fn show_info(&self) -> Result<bool> {
        Ok(self.config.editor.show_info_on_start && !self.store.info_seen()?)
    }

    pub fn dismiss_info(&self) -> Result<()> {
        self.store.mark_info_seen()
    }

    pub fn encoder(&self) -> Result<SyncEncoder<SourceFetcher>> {
        let fetcher = SourceFetcher::new(self.config.transfer.fetch_timeout())
            .context("building image fetcher")?;
        Ok(SyncEncoder::from_options(fetcher, &self.config.transfer))
    }

    /// Builds the transfer link for the current note.
    pub fn prepare_transfer(&self) -> Result<EncodeReport> {
        let encoder = self.encoder()?;
        encoder
            .encode(&self.note)
            .context("encoding note for transfer")
    }

    /// Saves `next`, then makes it the session's note. A failed save leaves
    /// the session as it was.
    fn commit(&mut self, next: Note) -> Result<()> {
        self.store.save(&next).context("saving note")?;
        self.note = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigPaths;
    use crate::storage;
    use crate::sync::{wire, EncodeStatus, TransferPayload};
    use crate::transform::Case;
    use assert_matches::assert_matches;
    use tempfile::TempDir;

    fn open_session() -> anyhow::Result<(TempDir, NoteSession)> {
        let temp = TempDir::new()?;
        let paths = ConfigPaths::under(temp.path());
        paths.ensure_directories()?;
        let config = AppConfig::default();
        let handle = storage::init(&paths, &config.storage)?;
        let session = NoteSession::open(NoteStore::new(handle), Arc::new(config))?;
        Ok((temp, session))
    }

    #[test]
    fn mutations_are_persisted_immediately() -> anyhow::Result<()> {
        let (_temp, mut session) = open_session()?;
        session.append("first")?;
        session.append("second")?;
        assert!(session.attach_image("data:image/png;base64,AAAA")?);
        assert!(!session.attach_image("  ")?);
        assert_eq!(
            session.store().load()?,
            Note::new("first\nsecond", vec!["data:image/png;base64,AAAA".into()])
        );

        session.clear()?;
        assert!(session.store().load()?.is_empty());
        Ok(())
    }

    #[test]
    fn failed_writes_leave_session_note_unchanged() -> anyhow::Result<()> {
        let (_temp, mut session) = open_session()?;
        session.set_text("keep me")?;
        session
            .store()
            .handle()
            .with_connection(|conn| Ok(conn.execute_batch("DROP TABLE slots")?))?;

        assert!(session.clear().is_err());
        assert!(session.append("more").is_err());
        assert!(session.set_text("changed").is_err());
        assert_eq!(session.note(), &Note::from_text("keep me"));
        Ok(())
    }

    #[test]
    fn transforms_save_only_when_applied() -> anyhow::Result<()> {
        let (_temp, mut session) = open_session()?;
        session.set_text("milk\neggs")?;
        assert_eq!(
            session.apply_transform(Transform::Bullets)?,
            TransformOutcome::Applied
        );
        assert_eq!(session.store().load()?.text, "• milk\n• eggs");
        assert_eq!(
            session.apply_transform(Transform::Case(Case::Upper))?,
            TransformOutcome::NeedsSelection
        );
        assert_eq!(session.note().text, "• milk\n• eggs");
        Ok(())
    }

    #[test]
    fn transfer_link_round_trips_through_another_session() -> anyhow::Result<()> {
        let (_temp, mut sender) = open_session()?;
        sender.set_text("from laptop")?;
        let report = sender.prepare_transfer()?;
        assert_matches!(report.status, EncodeStatus::Ok { .. });

        let (_other, mut receiver) = open_session()?;
        let outcome = receiver.open_link(report.status.url().unwrap_or_default())?;
        assert_matches!(outcome, OpenOutcome::Installed { .. });
        assert_eq!(receiver.note().text, "from laptop");
        Ok(())
    }

    #[test]
    fn valid_link_replaces_stored_note() -> anyhow::Result<()> {
        let (_temp, mut session) = open_session()?;
        session.set_text("local draft")?;

        let payload = TransferPayload::new("from phone", Vec::new());
        let link = format!("https://notebeam.app/#{}", wire::pack(&payload)?);

        let outcome = session.open_link(&link)?;
        assert_eq!(outcome.base(), "https://notebeam.app/");
        assert_matches!(outcome, OpenOutcome::Installed { .. });
        assert_eq!(session.note().text, "from phone");
        assert_eq!(session.store().load()?.text, "from phone");
        Ok(())
    }

    #[test]
    fn corrupt_link_keeps_stored_note() -> anyhow::Result<()> {
        let (_temp, mut session) = open_session()?;
        session.set_text("keep me")?;
        for link in [
            "https://notebeam.app/#data=!!!!",
            "https://notebeam.app/#zip=abc",
            "https://notebeam.app/",
        ] {
            let outcome = session.open_link(link)?;
            assert_eq!(
                outcome,
                OpenOutcome::KeptStored {
                    base: "https://notebeam.app/".to_string()
                }
            );
        }
        assert_eq!(session.store().load()?.text, "keep me");
        Ok(())
    }

    #[test]
    fn info_dialog_shows_until_dismissed() -> anyhow::Result<()> {
        let (_temp, session) = open_session()?;
        assert!(session.show_info()?);
        session.dismiss_info()?;
        assert!(!session.show_info()?);
        Ok(())
    }
}
