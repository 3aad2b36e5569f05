use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use time::OffsetDateTime;

use crate::config::{ConfigPaths, StorageOptions};
use crate::note::Note;
use crate::transform::markup;

mod schema;

pub const SLOT_NOTE: &str = "note";
pub const SLOT_LEGACY_TEXT: &str = "note_text";
pub const SLOT_LEGACY_IMAGES: &str = "note_images";
pub const SLOT_INFO_SEEN: &str = "info_seen";

#[derive(Debug, Clone, Copy)]
pub struct WalCheckpointStats {
    pub busy_frames: i64,
    pub wal_frames: i64,
    pub checkpointed_frames: i64,
}

/// Cheap-to-clone handle onto the key-value slot database.
#[derive(Clone)]
pub struct StorageHandle {
    db_path: Arc<PathBuf>,
    options: Arc<StorageOptions>,
}

impl StorageHandle {
    pub fn connect(&self) -> Result<Connection> {
        let conn = Connection::open(&*self.db_path)
            .with_context(|| format!("opening database {}", self.db_path.display()))?;
        prepare_connection(&conn, &self.options)?;
        Ok(conn)
    }

    pub fn with_connection<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.connect()?;
        f(&conn)
    }

    /// Runs `f` inside a transaction that commits only when `f` succeeds.
    pub fn with_transaction<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let mut conn = self.connect()?;
        let tx = conn.transaction().context("starting transaction")?;
        let value = f(&tx)?;
        tx.commit().context("committing transaction")?;
        Ok(value)
    }

    pub fn run_wal_health_check(&self) -> Result<WalCheckpointStats> {
        self.with_connection(|conn| {
            let mut stmt = conn
                .prepare("PRAGMA wal_checkpoint(PASSIVE)")
                .context("preparing wal checkpoint pragma")?;
            let mut rows = stmt.query([]).context("executing wal checkpoint pragma")?;
            if let Some(row) = rows.next()? {
                Ok(WalCheckpointStats {
                    busy_frames: row.get(0)?,
                    wal_frames: row.get(1)?,
                    checkpointed_frames: row.get(2)?,
                })
            } else {
                bail!("wal checkpoint returned no rows");
            }
        })
    }

    pub fn get(&self, key: &str) -> Result<Option<String>> {
        self.with_connection(|conn| read_slot(conn, key))
    }

    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        self.with_connection(|conn| write_slot(conn, key, value))
    }

    pub fn remove(&self, key: &str) -> Result<bool> {
        self.with_connection(|conn| delete_slot(conn, key))
    }
}

fn read_slot(conn: &Connection, key: &str) -> Result<Option<String>> {
    conn.query_row(
        "SELECT value FROM slots WHERE key = ?1",
        params![key],
        |row| row.get::<_, String>(0),
    )
    .optional()
    .with_context(|| format!("reading slot '{key}'"))
}

fn write_slot(conn: &Connection, key: &str, value: &str) -> Result<()> {
    let now = OffsetDateTime::now_utc().unix_timestamp();
    conn.execute(
        "INSERT INTO slots (key, value, updated_at) VALUES (?1, ?2, ?3)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        params![key, value, now],
    )
    .with_context(|| format!("writing slot '{key}'"))?;
    Ok(())
}

fn delete_slot(conn: &Connection, key: &str) -> Result<bool> {
    let removed = conn
        .execute("DELETE FROM slots WHERE key = ?1", params![key])
        .with_context(|| format!("deleting slot '{key}'"))?;
    Ok(removed > 0)
}

/// Persistence adapter for the one note this app keeps.
///
/// Writes always go to the unified `note` slot. Older layouts (a raw markup
/// body in `note`, or the `note_text` + `note_images` pair) are converted
/// the first time they are loaded and never written again.
#[derive(Clone)]
pub struct NoteStore {
    handle: StorageHandle,
}

impl NoteStore {
    pub fn new(handle: StorageHandle) -> Self {
        Self { handle }
    }

    pub fn handle(&self) -> &StorageHandle {
        &self.handle
    }

    pub fn save(&self, note: &Note) -> Result<()> {
        let json = serde_json::to_string(note).context("serialising note")?;
        self.handle.set(SLOT_NOTE, &json)
    }

    pub fn clear(&self) -> Result<()> {
        self.save(&Note::default())
    }

    pub fn load(&self) -> Result<Note> {
        if let Some(raw) = self.handle.get(SLOT_NOTE)? {
            return self.load_unified(&raw);
        }
        self.migrate_legacy_slots()
    }

    pub fn info_seen(&self) -> Result<bool> {
        Ok(self.handle.get(SLOT_INFO_SEEN)?.is_some())
    }

    pub fn mark_info_seen(&self) -> Result<()> {
        self.handle.set(SLOT_INFO_SEEN, "1")
    }

    fn load_unified(&self, raw: &str) -> Result<Note> {
        if raw.trim_start().starts_with('{') {
            match serde_json::from_str::<Note>(raw) {
                Ok(note) => return Ok(note),
                Err(err) => {
                    tracing::warn!(?err, "note slot is not valid JSON, reading it as markup");
                }
            }
        }
        let note = markup::extract(raw);
        tracing::info!(
            images = note.images.len(),
            "migrating markup note body to unified slot"
        );
        self.save(&note)?;
        Ok(note)
    }

    fn migrate_legacy_slots(&self) -> Result<Note> {
        self.handle.with_transaction(|conn| {
            let text = read_slot(conn, SLOT_LEGACY_TEXT)?;
            let images_raw = read_slot(conn, SLOT_LEGACY_IMAGES)?;
            if text.is_none() && images_raw.is_none() {
                return Ok(Note::default());
            }

            // An unreadable image list stays in its slot; only what migrated
            // is removed.
            let (images, images_migrated) = match images_raw.as_deref() {
                Some(raw) => match serde_json::from_str::<Vec<String>>(raw) {
                    Ok(images) => (images, true),
                    Err(err) => {
                        tracing::warn!(?err, "legacy image list is unreadable, leaving it in place");
                        (Vec::new(), false)
                    }
                },
                None => (Vec::new(), true),
            };
            let note = Note::new(text.unwrap_or_default(), images);
            let json = serde_json::to_string(&note).context("serialising migrated note")?;
            write_slot(conn, SLOT_NOTE, &json)?;
            delete_slot(conn, SLOT_LEGACY_TEXT)?;
            if images_migrated {
                delete_slot(conn, SLOT_LEGACY_IMAGES)?;
            }
            tracing::info!(
                images = note.images.len(),
                "migrated legacy text/image slots into unified note"
            );
            Ok(note)
        })
    }
}

pub fn init(paths: &ConfigPaths, storage: &StorageOptions) -> Result<StorageHandle> {
    let db_path = if storage.database_path.as_os_str().is_empty() {
        &paths.database_path
    } else {
        &storage.database_path
    };
    if let Some(parent) = db_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating data directory {}", parent.display()))?;
    }
    let conn = Connection::open(db_path)
        .with_context(|| format!("opening database {}", db_path.display()))?;
    prepare_connection(&conn, storage)?;
    schema::apply(&conn)?;
    Ok(StorageHandle {
        db_path: Arc::new(db_path.clone()),
        options: Arc::new(storage.clone()),
    })
}

fn prepare_connection(conn: &Connection, storage: &StorageOptions) -> Result<()> {
    conn.pragma_update(None, "journal_mode", "WAL")
        .context("setting journal_mode=WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")
        .context("setting synchronous=NORMAL")?;
    conn.pragma_update(
        None,
        "wal_autocheckpoint",
        storage.wal_autocheckpoint.to_string(),
    )
    .context("setting wal_autocheckpoint")?;
    Ok(())
}
