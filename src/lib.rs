pub mod app;
pub mod cli;
pub mod config;
pub mod images;
pub mod note;
pub mod session;
pub mod share;
pub mod storage;
pub mod sync;
pub mod transform;
pub mod ui;

pub use config::{AppConfig, ConfigLoader, ConfigPaths};
pub use note::Note;
pub use session::{NoteSession, OpenOutcome};
