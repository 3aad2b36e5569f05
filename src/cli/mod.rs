use std::env;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use once_cell::sync::OnceCell;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::{ConfigLoader, CONFIG_ENV, DATA_ENV};
use crate::session::NoteSession;
use crate::storage::{self, NoteStore};

pub mod commands;

use self::commands::{AppendArgs, AttachArgs, FormatArgs, OpenArgs, ShareArgs, ShowArgs};

#[derive(Parser, Debug)]
#[command(
    name = "notebeam",
    version,
    about = "Scratch note editor that beams the note to your phone as a QR link"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Override the config file location (takes precedence over NOTEBEAM_CONFIG)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Override the data directory (takes precedence over NOTEBEAM_DATA)
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Minimum log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Launch the interactive editor (default)
    Tui,
    /// Print the stored note
    Show(ShowArgs),
    /// Append a line of text to the note (reads stdin when omitted)
    Append(AppendArgs),
    /// Attach an image by path, URL or data URI
    Attach(AttachArgs),
    /// Empty the note
    Clear,
    /// Rewrite the whole note with a text transform
    Format(FormatArgs),
    /// Build the transfer link and show it as a QR code
    Share(ShareArgs),
    /// Load the note carried by a transfer link
    Open(OpenArgs),
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    if let Some(path) = &cli.config {
        env::set_var(CONFIG_ENV, path);
    }
    if let Some(path) = &cli.data_dir {
        env::set_var(DATA_ENV, path);
    }

    let loader = ConfigLoader::discover()?;
    loader.paths().ensure_directories()?;
    let paths = loader.paths().clone();
    let command = cli.command.unwrap_or(Commands::Tui);

    // The TUI owns the terminal, so its logs go to a file.
    let log_file = matches!(command, Commands::Tui).then(|| paths.log_file());
    init_tracing(&cli.log_level, log_file.as_deref())
        .with_context(|| format!("initialising logging at level {}", cli.log_level))?;

    let config = Arc::new(loader.load_or_init()?);
    let handle = storage::init(&paths, &config.storage)?;
    if let Err(err) = handle.run_wal_health_check() {
        tracing::warn!(?err, "wal checkpoint failed");
    }
    let mut session = NoteSession::open(NoteStore::new(handle), config)?;

    match command {
        Commands::Tui => commands::run_tui(session),
        Commands::Show(args) => commands::show_note(&session, args),
        Commands::Append(args) => commands::append_text(&mut session, args),
        Commands::Attach(args) => commands::attach_image(&mut session, args),
        Commands::Clear => commands::clear_note(&mut session),
        Commands::Format(args) => commands::format_note(&mut session, args),
        Commands::Share(args) => commands::share_note(&session, args),
        Commands::Open(args) => commands::open_link(&mut session, args),
    }
}

fn init_tracing(level: &str, log_file: Option<&Path>) -> Result<()> {
    static INIT: OnceCell<()> = OnceCell::new();
    INIT.get_or_try_init(|| {
        let env_filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
        match log_file {
            Some(path) => {
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .with_context(|| format!("opening log file {}", path.display()))?;
                fmt()
                    .with_env_filter(env_filter)
                    .with_ansi(false)
                    .with_writer(Mutex::new(file))
                    .init();
            }
            None => {
                fmt()
                    .with_env_filter(env_filter)
                    .with_writer(std::io::stderr)
                    .init();
            }
        }
        Ok::<(), anyhow::Error>(())
    })
    .map(|_| ())
}
