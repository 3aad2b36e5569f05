use std::env;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

const APP_DOMAIN: &str = "app";
const APP_ORG: &str = "Notebeam";
const APP_NAME: &str = "notebeam";

pub const CONFIG_ENV: &str = "NOTEBEAM_CONFIG";
pub const DATA_ENV: &str = "NOTEBEAM_DATA";

const MIN_IMAGE_DIMENSION: u32 = 32;
const MAX_IMAGE_DIMENSION: u32 = 4096;

pub struct ConfigLoader {
    paths: ConfigPaths,
}

impl ConfigLoader {
    pub fn discover() -> Result<Self> {
        let paths = ConfigPaths::discover()?;
        Ok(Self { paths })
    }

    pub fn with_paths(paths: ConfigPaths) -> Self {
        Self { paths }
    }

    pub fn paths(&self) -> &ConfigPaths {
        &self.paths
    }

    pub fn load_or_init(&self) -> Result<AppConfig> {
        self.paths.ensure_directories()?;
        if !self.paths.config_file.exists() {
            let mut default_cfg = AppConfig::default();
            default_cfg.post_load(&self.paths)?;
            self.write_default_config(&default_cfg)?;
            return Ok(default_cfg);
        }

        self.load()
    }

    pub fn load(&self) -> Result<AppConfig> {
        let raw = fs::read_to_string(&self.paths.config_file)
            .with_context(|| format!("reading config {}", self.paths.config_file.display()))?;
        let mut cfg: AppConfig = toml::from_str(&raw).context("parsing config toml")?;
        cfg.post_load(&self.paths)?;
        Ok(cfg)
    }

    fn write_default_config(&self, cfg: &AppConfig) -> Result<()> {
        let toml = toml::to_string_pretty(cfg).context("serializing default config")?;
        if let Some(parent) = self.paths.config_file.parent() {
            fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
        }
        let mut file = fs::File::create(&self.paths.config_file)
            .with_context(|| format!("creating config {}", self.paths.config_file.display()))?;
        file.write_all(toml.as_bytes())
            .context("writing default config")?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ConfigPaths {
    pub config_dir: PathBuf,
    pub config_file: PathBuf,
    pub data_dir: PathBuf,
    pub database_path: PathBuf,
    pub log_dir: PathBuf,
    pub state_dir: PathBuf,
}

impl ConfigPaths {
    pub fn discover() -> Result<Self> {
        let override_config = env::var(CONFIG_ENV).ok().map(PathBuf::from);
        let override_data = env::var(DATA_ENV).ok().map(PathBuf::from);

        let project_dirs = ProjectDirs::from(APP_DOMAIN, APP_ORG, APP_NAME)
            .context("resolving XDG project directories")?;

        let config_dir = override_config
            .clone()
            .map(|p| {
                if p.is_dir() {
                    p
                } else {
                    p.parent().map(Path::to_path_buf).unwrap_or(p)
                }
            })
            .unwrap_or_else(|| project_dirs.config_dir().to_path_buf());

        let config_file = override_config
            .filter(|p| p.is_file() || p.extension().is_some())
            .unwrap_or_else(|| config_dir.join("config.toml"));

        let data_root = override_data.unwrap_or_else(|| project_dirs.data_dir().to_path_buf());
        Ok(Self::rooted(config_dir, config_file, data_root, project_dirs.state_dir()))
    }

    /// Lays every path out below a single directory. Used by tests and by
    /// portable installs that pass `--data-dir`.
    pub fn under(root: &Path) -> Self {
        let config_dir = root.join("config");
        let config_file = config_dir.join("config.toml");
        Self::rooted(config_dir, config_file, root.join("data"), None)
    }

    fn rooted(
        config_dir: PathBuf,
        config_file: PathBuf,
        data_root: PathBuf,
        state_dir: Option<&Path>,
    ) -> Self {
        let database_path = data_root.join("notebeam.db");
        let state_dir = state_dir
            .map(Path::to_path_buf)
            .unwrap_or_else(|| data_root.join("state"));
        let log_dir = state_dir.join("logs");
        Self {
            config_dir,
            config_file,
            data_dir: data_root,
            database_path,
            log_dir,
            state_dir,
        }
    }

    pub fn ensure_directories(&self) -> Result<()> {
        for dir in [
            &self.config_dir,
            &self.data_dir,
            &self.log_dir,
            &self.state_dir,
        ] {
            fs::create_dir_all(dir)
                .with_context(|| format!("creating application directory {}", dir.display()))?;
        }
        Ok(())
    }

    pub fn log_file(&self) -> PathBuf {
        self.log_dir.join("notebeam.log")
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub transfer: TransferOptions,
    pub storage: StorageOptions,
    pub editor: EditorOptions,
}

impl AppConfig {
    fn post_load(&mut self, paths: &ConfigPaths) -> Result<()> {
        self.storage
            .resolve(paths)
            .context("resolving storage paths")?;
        self.transfer.sanitize();
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferOptions {
    /// Address of the web app that opens `#data=` links on the phone.
    pub base_url: String,
    pub max_image_dimension: u32,
    pub jpeg_quality: u8,
    pub fetch_timeout_secs: u64,
    /// Try shrinking embedded images before dropping them.
    pub recompress_images: bool,
    pub qr_quiet_zone: bool,
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            base_url: "https://notebeam.app/".to_string(),
            max_image_dimension: 800,
            jpeg_quality: 60,
            fetch_timeout_secs: 10,
            recompress_images: false,
            qr_quiet_zone: true,
        }
    }
}

impl TransferOptions {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    fn sanitize(&mut self) {
        let defaults = Self::default();
        if self.base_url.trim().is_empty() {
            tracing::warn!("empty transfer.base_url in config, using default");
            self.base_url = defaults.base_url;
        }
        if let Some(idx) = self.base_url.find('#') {
            tracing::warn!(base_url = %self.base_url, "transfer.base_url carries a fragment, dropping it");
            self.base_url.truncate(idx);
        }
        let clamped = self
            .max_image_dimension
            .clamp(MIN_IMAGE_DIMENSION, MAX_IMAGE_DIMENSION);
        if clamped != self.max_image_dimension {
            tracing::warn!(
                value = self.max_image_dimension,
                clamped,
                "transfer.max_image_dimension out of range"
            );
            self.max_image_dimension = clamped;
        }
        let quality = self.jpeg_quality.clamp(1, 100);
        if quality != self.jpeg_quality {
            tracing::warn!(value = self.jpeg_quality, "transfer.jpeg_quality out of range");
            self.jpeg_quality = quality;
        }
        if self.fetch_timeout_secs == 0 {
            tracing::warn!("transfer.fetch_timeout_secs = 0 would never time out, using default");
            self.fetch_timeout_secs = defaults.fetch_timeout_secs;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageOptions {
    #[serde(skip)]
    pub database_path: PathBuf,
    pub wal_autocheckpoint: u32,
}

impl Default for StorageOptions {
    fn default() -> Self {
        Self {
            database_path: PathBuf::new(),
            wal_autocheckpoint: 1000,
        }
    }
}

impl StorageOptions {
    fn resolve(&mut self, paths: &ConfigPaths) -> Result<()> {
        if self.database_path.as_os_str().is_empty() {
            self.database_path = paths.database_path.clone();
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorOptions {
    pub show_info_on_start: bool,
    pub wrap: bool,
}

impl Default for EditorOptions {
    fn default() -> Self {
        Self {
            show_info_on_start: true,
            wrap: true,
        }
    }
}
