//! Host application settings for koshelf, stored as JSON.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::format::{BookFormat, FORMAT_DEFAULT};

const CONFIG_FILENAME: &str = "koshelf.json";

/// Host-side configuration: where the reader settings live, which storage
/// root alternate mounts fold to, and how books render as one-line
/// strings. Every field is optional; unset fields fall back to discovery
/// or defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KoshelfConfig {
    /// Explicit settings directory; discovered when unset.
    #[serde(default)]
    pub koreader_dir: Option<PathBuf>,

    /// Representative storage root for mount folding.
    #[serde(default)]
    pub storage_root: Option<PathBuf>,

    /// Display pattern for [`BookFormat`].
    #[serde(default)]
    pub book_format: Option<String>,
}

impl KoshelfConfig {
    /// Load config from the given directory, or return defaults if not
    /// found.
    pub fn load<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        let config_path = config_dir.as_ref().join(CONFIG_FILENAME);
        if !config_path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(&config_path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Save config to the given directory.
    pub fn save<P: AsRef<Path>>(&self, config_dir: P) -> Result<()> {
        let config_dir = config_dir.as_ref();
        if !config_dir.exists() {
            fs::create_dir_all(config_dir)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        fs::write(config_dir.join(CONFIG_FILENAME), content)?;
        Ok(())
    }

    /// The configured display format, defaulted when unset.
    pub fn book_format(&self) -> BookFormat {
        BookFormat::new(self.book_format.as_deref().unwrap_or(FORMAT_DEFAULT))
    }
}
