//! Configuration and scratch directory locations

use std::io;
use std::path::{Path, PathBuf};

/// Name used for config and scratch directories
const APP_NAME: &str = "tf-scenario";

/// Get the configuration directory path
///
/// Uses the directories crate for platform-appropriate locations:
/// - Linux: `~/.config/tf-scenario/`
/// - macOS: `~/Library/Application Support/tf-scenario/`
/// - Windows: `%APPDATA%\tf-scenario\`
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", APP_NAME).map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the path to the configuration file
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join("config.toml"))
}

/// Default parent directory for isolated working copies
pub fn default_workdir_root() -> PathBuf {
    std::env::temp_dir().join(APP_NAME)
}

/// Ensure a working copy root exists
pub fn ensure_dir(dir: &Path) -> io::Result<()> {
    if !dir.exists() {
        std::fs::create_dir_all(dir)?;
    }
    Ok(())
}
