//! Utility functions for locating configuration
//!
//! Follows the XDG Base Directory specification:
//!
//! - Config: `~/.config/rangewall/rules.json` - default rule configuration
//!
//! The `RANGEWALL_CONFIG` environment variable overrides the default path.
//!
//! Also reads hex frame dumps for batch evaluation.

use crate::core::error::{Error, Result};
use directories::ProjectDirs;
use std::path::{Path, PathBuf};

/// Environment variable naming the configuration file
pub const CONFIG_ENV_VAR: &str = "RANGEWALL_CONFIG";

/// File name of the default configuration inside the config directory
pub const DEFAULT_CONFIG_FILE: &str = "rules.json";

pub fn get_config_dir() -> Option<PathBuf> {
    ProjectDirs::from("", "", "rangewall").map(|pd| pd.config_dir().to_path_buf())
}

/// Path of the configuration file used when none is given.
///
/// Returns `$RANGEWALL_CONFIG` when set and non-empty, otherwise
/// `rules.json` in the config directory. `None` if no home directory can be
/// determined.
pub fn default_config_path() -> Option<PathBuf> {
    if let Some(path) = std::env::var_os(CONFIG_ENV_VAR)
        && !path.is_empty()
    {
        return Some(PathBuf::from(path));
    }
    get_config_dir().map(|dir| dir.join(DEFAULT_CONFIG_FILE))
}

/// Parses a frame dump: one hex-encoded frame per line.
///
/// Blank lines and lines starting with `#` are skipped. Whitespace and `:`
/// separators inside a line are ignored, so `tcpdump -xx` style byte groups
/// can be pasted directly.
pub fn parse_hex_frames(text: &str) -> Result<Vec<Vec<u8>>> {
    let mut frames = Vec::new();
    for (i, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let digits: String = line
            .chars()
            .filter(|c| !c.is_whitespace() && *c != ':')
            .collect();
        let frame = hex::decode(&digits).map_err(|e| Error::Frame {
            line: i + 1,
            message: e.to_string(),
        })?;
        frames.push(frame);
    }
    Ok(frames)
}

/// Reads and parses a frame dump file.
///
/// # Async
/// Uses `tokio::fs` for non-blocking I/O.
pub async fn load_hex_frames(path: &Path) -> Result<Vec<Vec<u8>>> {
    let text = tokio::fs::read_to_string(path).await?;
    parse_hex_frames(&text)
}
