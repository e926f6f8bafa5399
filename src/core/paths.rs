use crate::error::{Error, Result};
use std::env;
use std::path::{Path, PathBuf};

/// Base marketplace config directory (~/.config/marketplace/ on all platforms)
pub fn marketplace() -> Result<PathBuf> {
    #[cfg(windows)]
    {
        let appdata = env::var("APPDATA").map_err(|_| {
            Error::internal_unexpected(
                "APPDATA environment variable not set on Windows".to_string(),
            )
        })?;
        Ok(PathBuf::from(appdata).join("marketplace"))
    }

    #[cfg(not(windows))]
    {
        let home = env::var("HOME").map_err(|_| {
            Error::internal_unexpected(
                "HOME environment variable not set on Unix-like system".to_string(),
            )
        })?;
        Ok(PathBuf::from(home).join(".config").join("marketplace"))
    }
}

/// Global marketplace.json config file path
pub fn marketplace_json() -> Result<PathBuf> {
    Ok(marketplace()?.join("marketplace.json"))
}

/// Expand a leading `~` in a user-supplied path argument.
pub fn expand(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).to_string())
}

/// Lossy display form used in error details and responses.
pub fn display(path: &Path) -> String {
    path.display().to_string()
}
