use crate::error::{Error, Result};
use std::env;
use std::path::PathBuf;

/// Overrides the config directory (used by scripts and tests).
pub const CONFIG_DIR_ENV: &str = "DUMPCTL_CONFIG_DIR";

/// Base dumpctl config directory (~/.config/dumpctl/ unless overridden)
pub fn dumpctl() -> Result<PathBuf> {
    if let Ok(dir) = env::var(CONFIG_DIR_ENV) {
        if !dir.trim().is_empty() {
            return Ok(PathBuf::from(shellexpand::tilde(&dir).to_string()));
        }
    }

    #[cfg(windows)]
    {
        let appdata = env::var("APPDATA").map_err(|_| {
            Error::internal_unexpected(
                "APPDATA environment variable not set on Windows".to_string(),
            )
        })?;
        Ok(PathBuf::from(appdata).join("dumpctl"))
    }

    #[cfg(not(windows))]
    {
        let home = env::var("HOME").map_err(|_| {
            Error::internal_unexpected(
                "HOME environment variable not set on Unix-like system".to_string(),
            )
        })?;
        Ok(PathBuf::from(home).join(".config").join("dumpctl"))
    }
}

/// Targets directory
pub fn targets() -> Result<PathBuf> {
    Ok(dumpctl()?.join("targets"))
}
