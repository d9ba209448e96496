//! Settings Location
//!
//! Everything Mail Prompt keeps on disk lives under `~/.mailprompt/`.

use std::path::{Path, PathBuf};

use crate::utils::error::{AppError, AppResult};

pub fn home_dir() -> AppResult<PathBuf> {
    dirs::home_dir().ok_or_else(|| AppError::config("Could not determine home directory"))
}

/// `~/.mailprompt`
pub fn mailprompt_dir() -> AppResult<PathBuf> {
    Ok(home_dir()?.join(".mailprompt"))
}

/// `~/.mailprompt/config.json`
pub fn config_path() -> AppResult<PathBuf> {
    Ok(mailprompt_dir()?.join("config.json"))
}

/// Create `path` and its parents unless it is already there.
pub fn ensure_dir(path: &Path) -> AppResult<()> {
    if path.is_dir() {
        return Ok(());
    }
    std::fs::create_dir_all(path)?;
    Ok(())
}

/// `~/.mailprompt`, created on first use.
pub fn ensure_mailprompt_dir() -> AppResult<PathBuf> {
    let path = mailprompt_dir()?;
    ensure_dir(&path)?;
    Ok(path)
}
