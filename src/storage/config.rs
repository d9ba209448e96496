//! JSON Configuration Management
//!
//! Handles reading and writing the settings file.

use std::fs;
use std::path::{Path, PathBuf};

use crate::models::settings::{Settings, SettingsUpdate};
use crate::utils::error::{AppError, AppResult};
use crate::utils::paths::{config_path, ensure_dir, ensure_mailprompt_dir};

/// Configuration service for managing add-on settings
#[derive(Debug)]
pub struct ConfigService {
    config_path: PathBuf,
    config: Settings,
}

impl ConfigService {
    /// Create a new config service at the default location, loading existing
    /// settings or creating defaults
    pub fn new() -> AppResult<Self> {
        ensure_mailprompt_dir()?;
        Self::open(config_path()?)
    }

    /// Open (or create) the settings file at `path`
    pub fn open(path: impl Into<PathBuf>) -> AppResult<Self> {
        let config_path = path.into();
        if let Some(parent) = config_path.parent() {
            if !parent.as_os_str().is_empty() {
                ensure_dir(parent)?;
            }
        }

        let config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            tracing::info!(
                "[ConfigService] Creating default settings at {}",
                config_path.display()
            );
            let default_config = Settings::default();
            Self::save_to_file(&config_path, &default_config)?;
            default_config
        };

        Ok(Self {
            config_path,
            config,
        })
    }

    /// Load settings from a file
    fn load_from_file(path: &Path) -> AppResult<Settings> {
        let content = fs::read_to_string(path)?;
        let config: Settings = serde_json::from_str(&content)?;
        config.validate().map_err(AppError::validation)?;
        Ok(config)
    }

    /// Save settings to a file with pretty formatting
    fn save_to_file(path: &Path, config: &Settings) -> AppResult<()> {
        config.validate().map_err(AppError::validation)?;
        let content = serde_json::to_string_pretty(config)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Path of the settings file
    pub fn path(&self) -> &Path {
        &self.config_path
    }

    /// Get the current settings
    pub fn get_config(&self) -> &Settings {
        &self.config
    }

    /// Get a clone of the current settings
    pub fn get_config_clone(&self) -> Settings {
        self.config.clone()
    }

    /// Update the settings with a partial update
    ///
    /// The file is left untouched when the updated settings do not validate.
    pub fn update_config(&mut self, update: SettingsUpdate) -> AppResult<Settings> {
        let mut updated = self.config.clone();
        updated.apply_update(update);
        Self::save_to_file(&self.config_path, &updated)?;
        self.config = updated;
        Ok(self.config.clone())
    }

    /// Save the current settings to disk
    pub fn save(&self) -> AppResult<()> {
        Self::save_to_file(&self.config_path, &self.config)
    }

    /// Reload settings from disk
    pub fn reload(&mut self) -> AppResult<()> {
        self.config = Self::load_from_file(&self.config_path)?;
        Ok(())
    }

    /// Reset settings to defaults
    pub fn reset(&mut self) -> AppResult<()> {
        self.config = Settings::default();
        self.save()?;
        Ok(())
    }

    /// Check if the config service is healthy
    pub fn is_healthy(&self) -> bool {
        self.config_path.exists() && self.config.validate().is_ok()
    }
}
