use std::path::{Path, PathBuf};

use anyhow::Context;
use directories::ProjectDirs;
use tracing::{debug, error, info, instrument};

use crate::{Settings, SettingsError};

const SETTINGS_FILE: &str = "settings.toml";

/// Location of the `settings.toml` file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `settings.toml` in the platform config directory
    #[instrument(level = "debug")]
    pub fn default_location() -> Result<Self, SettingsError> {
        let proj_dirs = ProjectDirs::from("com", "wanderlog", "wanderlog").ok_or_else(|| {
            error!("Failed to determine project directories - this usually indicates an unsupported OS or missing home directory");
            SettingsError::ProjectDirectoriesUnavailable
        })?;

        let path = proj_dirs.config_dir().join(SETTINGS_FILE);
        debug!("Settings file resolved to: {}", path.display());
        Ok(Self::at(path))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the settings file. A missing file yields the defaults.
    #[instrument(skip(self), fields(path = %self.path.display()), level = "debug")]
    pub async fn load(&self) -> Result<Settings, SettingsError> {
        if tokio::fs::metadata(&self.path).await.is_err() {
            info!(
                "Settings file {} doesn't exist, using defaults",
                self.path.display()
            );
            return Ok(Settings::default());
        }

        let content = tokio::fs::read_to_string(&self.path)
            .await
            .context("Failed to read settings.toml file")
            .map_err(|e| {
                error!("Failed to read settings file {}: {}", self.path.display(), e);
                SettingsError::FileReadFailed {
                    path: self.path.clone(),
                    source: e,
                }
            })?;

        let settings: Settings = toml::from_str(&content)
            .context("Failed to parse settings.toml file")
            .map_err(|e| {
                error!("Failed to parse settings file {}: {}", self.path.display(), e);
                SettingsError::ParsingFailed {
                    path: self.path.clone(),
                    source: e,
                }
            })?;

        debug!("Loaded settings from {}", self.path.display());
        Ok(settings)
    }

    /// Load the file, then apply `WANDERLOG_*` environment overrides
    pub async fn load_with_env(&self) -> Result<Settings, SettingsError> {
        let mut settings = self.load().await?;
        settings.apply_env_overrides()?;
        Ok(settings)
    }

    #[instrument(skip(self, settings), fields(path = %self.path.display()), level = "debug")]
    pub async fn save(&self, settings: &Settings) -> Result<(), SettingsError> {
        if let Some(dir) = self.path.parent()
            && tokio::fs::metadata(dir).await.is_err()
        {
            info!("Config directory doesn't exist, creating: {}", dir.display());
            tokio::fs::create_dir_all(dir)
                .await
                .context("Failed to create config directory")
                .map_err(|e| {
                    error!("Failed to create config directory {}: {}", dir.display(), e);
                    SettingsError::DirectoryCreationFailed {
                        path: dir.to_path_buf(),
                        source: e,
                    }
                })?;
        }

        let toml = toml::to_string_pretty(settings)
            .context("Failed to serialize settings to TOML")
            .map_err(|e| {
                error!("Failed to serialize settings: {}", e);
                SettingsError::SerializationFailed { source: e }
            })?;

        tokio::fs::write(&self.path, toml)
            .await
            .context("Failed to write settings.toml file")
            .map_err(|e| {
                error!("Failed to write settings file {}: {}", self.path.display(), e);
                SettingsError::FileWriteFailed {
                    path: self.path.clone(),
                    source: e,
                }
            })?;

        info!("Saved settings at {}", self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_missing_file_gives_defaults() {
        let temp_dir = tempdir().unwrap();
        let store = SettingsStore::at(temp_dir.path().join("settings.toml"));

        let settings = store.load().await.unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let temp_dir = tempdir().unwrap();
        let store = SettingsStore::at(temp_dir.path().join("nested").join("settings.toml"));

        let mut settings = Settings::default();
        settings.api.base_url = "https://journal.example.com".to_string();
        settings.session.idle_timeout_minutes = 45;
        store.save(&settings).await.unwrap();

        assert_eq!(store.load().await.unwrap(), settings);
    }

    #[tokio::test]
    async fn test_invalid_toml() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("settings.toml");
        fs::write(&path, "invalid toml content {{{").unwrap();

        let result = SettingsStore::at(&path).load().await;
        if let Err(SettingsError::ParsingFailed { path: failed, .. }) = result {
            assert_eq!(failed, path);
        } else {
            panic!("Expected ParsingFailed error");
        }
    }
}
