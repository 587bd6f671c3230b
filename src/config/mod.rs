//! Configuration system using TOML files.
//!
//! Config lives at `<config>/inlimbo/config.toml` (see [`crate::paths`];
//! `INLIMBO_CONFIG_HOME` overrides the directory). The file is
//! human-readable and editable; a missing file is a fatal startup error,
//! but individual missing keys fall back to defaults.

pub mod watcher;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::library::sort::SortPlan;

/// Application configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Library settings
    pub library: LibraryConfig,

    /// Hierarchy ordering (metric names per level)
    pub sort: SortConfig,

    /// Fuzzy search settings
    pub fuzzy: FuzzyConfig,

    /// Audio settings
    pub audio: AudioConfig,
}

/// Library settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LibraryConfig {
    /// Root directory of the music collection
    pub directory: PathBuf,
}

/// Sort metric names, one per hierarchy level.
///
/// Unknown names are warnings, not errors; they fall back to the
/// ascending default for the level (see [`SortPlan::from_names`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SortConfig {
    pub artist: String,
    pub album: String,
    pub disc: String,
    pub track: String,
}

impl Default for SortConfig {
    fn default() -> Self {
        Self {
            artist: "lex_asc".to_string(),
            album: "lex_asc".to_string(),
            disc: "disc_asc".to_string(),
            track: "track_asc".to_string(),
        }
    }
}

/// Fuzzy search settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FuzzyConfig {
    /// Maximum Levenshtein distance accepted by fuzzy title search
    pub max_dist: usize,
}

impl Default for FuzzyConfig {
    fn default() -> Self {
        Self { max_dist: 3 }
    }
}

/// Audio playback settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Output device name ("default" = ALSA default device)
    pub device: String,

    /// Initial volume (0.0 - 1.5)
    pub volume: f32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            device: "default".to_string(),
            volume: 1.0,
        }
    }
}

impl Config {
    /// Resolve the configured sort metric names into a runtime plan.
    pub fn sort_plan(&self) -> SortPlan {
        SortPlan::from_names(
            &self.sort.artist,
            &self.sort.album,
            &self.sort.disc,
            &self.sort.track,
        )
    }
}

// ============================================================================
// Config File Operations
// ============================================================================

/// Load configuration from `path`.
///
/// A missing or unparseable file is an error; startup treats it as fatal
/// so a typo does not silently play from the wrong library root.
pub fn load(path: &Path) -> Result<Config, ConfigError> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Read(path.to_path_buf(), e))?;

    let config: Config =
        toml::from_str(&contents).map_err(|e| ConfigError::Parse(path.to_path_buf(), e))?;

    tracing::info!(target: "config", path = %path.display(), "loaded config");
    Ok(config)
}

/// Save configuration to `path`.
///
/// Creates the parent directory if needed and writes atomically
/// (temp file + rename).
pub fn save(config: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|e| ConfigError::CreateDir(dir.to_path_buf(), e))?;
    }

    let contents = toml::to_string_pretty(config).map_err(ConfigError::Serialize)?;

    let temp_path = path.with_extension("toml.tmp");
    std::fs::write(&temp_path, &contents)
        .map_err(|e| ConfigError::Write(temp_path.clone(), e))?;
    std::fs::rename(&temp_path, path)
        .map_err(|e| ConfigError::Rename(temp_path, path.to_path_buf(), e))?;

    tracing::info!(target: "config", path = %path.display(), "saved config");
    Ok(())
}

// ============================================================================
// Error Types
// ============================================================================

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    Read(PathBuf, std::io::Error),

    #[error("failed to parse config file {0}: {1}")]
    Parse(PathBuf, toml::de::Error),

    #[error("failed to create config directory {0}: {1}")]
    CreateDir(PathBuf, std::io::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(toml::ser::Error),

    #[error("failed to write config to {0}: {1}")]
    Write(PathBuf, std::io::Error),

    #[error("failed to rename temp file {0} to {1}: {2}")]
    Rename(PathBuf, PathBuf, std::io::Error),
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::sort::{AlbumMetric, ArtistMetric, DiscMetric, TrackMetric};
    use tempfile::tempdir;

    #[test]
    fn test_default_config_serializes() {
        let config = Config::default();
        let toml = toml::to_string_pretty(&config).unwrap();
        assert!(toml.contains("[library]"));
        assert!(toml.contains("[sort]"));
        assert!(toml.contains("[fuzzy]"));
        assert!(toml.contains("[audio]"));
    }

    #[test]
    fn test_config_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = Config::default();
        config.library.directory = PathBuf::from("/music");
        config.sort.artist = "lex_desc".to_string();
        config.fuzzy.max_dist = 5;
        config.audio.volume = 0.75;

        save(&config, &path).unwrap();
        let loaded = load(&path).unwrap();

        assert_eq!(loaded.library.directory, PathBuf::from("/music"));
        assert_eq!(loaded.sort.artist, "lex_desc");
        assert_eq!(loaded.fuzzy.max_dist, 5);
        assert_eq!(loaded.audio.volume, 0.75);
    }

    #[test]
    fn test_missing_file_is_error() {
        let result = load(Path::new("/nonexistent/config.toml"));
        assert!(matches!(result, Err(ConfigError::Read(..))));
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let toml = r#"
[library]
directory = "/music"
"#;
        let config: Config = toml::from_str(toml).unwrap();

        assert_eq!(config.library.directory, PathBuf::from("/music"));
        assert_eq!(config.sort.track, "track_asc");
        assert_eq!(config.fuzzy.max_dist, 3);
        assert_eq!(config.audio.device, "default");
    }

    #[test]
    fn test_unknown_sort_names_fall_back() {
        let mut config = Config::default();
        config.sort.artist = "by_vibes".to_string();
        config.sort.album = "year_asc".to_string();

        let plan = config.sort_plan();
        assert_eq!(plan.artist, ArtistMetric::LexAsc);
        assert_eq!(plan.album, AlbumMetric::YearAsc);
        assert_eq!(plan.disc, DiscMetric::Asc);
        assert_eq!(plan.track, TrackMetric::Asc);
    }
}
