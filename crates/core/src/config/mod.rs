use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{KeyMapping, MusicTime, PanelLayout, Result, TimingWindows};

/// Top-level preferences, persisted as JSON.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub timing: TimingConfig,
    pub audio: AudioConfig,
    pub layout: PanelLayout,
    pub key_mapping: KeyMapping,
}

impl AppConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        let config: AppConfig = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads `path`, falling back to the defaults when the file is missing or
    /// unusable.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            tracing::info!(path = %path.display(), "no preferences file, using defaults");
            return Self::default();
        }
        match Self::load(path) {
            Ok(config) => config,
            Err(err) => {
                tracing::warn!(
                    path = %path.display(),
                    %err,
                    "could not load preferences, using defaults"
                );
                Self::default()
            }
        }
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.timing.windows.validate()?;
        self.key_mapping.validate()
    }
}

/// Judgment windows plus the time spans the render side cares about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    #[serde(flatten)]
    pub windows: TimingWindows,
    /// How far ahead of music time notes start being drawn.
    pub visible_horizon: MusicTime,
    /// How long a pressed panel stays highlighted.
    pub highlight_duration: MusicTime,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            windows: TimingWindows::default(),
            visible_horizon: MusicTime::from_micros(533_333),
            highlight_duration: MusicTime::from_millis(250),
        }
    }
}

/// Configuration specific to the audio subsystem and its polling loops.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Added to every time source reading before judging and rendering.
    pub offset: MusicTime,
    pub watchdog_interval: MusicTime,
    pub input_poll_interval: MusicTime,
    /// Weight of each new lag sample; 1.0 keeps only the latest one.
    pub lag_smoothing: f64,
    /// Buffer granularity of the simulated backend.
    pub simulated_buffer: MusicTime,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            offset: MusicTime::ZERO,
            watchdog_interval: MusicTime::from_millis(1),
            input_poll_interval: MusicTime::from_millis(1),
            lag_smoothing: 1.0,
            simulated_buffer: MusicTime::from_millis(20),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir()
            .join(format!("jujube-config-{}-{name}", std::process::id()))
            .join("preferences.json")
    }

    #[test]
    fn partial_files_fill_in_defaults() {
        let config: AppConfig =
            serde_json::from_str(r#"{ "audio": { "offset": -12.5 }, "timing": { "perfect": 30 } }"#)
                .unwrap();
        assert_eq!(config.audio.offset, MusicTime::from_micros(-12_500));
        assert_eq!(config.audio.watchdog_interval, MusicTime::from_millis(1));
        assert_eq!(config.timing.windows.perfect, MusicTime::from_millis(30));
        assert_eq!(config.timing.windows.great, TimingWindows::default().great);
        assert_eq!(config.key_mapping.key_to_button("4").map(u8::from), Some(0));
    }

    #[test]
    fn saves_and_loads_preferences() {
        let path = temp_path("roundtrip");
        let mut config = AppConfig::default();
        config.audio.offset = MusicTime::from_millis(8);
        config.save(&path).unwrap();

        let loaded = AppConfig::load(&path).unwrap();
        assert_eq!(loaded.audio, config.audio);
        assert_eq!(loaded.timing, config.timing);
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn broken_files_fall_back_to_defaults() {
        let path = temp_path("broken");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "{ not json").unwrap();

        assert!(AppConfig::load(&path).is_err());
        let config = AppConfig::load_or_default(&path);
        assert_eq!(config.timing, TimingConfig::default());
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn invalid_windows_are_rejected_on_load() {
        let path = temp_path("invalid");
        let mut config = AppConfig::default();
        config.timing.windows.miss = MusicTime::from_millis(1);
        config.save(&path).unwrap();

        assert!(AppConfig::load(&path).is_err());
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }
}
