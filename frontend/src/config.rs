//! Configuration layer: a `[global]` table plus optional per-game tables,
//! with per-game values overriding global ones. Carried as TOML; the key
//! set matches the emulator's documented configuration vocabulary.

use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("MusicVolume {0} out of range (0-200)")]
    MusicVolumeRange(u32),
    #[error("SteeringStrength {0} out of range (1-10)")]
    SteeringStrengthRange(u8),
}

/// One section's worth of settings; every field optional so per-game
/// sections can override any subset.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigSection {
    #[serde(rename = "Width")]
    pub width: Option<u32>,
    #[serde(rename = "Height")]
    pub height: Option<u32>,
    #[serde(rename = "FullScreen")]
    pub full_screen: Option<bool>,
    #[serde(rename = "Stretch")]
    pub stretch: Option<bool>,
    #[serde(rename = "FPSLimit")]
    pub fps_limit: Option<bool>,
    #[serde(rename = "MusicVolume")]
    pub music_volume: Option<u32>,
    #[serde(rename = "EmulateDSB")]
    pub emulate_dsb: Option<bool>,
    #[serde(rename = "ForceFeedback")]
    pub force_feedback: Option<bool>,
    #[serde(rename = "SimulateDriveBoard")]
    pub simulate_drive_board: Option<bool>,
    #[serde(rename = "SteeringStrength")]
    pub steering_strength: Option<u8>,
    #[serde(rename = "RomPath")]
    pub rom_path: Option<String>,
    #[serde(rename = "LogLevel")]
    pub log_level: Option<String>,
    #[serde(rename = "LogOutput")]
    pub log_output: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(rename = "Global", default)]
    global: ConfigSection,
    #[serde(flatten)]
    games: std::collections::HashMap<String, ConfigSection>,
}

/// Fully resolved settings for one game.
#[derive(Clone, Debug)]
pub struct Settings {
    pub width: u32,
    pub height: u32,
    pub full_screen: bool,
    pub stretch: bool,
    pub fps_limit: bool,
    pub music_volume: u32,
    pub emulate_dsb: bool,
    pub force_feedback: bool,
    pub simulate_drive_board: bool,
    pub steering_strength: u8,
    pub rom_path: String,
    pub log_level: String,
    pub log_output: String,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            width: 496,
            height: 384,
            full_screen: false,
            stretch: false,
            fps_limit: true,
            music_volume: 100,
            emulate_dsb: true,
            force_feedback: false,
            simulate_drive_board: false,
            steering_strength: 5,
            rom_path: String::new(),
            log_level: "info".into(),
            log_output: "stderr".into(),
        }
    }
}

impl Settings {
    fn apply(&mut self, section: &ConfigSection) {
        if let Some(v) = section.width {
            self.width = v;
        }
        if let Some(v) = section.height {
            self.height = v;
        }
        if let Some(v) = section.full_screen {
            self.full_screen = v;
        }
        if let Some(v) = section.stretch {
            self.stretch = v;
        }
        if let Some(v) = section.fps_limit {
            self.fps_limit = v;
        }
        if let Some(v) = section.music_volume {
            self.music_volume = v;
        }
        if let Some(v) = section.emulate_dsb {
            self.emulate_dsb = v;
        }
        if let Some(v) = section.force_feedback {
            self.force_feedback = v;
        }
        if let Some(v) = section.simulate_drive_board {
            self.simulate_drive_board = v;
        }
        if let Some(v) = section.steering_strength {
            self.steering_strength = v;
        }
        if let Some(v) = &section.rom_path {
            self.rom_path = v.clone();
        }
        if let Some(v) = &section.log_level {
            self.log_level = v.clone();
        }
        if let Some(v) = &section.log_output {
            self.log_output = v.clone();
        }
    }

    fn validate(self) -> Result<Self, ConfigError> {
        if self.music_volume > 200 {
            return Err(ConfigError::MusicVolumeRange(self.music_volume));
        }
        if !(1..=10).contains(&self.steering_strength) {
            return Err(ConfigError::SteeringStrengthRange(self.steering_strength));
        }
        Ok(self)
    }
}

/// Parse config text and resolve settings for `game_id` (per-game wins).
pub fn resolve(text: &str, game_id: &str) -> Result<Settings, ConfigError> {
    let file: ConfigFile = toml::from_str(text)?;
    let mut settings = Settings::default();
    settings.apply(&file.global);
    if let Some(section) = file.games.get(game_id) {
        settings.apply(section);
    }
    settings.validate()
}

/// Load and resolve a config file; a missing file yields the defaults.
pub fn load(path: &Path, game_id: &str) -> Result<Settings, ConfigError> {
    if !path.exists() {
        return Ok(Settings::default());
    }
    let text = std::fs::read_to_string(path)?;
    resolve(&text, game_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn per_game_overrides_global() {
        let text = r#"
[Global]
Width = 640
Height = 480
MusicVolume = 150

[SCUD]
Width = 800
ForceFeedback = true
"#;
        let s = resolve(text, "SCUD").unwrap();
        assert_eq!(s.width, 800);
        assert_eq!(s.height, 480);
        assert_eq!(s.music_volume, 150);
        assert!(s.force_feedback);

        let other = resolve(text, "VF3TB").unwrap();
        assert_eq!(other.width, 640);
        assert!(!other.force_feedback);
    }

    #[test]
    fn defaults_apply_without_sections() {
        let s = resolve("", "SCUD").unwrap();
        assert_eq!((s.width, s.height), (496, 384));
        assert!(s.emulate_dsb);
    }

    #[test]
    fn out_of_range_values_rejected() {
        assert!(matches!(
            resolve("[Global]\nMusicVolume = 300\n", "X"),
            Err(ConfigError::MusicVolumeRange(300))
        ));
        assert!(matches!(
            resolve("[Global]\nSteeringStrength = 11\n", "X"),
            Err(ConfigError::SteeringStrengthRange(11))
        ));
    }

    #[test]
    fn unknown_keys_are_errors() {
        assert!(resolve("[Global]\nWdith = 1\n", "X").is_err());
    }
}
