//! Chat settings persisted between sessions

use crate::error::ChatError;
use crate::paths::get_settings_path;
use crate::prompts::DEFAULT_SYSTEM_PROMPT;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Generation settings for one turn.
///
/// The engine snapshots these at turn start; edits made while a turn is
/// in flight only affect the next turn.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ChatSettings {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_enable_thinking")]
    pub enable_thinking: bool,
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
}

fn default_base_url() -> String {
    "http://127.0.0.1:3201".to_string()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    1000
}

fn default_enable_thinking() -> bool {
    true
}

fn default_system_prompt() -> String {
    DEFAULT_SYSTEM_PROMPT.to_string()
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            enable_thinking: default_enable_thinking(),
            system_prompt: default_system_prompt(),
        }
    }
}

impl ChatSettings {
    /// Checks the value ranges the backend accepts.
    pub fn validate(&self) -> Result<(), ChatError> {
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ChatError::Config(format!(
                "temperature must be within 0.0..=2.0, got {}",
                self.temperature
            )));
        }
        if self.max_tokens == 0 {
            return Err(ChatError::Config("max_tokens must be greater than 0".to_string()));
        }
        Ok(())
    }
}

/// Loads settings from the default location, falling back to defaults
pub fn load_settings() -> Result<ChatSettings, ChatError> {
    load_settings_from(&get_settings_path()?)
}

/// Loads settings from an explicit path
pub fn load_settings_from(path: &Path) -> Result<ChatSettings, ChatError> {
    if path.exists() {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ChatError::Config(format!("Failed to read settings: {}", e)))?;
        serde_json::from_str(&content)
            .map_err(|e| ChatError::Config(format!("Failed to parse settings: {}", e)))
    } else {
        Ok(ChatSettings::default())
    }
}

/// Saves settings to the default location
pub fn save_settings(settings: &ChatSettings) -> Result<(), ChatError> {
    save_settings_to(&get_settings_path()?, settings)
}

/// Saves settings to an explicit path
pub fn save_settings_to(path: &Path, settings: &ChatSettings) -> Result<(), ChatError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| ChatError::Config(format!("Failed to create directory: {}", e)))?;
    }
    let content = serde_json::to_string_pretty(settings)
        .map_err(|e| ChatError::Config(format!("Failed to serialize settings: {}", e)))?;
    std::fs::write(path, content)
        .map_err(|e| ChatError::Config(format!("Failed to save settings: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults_are_valid() {
        let settings = ChatSettings::default();
        settings.validate().expect("defaults must validate");
        assert!(settings.enable_thinking);
        assert_eq!(settings.max_tokens, 1000);
    }

    #[test]
    fn rejects_out_of_range_temperature() {
        let settings = ChatSettings {
            temperature: 2.5,
            ..ChatSettings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn rejects_zero_max_tokens() {
        let settings = ChatSettings {
            max_tokens: 0,
            ..ChatSettings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn round_trips_through_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(".settings.json");
        let settings = ChatSettings {
            temperature: 0.6,
            enable_thinking: false,
            ..ChatSettings::default()
        };
        save_settings_to(&path, &settings).expect("save");
        let loaded = load_settings_from(&path).expect("load");
        assert_eq!(loaded, settings);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let loaded = load_settings_from(&dir.path().join("nope.json")).expect("load");
        assert_eq!(loaded, ChatSettings::default());
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(".settings.json");
        std::fs::write(&path, r#"{"temperature": 1.2}"#).expect("write");
        let loaded = load_settings_from(&path).expect("load");
        assert_eq!(loaded.temperature, 1.2);
        assert_eq!(loaded.max_tokens, 1000);
    }
}
