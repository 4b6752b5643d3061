//! Path utilities and file system helpers

use crate::error::ChatError;
use std::path::PathBuf;

/// Gets the application data directory
pub fn get_app_data_dir() -> Result<PathBuf, ChatError> {
    dirs::data_dir()
        .map(|p| p.join("qwen-chat"))
        .ok_or_else(|| ChatError::Config("Could not find app data directory".to_string()))
}

/// Gets the chat history database file path
pub fn get_db_path() -> Result<PathBuf, ChatError> {
    get_app_data_dir().map(|p| p.join("chat_history.db"))
}

/// Gets the settings file path
pub fn get_settings_path() -> Result<PathBuf, ChatError> {
    get_app_data_dir().map(|p| p.join(".settings.json"))
}
