//! Centralized loading of the reconciliation settings file.
//!
//! `settings.json` carries the account's base currency, the currency-symbol
//! map used by the chart renderer, and an optional default product filter.
//! Every entry is optional; a missing file simply means built-in defaults
//! (EUR base, ISO codes as symbols, no filter).

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use models::Settings;

/// Loads settings from a JSON file.
pub fn load_settings<P: AsRef<Path>>(path: P) -> Result<Settings> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Reading settings file: {}", path.display()))?;
    let settings: Settings = serde_json::from_str(&raw)
        .with_context(|| format!("Parsing settings JSON in {}", path.display()))?;
    Ok(settings)
}

/// Loads settings from the default location (settings.json in the current directory).
pub fn load_default_settings() -> Result<Settings> {
    load_settings("settings.json")
}

/// Tries the provided path first, then the default location, and falls back
/// to built-in defaults when no settings file is found anywhere. An explicit
/// path that exists but fails to parse is still an error.
pub fn load_settings_with_fallback(path: Option<&PathBuf>) -> Result<Settings> {
    if let Some(settings_path) = path {
        if settings_file_exists(settings_path) {
            return load_settings(settings_path);
        }
    }
    if default_settings_exist() {
        return load_default_settings();
    }
    Ok(Settings::default())
}

/// Checks if a settings file exists at the given path.
pub fn settings_file_exists<P: AsRef<Path>>(path: P) -> bool {
    path.as_ref().exists() && path.as_ref().is_file()
}

/// Checks if the default settings file (settings.json) exists.
pub fn default_settings_exist() -> bool {
    settings_file_exists("settings.json")
}
