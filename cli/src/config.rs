// Copyright 2024 The Hangar Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! User configuration: a single `config.toml` layer, read from the
//! platform config directory (or `HANGAR_CONFIG` if set) and merged over
//! built-in defaults. There is no per-repo layer or scriptable condition
//! system here, just one file with one set of values.

use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;

use crate::command_error::CommandError;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UserSection {
    pub name: String,
    pub email: String,
}

impl Default for UserSection {
    fn default() -> Self {
        Self { name: "unknown".to_string(), email: "unknown@localhost".to_string() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSection {
    pub push_max_nbytes: u64,
    pub fetch_max_nbytes: u64,
    pub enable_compression: bool,
}

impl Default for SyncSection {
    fn default() -> Self {
        Self { push_max_nbytes: 250_000_000, fetch_max_nbytes: 250_000_000, enable_compression: true }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UiSection {
    pub color: String,
    pub default_backend: String,
}

impl Default for UiSection {
    fn default() -> Self {
        Self { color: "auto".to_string(), default_backend: "00".to_string() }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HangarConfig {
    pub user: UserSection,
    pub sync: SyncSection,
    pub ui: UiSection,
}

impl HangarConfig {
    /// Resolves the config file path: `$HANGAR_CONFIG` if set, otherwise
    /// `<platform config dir>/hangar/config.toml`.
    pub fn default_path() -> Result<PathBuf, CommandError> {
        if let Ok(path) = std::env::var("HANGAR_CONFIG") {
            return Ok(PathBuf::from(path));
        }
        let strategy = etcetera::choose_base_strategy()
            .map_err(|e| CommandError::config(format!("could not determine config directory: {e}")))?;
        Ok(strategy.config_dir().join("hangar").join("config.toml"))
    }

    /// Loads config from `path`, falling back to defaults if the file
    /// doesn't exist. A malformed file is an error.
    pub fn load(path: &Path) -> Result<Self, CommandError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)?;
        toml_edit::de::from_str(&text).map_err(|e| CommandError::config(format!("{}: {e}", path.display())))
    }

    /// Loads from [`Self::default_path`], creating nothing if absent.
    pub fn load_default() -> Result<Self, CommandError> {
        Self::load(&Self::default_path()?)
    }

    pub fn save(&self, path: &Path) -> Result<(), CommandError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let text = toml_edit::ser::to_string_pretty(self)
            .map_err(|e| CommandError::config(format!("failed to serialize config: {e}")))?;
        std::fs::write(path, text)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = HangarConfig::load(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(config.user.name, "unknown");
        assert_eq!(config.sync.push_max_nbytes, 250_000_000);
    }

    #[test]
    fn roundtrips_through_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut config = HangarConfig::default();
        config.user.name = "alice".to_string();
        config.user.email = "alice@example.com".to_string();
        config.save(&path).unwrap();

        let loaded = HangarConfig::load(&path).unwrap();
        assert_eq!(loaded.user.name, "alice");
        assert_eq!(loaded.user.email, "alice@example.com");
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[user]\nname = \"bob\"\nemail = \"bob@example.com\"\n").unwrap();
        let config = HangarConfig::load(&path).unwrap();
        assert_eq!(config.user.name, "bob");
        assert_eq!(config.sync.enable_compression, true);
        assert_eq!(config.ui.color, "auto");
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "this is not valid toml [[[").unwrap();
        assert!(HangarConfig::load(&path).is_err());
    }
}
