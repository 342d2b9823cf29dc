use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::types::{EvolveError, Result};

const CONFIG_FILE: &str = "config.toml";
const DEFAULT_USER: &str = "unknown";

/// Capabilities fixed when a repository handle is built.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RepoOptions {
    /// Whether markers may be created. When off, every trouble set is empty.
    pub obsolescence: bool,
    /// Author recorded on new changesets and in marker metadata.
    pub username: String,
    /// Whether mutating commands report troubles they introduced.
    pub warn_new_troubles: bool,
}

impl Default for RepoOptions {
    fn default() -> Self {
        Self {
            obsolescence: true,
            username: DEFAULT_USER.to_string(),
            warn_new_troubles: true,
        }
    }
}

impl RepoOptions {
    /// Sets the recorded author.
    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = username.into();
        self
    }

    /// Enables or disables marker creation.
    pub fn obsolescence(mut self, enabled: bool) -> Self {
        self.obsolescence = enabled;
        self
    }

    /// Enables or disables new-trouble warnings.
    pub fn warn_new_troubles(mut self, enabled: bool) -> Self {
        self.warn_new_troubles = enabled;
        self
    }

    /// Defaults overlaid by the user config file, then by `repo_dir/config.toml`.
    pub fn load(repo_dir: Option<&Path>) -> Result<Self> {
        let mut options = Self::default();
        if let Some(user) = default_config_path() {
            options.apply(&read_file(&user)?);
        }
        if let Some(dir) = repo_dir {
            options.apply(&read_file(&dir.join(CONFIG_FILE))?);
        }
        Ok(options)
    }

    fn apply(&mut self, raw: &RawConfig) {
        if let Some(enabled) = raw.obsolescence.enabled {
            self.obsolescence = enabled;
        }
        if let Some(warn) = raw.obsolescence.warn_new_troubles {
            self.warn_new_troubles = warn;
        }
        if let Some(name) = raw.ui.username.as_ref().filter(|n| !n.trim().is_empty()) {
            self.username = name.clone();
        }
    }
}

/// `dirs::config_dir()/evolve/config.toml`.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("evolve").join(CONFIG_FILE))
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct RawConfig {
    ui: RawUi,
    obsolescence: RawObsolescence,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct RawUi {
    username: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct RawObsolescence {
    enabled: Option<bool>,
    warn_new_troubles: Option<bool>,
}

fn read_file(path: &Path) -> Result<RawConfig> {
    if !path.exists() {
        return Ok(RawConfig::default());
    }
    let contents = fs::read_to_string(path)?;
    toml::from_str(&contents).map_err(|err| {
        EvolveError::InvalidArgument(format!("failed to parse {}: {err}", path.display()))
    })
}
