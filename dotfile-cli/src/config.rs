//! Client configuration stored as `dotfile.json` in the user config directory

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE: &str = "dotfile.json";
pub const DEFAULT_REMOTE: &str = "https://dotfilehub.com";

/// Keys settable with `dotfile config <key> <value>`
pub const KEYS: [&str; 3] = ["remote", "username", "token"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub remote: String,
    pub username: String,
    pub token: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            remote: DEFAULT_REMOTE.to_string(),
            username: String::new(),
            token: String::new(),
        }
    }
}

impl ClientConfig {
    /// Load from `path`; a missing file yields the defaults
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = fs::read_to_string(path).with_context(|| format!("reading {:?}", path))?;
        serde_json::from_str(&data).with_context(|| format!("parsing {:?}", path))
    }

    /// Write to `path` atomically
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("creating {:?}", parent))?;
        }
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_string_pretty(self)?)
            .with_context(|| format!("writing {:?}", tmp))?;
        fs::rename(&tmp, path).with_context(|| format!("renaming {:?}", tmp))?;
        Ok(())
    }

    /// Set one key. An empty remote falls back to the default.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "remote" if value.is_empty() => self.remote = DEFAULT_REMOTE.to_string(),
            "remote" => self.remote = value.trim_end_matches('/').to_string(),
            "username" => self.username = value.to_string(),
            "token" => self.token = value.to_string(),
            other => bail!("unknown config key {:?}, expected one of {}", other, KEYS.join(", ")),
        }
        Ok(())
    }

    /// Username and token for authenticated requests
    pub fn credentials(&self) -> Option<(String, String)> {
        if self.username.is_empty() || self.token.is_empty() {
            return None;
        }
        Some((self.username.clone(), self.token.clone()))
    }

    pub fn require_username(&self) -> Result<&str> {
        if self.username.is_empty() {
            return Err(anyhow!("username not set, run `dotfile config username <name>`"));
        }
        Ok(&self.username)
    }
}

impl fmt::Display for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let n = self.token.chars().count();
        let shown: String = self.token.chars().skip(n.saturating_sub(4)).collect();
        let token = match n {
            0..=4 => "*".repeat(n),
            _ => format!("{}{}", "*".repeat(n - 4), shown),
        };
        writeln!(f, "remote:   {}", self.remote)?;
        writeln!(f, "username: {}", self.username)?;
        write!(f, "token:    {}", token)
    }
}

/// Default location of the config file
pub fn default_config_path() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|dir| dir.join("dotfile").join(CONFIG_FILE))
        .ok_or_else(|| anyhow!("cannot determine the user config directory"))
}

/// Default storage directory for local commit chains
pub fn default_storage_dir() -> Result<PathBuf> {
    dirs::data_dir()
        .map(|dir| dir.join("dotfile"))
        .ok_or_else(|| anyhow!("cannot determine the user data directory"))
}

pub fn home_dir() -> Result<PathBuf> {
    dirs::home_dir().ok_or_else(|| anyhow!("cannot determine the home directory"))
}
