//! TOML configuration.
//!
//! ```toml
//! data_path = "data/data.json"
//! state_path = "data/state.json"
//! sweep_interval_secs = 60
//! allowed_roles = ["844828930670067752"]
//!
//! [[roles]]
//! name = "Owner"
//! value = "844831449994887209"
//! ```

use crate::error::{Error, Result};
use crate::types::RoleId;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// A role offered as a choice to the issue command.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RoleChoice {
    /// Display name shown to users.
    pub name: String,
    /// Role identifier on the platform.
    pub value: RoleId,
}

/// Runtime configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Grant store file.
    pub data_path: PathBuf,
    /// Command lock state file.
    pub state_path: PathBuf,
    pub sweep_interval_secs: u64,
    /// How long a sweep tick waits before moving on.
    pub sweep_timeout_secs: u64,
    pub directory_timeout_secs: u64,
    /// Entries per page for the list command.
    pub page_size: usize,
    /// Roles whose holders may use commands while the lock is on.
    pub allowed_roles: Vec<RoleId>,
    /// Grantable roles.
    pub roles: Vec<RoleChoice>,
    /// Version reported by the update check.
    pub current_version: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_path: PathBuf::from("data/data.json"),
            state_path: PathBuf::from("data/state.json"),
            sweep_interval_secs: 60,
            sweep_timeout_secs: 30,
            directory_timeout_secs: 10,
            page_size: 10,
            allowed_roles: Vec::new(),
            roles: Vec::new(),
            current_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl Config {
    /// Parses and validates a TOML document.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw).map_err(|err| Error::Config(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and validates a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|err| Error::Config(format!("read {}: {err}", path.display())))?;
        Self::from_toml_str(&raw)
    }

    /// Checks invariants that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.sweep_interval_secs == 0 {
            return Err(Error::Config("sweep_interval_secs must be > 0".into()));
        }
        if self.sweep_timeout_secs == 0 || self.sweep_timeout_secs > self.sweep_interval_secs {
            return Err(Error::Config(
                "sweep_timeout_secs must be > 0 and <= sweep_interval_secs".into(),
            ));
        }
        if self.directory_timeout_secs == 0 {
            return Err(Error::Config("directory_timeout_secs must be > 0".into()));
        }
        if self.page_size == 0 {
            return Err(Error::Config("page_size must be > 0".into()));
        }

        let mut names = HashSet::new();
        for choice in &self.roles {
            RoleId::new(choice.value.as_str())?;
            if !names.insert(choice.name.as_str()) {
                return Err(Error::Config(format!("duplicate role choice {}", choice.name)));
            }
        }
        for role in &self.allowed_roles {
            RoleId::new(role.as_str())?;
        }
        Ok(())
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn sweep_timeout(&self) -> Duration {
        Duration::from_secs(self.sweep_timeout_secs)
    }

    pub fn directory_timeout(&self) -> Duration {
        Duration::from_secs(self.directory_timeout_secs)
    }

    /// Resolves a role choice by display name or role id.
    pub fn role_choice(&self, key: &str) -> Option<&RoleChoice> {
        self.roles
            .iter()
            .find(|choice| choice.name == key || choice.value.as_str() == key)
    }

    /// Display name for a role, falling back to its id.
    pub fn role_name(&self, role: &RoleId) -> String {
        self.roles
            .iter()
            .find(|choice| &choice.value == role)
            .map(|choice| choice.name.clone())
            .unwrap_or_else(|| role.to_string())
    }
}
