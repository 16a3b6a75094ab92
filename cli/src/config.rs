//! Complete run configuration, from flags or a YAML file.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use eventrace_core::{SubscriptionFilter, WatchError};
use eventrace_pull::PullConfig;
use eventrace_push::PushConfig;

/// Both providers plus the filter they share.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RaceConfig {
    pub push: PushConfig,
    pub pull: PullConfig,
    pub filter: SubscriptionFilter,
}

impl RaceConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).context("parsing race config")
    }

    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        Self::from_yaml_str(&raw).with_context(|| format!("in {}", path.display()))
    }

    /// Checked before any watcher starts.
    pub fn validate(&self) -> Result<(), WatchError> {
        self.filter.validate()?;
        self.push.validate()?;
        self.pull.validate()
    }
}
