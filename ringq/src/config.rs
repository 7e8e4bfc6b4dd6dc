use std::{fs, path::Path};

use anyhow::{ensure, Context};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StressConfig {
    pub capacity: usize,
    pub producers: usize,
    pub consumers: usize,
    pub items_per_producer: u64,
}

impl Default for StressConfig {
    fn default() -> Self {
        StressConfig {
            capacity: 64,
            producers: 4,
            consumers: 4,
            items_per_producer: 10_000,
        }
    }
}

impl StressConfig {
    pub fn from_yaml(text: &str) -> Result<Self, anyhow::Error> {
        // an empty document is a valid, all-default config
        if text.trim().is_empty() {
            return Ok(StressConfig::default());
        }
        let cfg = serde_yaml::from_str(text)?;
        Ok(cfg)
    }

    pub fn load(path: &Path) -> Result<Self, anyhow::Error> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_yaml(&text)
            .with_context(|| format!("failed to parse config file {}", path.display()))
    }

    /// Capacity is left to the queue itself, which rejects 0.
    pub fn validate(&self) -> Result<(), anyhow::Error> {
        ensure!(self.producers > 0, "at least one producer is required");
        ensure!(self.consumers > 0, "at least one consumer is required");
        let total = (self.producers as u64).checked_mul(self.items_per_producer);
        ensure!(
            total.is_some_and(|total| usize::try_from(total).is_ok()),
            "{} producers x {} items is too many items to track",
            self.producers,
            self.items_per_producer
        );
        Ok(())
    }

    /// Only meaningful once `validate` has accepted the config.
    pub fn total_items(&self) -> u64 {
        self.producers as u64 * self.items_per_producer
    }
}
