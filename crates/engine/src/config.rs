// SPDX-License-Identifier: MIT

//! Scheduler policy knobs.
//!
//! Protocol constants (the 24 h cooldown, the 2 h verification threshold,
//! the 5 s report debounce) are fixed in the modules that own them; this
//! config carries only the operator-tunable policy.

use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("parse error: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SchedulerConfig {
    /// Stagger between accounts: account N crafts N × this many seconds
    /// after the first. Keeps a fleet from hitting the service in lockstep.
    /// Known to drift across midnight boundaries; kept as-is.
    pub delay_between_accounts_secs: u64,
    /// Minimum gap between two crafts on the same account.
    pub min_craft_gap_secs: u64,
    /// Whether crafts may spend untradable gems.
    pub allow_untradable: bool,
    /// Whether unmarketable items may be queued at all.
    pub allow_unmarketable: bool,
    /// Refresh-failure backoff window, minutes.
    pub backoff_min_minutes: u64,
    pub backoff_max_minutes: u64,
    /// Linear multiplier increment per consecutive failure.
    pub backoff_step: f64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            delay_between_accounts_secs: 10,
            min_craft_gap_secs: 5,
            allow_untradable: false,
            allow_unmarketable: false,
            backoff_min_minutes: 1,
            backoff_max_minutes: 15,
            backoff_step: 0.5,
        }
    }
}

impl SchedulerConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        Self::from_toml_str(&std::fs::read_to_string(path)?)
    }

    pub fn min_craft_gap_ms(&self) -> u64 {
        self.min_craft_gap_secs * 1000
    }

    /// Stagger delay for the account at the given fleet position.
    pub fn stagger_delay_ms(&self, account_index: usize) -> u64 {
        self.delay_between_accounts_secs * 1000 * account_index as u64
    }

    /// Backoff delay after `failures` consecutive refresh failures.
    pub fn backoff_ms(&self, failures: u32) -> u64 {
        let multiplier = 1.0 + self.backoff_step * failures as f64;
        let minutes = (self.backoff_min_minutes as f64 * multiplier)
            .min(self.backoff_max_minutes as f64);
        (minutes * 60_000.0) as u64
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
