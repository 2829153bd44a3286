//! Box configuration read from `BOUNCEBOX_*` environment variables.

use std::env;
use std::str::FromStr;

use crate::error::{BusError, Result};

/// Box configuration loaded from environment variables.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BoxConfig {
    /// Start the box router in logging mode.
    pub log_messages: bool,
    /// Broadcast a start event before the first source event.
    pub announce_start: bool,
    /// Stop `run` after this many source events.
    pub max_steps: Option<u64>,
}

impl BoxConfig {
    /// Load configuration from environment variables. Unset variables keep their
    /// defaults; unparseable ones are an error.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through `lookup` instead of the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        Ok(Self {
            log_messages: flag(&lookup, "BOUNCEBOX_LOG_MESSAGES")?.unwrap_or(false),
            announce_start: flag(&lookup, "BOUNCEBOX_ANNOUNCE_START")?.unwrap_or(false),
            max_steps: parsed(&lookup, "BOUNCEBOX_MAX_STEPS")?,
        })
    }

    pub fn with_log_messages(mut self, enabled: bool) -> Self {
        self.log_messages = enabled;
        self
    }

    pub fn with_announce_start(mut self, enabled: bool) -> Self {
        self.announce_start = enabled;
        self
    }

    pub fn with_max_steps(mut self, max_steps: u64) -> Self {
        self.max_steps = Some(max_steps);
        self
    }
}

fn flag(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<bool>> {
    let Some(raw) = lookup(key) else {
        return Ok(None);
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(Some(true)),
        "0" | "false" | "no" | "off" | "" => Ok(Some(false)),
        _ => Err(BusError::Config(format!("{key} must be a boolean, got {raw:?}"))),
    }
}

fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>> {
    let Some(raw) = lookup(key) else {
        return Ok(None);
    };
    raw.trim()
        .parse()
        .map(Some)
        .map_err(|_| BusError::Config(format!("{key} must be a number, got {raw:?}")))
}
