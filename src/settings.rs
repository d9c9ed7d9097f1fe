use anyhow::{anyhow, Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::timer::DEFAULT_TIMER_SECONDS;

pub const DATA_DIR_ENV: &str = "BLOCKFOCUS_DATA_DIR";
pub const DEBUG_ENV: &str = "BLOCKFOCUS_DEBUG";
pub const SETTINGS_FILE: &str = "settings.json";
pub const DATABASE_FILE: &str = "blockfocus.sqlite3";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// Length a reset puts the countdown back to.
    pub default_timer_seconds: u64,
    pub tick_interval_ms: u64,
    /// 1 writes the timer record on every tick. Larger values only write every
    /// N-th tick; start/pause/reset/expiry always write.
    pub persist_every_ticks: u32,
    pub event_capacity: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_timer_seconds: DEFAULT_TIMER_SECONDS,
            tick_interval_ms: 1000,
            persist_every_ticks: 1,
            event_capacity: 256,
        }
    }
}

impl Settings {
    /// Reads `path`, falling back to defaults when the file is missing or
    /// unreadable as JSON. Zero values are bumped to something usable.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings from {}", path.display()))?;
        let settings = match serde_json::from_str::<Settings>(&contents) {
            Ok(settings) => settings,
            Err(err) => {
                warn!("Ignoring unparsable settings at {}: {err}", path.display());
                Self::default()
            }
        };

        Ok(settings.sanitized())
    }

    pub fn persist(&self, path: &Path) -> Result<()> {
        let serialized = serde_json::to_string_pretty(self)?;
        fs::write(path, serialized)
            .with_context(|| format!("Failed to write settings to {}", path.display()))
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    fn sanitized(mut self) -> Self {
        let defaults = Self::default();
        if self.default_timer_seconds == 0 {
            self.default_timer_seconds = defaults.default_timer_seconds;
        }
        if self.tick_interval_ms == 0 {
            self.tick_interval_ms = defaults.tick_interval_ms;
        }
        self.persist_every_ticks = self.persist_every_ticks.max(1);
        self.event_capacity = self.event_capacity.max(1);
        self
    }
}

pub fn data_dir() -> Result<PathBuf> {
    if let Some(dir) = std::env::var_os(DATA_DIR_ENV).filter(|value| !value.is_empty()) {
        return Ok(PathBuf::from(dir));
    }

    dirs::data_dir()
        .map(|dir| dir.join("blockfocus"))
        .ok_or_else(|| anyhow!("no data directory available; set {DATA_DIR_ENV}"))
}

pub fn debug_enabled() -> bool {
    std::env::var(DEBUG_ENV)
        .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}
