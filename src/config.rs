//! Configuration loaded from `.findrefs/config.toml`.
//!
//! Every field has a default, so a missing or partial file is fine.
//! An unreadable or malformed file is logged and replaced by defaults.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{FindRefsError, Result};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FindRefsConfig {
    pub search: SearchSettings,
    pub index: IndexSettings,
}

/// Settings for the search executor and matcher.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SearchSettings {
    /// Worker pool size. 0 lets rayon pick (one per CPU).
    pub worker_threads: usize,
    /// Capacity of the bounded channel carrying per-file results to the reducer.
    pub event_capacity: usize,
    /// Report declaration sites (including the target's own) as usages.
    pub include_declarations: bool,
    /// How often the reducer re-checks cancellation while no result arrives.
    pub poll_interval_ms: u64,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            worker_threads: 0,
            event_capacity: 64,
            include_declarations: false,
            poll_interval_ms: 25,
        }
    }
}

impl SearchSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

/// Settings for building a snapshot from a directory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct IndexSettings {
    /// File extensions treated as C/C++ sources or headers.
    pub extensions: Vec<String>,
    /// Path substrings to skip.
    pub exclude: Vec<String>,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            extensions: ["c", "cc", "cpp", "cxx", "h", "hh", "hpp", "hxx"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            exclude: Vec::new(),
        }
    }
}

impl IndexSettings {
    /// Whether a path should be part of a snapshot.
    pub fn accepts(&self, path: &Path) -> bool {
        let ext_ok = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| self.extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)));
        if !ext_ok {
            return false;
        }
        let display = path.to_string_lossy();
        !self.exclude.iter().any(|pat| display.contains(pat.as_str()))
    }
}

impl FindRefsConfig {
    /// Load from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            debug!(path = %path.display(), "no config file, using defaults");
            return Self::default();
        }
        match Self::try_load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "invalid config, using defaults");
                Self::default()
            }
        }
    }

    /// Load from a TOML file, reporting any problem.
    pub fn try_load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| FindRefsError::io(path, e))?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| FindRefsError::Config(e.to_string()))
    }
}
