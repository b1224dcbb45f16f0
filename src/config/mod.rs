//! # Validation Configuration
//!
//! Static thresholds and comparison flags shared read-only by every worker.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

const DEFAULT_PARTIAL_THRESHOLD: f64 = 50.0;
const STRICT_FALLBACK_MARGIN: f64 = 10.0;
const DEFAULT_REFERENCE_DIR: &str = "expected_responses";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ValidationConfig {
    /// Percent of expected leaves that must match for a partial pass.
    pub partial_match_threshold: f64,
    /// Let strict comparisons pass when the match percent clears
    /// [`ValidationConfig::strict_fallback_threshold`].
    pub strict_percent_fallback: bool,
    /// Compare arrays as unordered collections.
    pub ignore_array_order: bool,
    /// Use partial rather than strict mode for object/array comparisons.
    pub partial_dict_match: bool,
    /// Directory holding named expected-payload files.
    pub reference_dir: PathBuf,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            partial_match_threshold: DEFAULT_PARTIAL_THRESHOLD,
            strict_percent_fallback: true,
            ignore_array_order: true,
            partial_dict_match: false,
            reference_dir: PathBuf::from(DEFAULT_REFERENCE_DIR),
        }
    }
}

impl ValidationConfig {
    /// Load a configuration file, filling unset options with defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::config(format!(
                "Config file `{}` does not exist",
                path.display()
            )));
        }
        let raw = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        let config: Self = serde_json::from_str(&raw).map_err(|e| {
            Error::config(format!("Failed to parse config file `{}`: {e}", path.display()))
        })?;
        Ok(config.normalized())
    }

    /// Partial threshold clamped into `0..=100`.
    pub fn partial_threshold(&self) -> f64 {
        if self.partial_match_threshold.is_nan() {
            return DEFAULT_PARTIAL_THRESHOLD;
        }
        self.partial_match_threshold.clamp(0.0, 100.0)
    }

    /// Higher bar applied to strict-mode fallbacks, capped at 100.
    pub fn strict_fallback_threshold(&self) -> f64 {
        (self.partial_threshold() + STRICT_FALLBACK_MARGIN).min(100.0)
    }

    fn normalized(mut self) -> Self {
        self.partial_match_threshold = self.partial_threshold();
        self
    }
}
