//! Aggregated configuration.
//!
//! Every section uses `#[serde(default)]`, so a partial JSON document only
//! overrides the fields it names.

use serde::{Deserialize, Serialize};

use crate::error::{Result, TourError};
use crate::navigation::NavigationConfig;
use crate::route_cache::CacheConfig;

/// Settings for the OSRM-compatible directions provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OsrmConfig {
    /// Base URL up to and including the service version.
    /// Default: "https://router.project-osrm.org/route/v1"
    pub base_url: String,

    /// Routing profile.
    /// Default: "foot"
    pub profile: String,

    /// Request timeout in seconds.
    /// Default: 30
    pub timeout_secs: u64,

    /// Minimum spacing between request dispatches in milliseconds.
    /// Default: 0 (no spacing)
    pub min_request_interval_ms: u64,
}

impl Default for OsrmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://router.project-osrm.org/route/v1".to_string(),
            profile: "foot".to_string(),
            timeout_secs: 30,
            min_request_interval_ms: 0,
        }
    }
}

/// All walking-tour settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TourConfig {
    pub cache: CacheConfig,
    pub navigation: NavigationConfig,
    pub osrm: OsrmConfig,
}

impl TourConfig {
    /// Parse a (possibly partial) JSON configuration document.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: TourConfig = serde_json::from_str(json).map_err(|e| TourError::Config {
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.cache.max_entries == 0 {
            return Err(TourError::Config {
                message: "cache.max_entries must be at least 1".to_string(),
            });
        }
        let nav = &self.navigation;
        if !(nav.proximity_threshold_m > 0.0 && nav.deviation_threshold_m > 0.0) {
            return Err(TourError::Config {
                message: "navigation thresholds must be positive".to_string(),
            });
        }
        Ok(())
    }
}
