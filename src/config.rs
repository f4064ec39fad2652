//! Crate configuration.
//!
//! Every section has defaults, so an empty document is a valid config:
//!
//! ```toml
//! [cache]
//! geometry_capacity = 512
//! texture_capacity = 128
//! shader_capacity = 0
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{VizError, VizResult};

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VizConfig {
    pub cache: CacheConfig,
}

impl VizConfig {
    /// Parses a TOML document.
    ///
    /// # Errors
    ///
    /// Returns `VizError::Config` for malformed TOML or unknown keys.
    pub fn from_toml_str(text: &str) -> VizResult<Self> {
        toml::from_str(text).map_err(|e| VizError::Config {
            message: e.to_string(),
        })
    }

    /// Renders the configuration as TOML.
    ///
    /// # Errors
    ///
    /// Returns `VizError::Config` if serialization fails.
    pub fn to_toml_string(&self) -> VizResult<String> {
        toml::to_string(self).map_err(|e| VizError::Config {
            message: e.to_string(),
        })
    }
}

/// Styling cache capacities, in entries per tier.
///
/// Geometry is the most expensive tier to regenerate and gets the largest
/// budget. A capacity of zero disables retention for that tier while
/// keeping in-flight coalescing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    pub geometry_capacity: usize,
    pub texture_capacity: usize,
    pub shader_capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            geometry_capacity: 256,
            texture_capacity: 128,
            shader_capacity: 0,
        }
    }
}
