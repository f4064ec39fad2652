//! Styling parameters applied over a geometry's data domain.

use serde::{Deserialize, Serialize};

use crate::cache::key::{fingerprint_json, Fingerprint};
use crate::error::GenerationError;

pub const DEFAULT_COLORMAP: &str = "viridis";

/// Upper bound on contour levels.
pub const MAX_LEVELS: u32 = 1024;

/// Appearance parameters. Changing any of them never changes geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StylingConfig {
    pub colormap: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    pub opacity: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub levels: Option<u32>,
    /// Renderer-specific parameters, passed through to shader documents.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Default for StylingConfig {
    fn default() -> Self {
        Self {
            colormap: DEFAULT_COLORMAP.to_string(),
            min: None,
            max: None,
            opacity: 1.0,
            levels: None,
            extra: serde_json::Map::new(),
        }
    }
}

impl StylingConfig {
    #[must_use]
    pub fn new(colormap: impl Into<String>) -> Self {
        Self {
            colormap: colormap.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn range(mut self, min: f64, max: f64) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self
    }

    #[must_use]
    pub fn opacity(mut self, opacity: f64) -> Self {
        self.opacity = opacity;
        self
    }

    #[must_use]
    pub fn levels(mut self, levels: u32) -> Self {
        self.levels = Some(levels);
        self
    }

    #[must_use]
    pub fn extra(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// Checks parameter ranges.
    ///
    /// Colormap names are checked by the generator, which knows which ramps it has.
    ///
    /// # Errors
    ///
    /// Returns `GenerationError::InvalidStyling` describing the first problem.
    pub fn validate(&self) -> Result<(), GenerationError> {
        let fail = |reason: String| Err(GenerationError::InvalidStyling { reason });

        if self.colormap.trim().is_empty() {
            return fail("colormap is empty".to_string());
        }
        if !(0.0..=1.0).contains(&self.opacity) {
            return fail(format!("opacity {} is outside [0, 1]", self.opacity));
        }
        for (name, bound) in [("min", self.min), ("max", self.max)] {
            if bound.is_some_and(|v| !v.is_finite()) {
                return fail(format!("{name} is not finite"));
            }
        }
        if let (Some(min), Some(max)) = (self.min, self.max) {
            if min >= max {
                return fail(format!("min ({min}) must be below max ({max})"));
            }
        }
        if let Some(levels) = self.levels {
            if levels == 0 || levels > MAX_LEVELS {
                return fail(format!("levels must be in 1..={MAX_LEVELS}, got {levels}"));
            }
        }
        Ok(())
    }

    /// Value range to map onto the colormap, falling back to the data range.
    #[must_use]
    pub fn resolve_range(&self, data_range: Option<(f64, f64)>) -> (f64, f64) {
        let (lo, hi) = data_range.unwrap_or((0.0, 1.0));
        let min = self.min.unwrap_or(lo);
        let max = self.max.unwrap_or(hi);
        if max > min {
            (min, max)
        } else {
            (min, min + 1.0)
        }
    }

    #[must_use]
    pub fn fingerprint(&self) -> Fingerprint {
        fingerprint_json(&serde_json::to_value(self).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults_validate() {
        assert!(StylingConfig::default().validate().is_ok());
    }

    #[test]
    fn test_invalid_ranges() {
        assert!(StylingConfig::default().opacity(1.5).validate().is_err());
        assert!(StylingConfig::default().range(10.0, 5.0).validate().is_err());
        assert!(StylingConfig::default().levels(0).validate().is_err());
        assert!(StylingConfig::new(" ").validate().is_err());
        assert!(StylingConfig::default().opacity(f64::NAN).validate().is_err());
    }

    #[test]
    fn test_fingerprint_tracks_every_parameter() {
        let base = StylingConfig::default();
        assert_eq!(base.fingerprint(), StylingConfig::default().fingerprint());
        assert_ne!(base.fingerprint(), StylingConfig::new("coolwarm").fingerprint());
        assert_ne!(base.fingerprint(), base.clone().opacity(0.5).fingerprint());
        assert_ne!(base.fingerprint(), base.clone().extra("animate", json!(true)).fingerprint());
    }

    #[test]
    fn test_wire_form_flattens_extras() {
        let styling: StylingConfig = serde_json::from_value(json!({
            "colormap": "coolwarm",
            "min": -5.0,
            "max": 40.0,
            "wind_scale": 2.5
        }))
        .unwrap();
        assert_eq!(styling.colormap, "coolwarm");
        assert!((styling.opacity - 1.0).abs() < f64::EPSILON);
        assert_eq!(styling.extra.get("wind_scale"), Some(&json!(2.5)));
    }

    #[test]
    fn test_resolve_range_prefers_explicit() {
        let s = StylingConfig::default().range(0.0, 10.0);
        assert_eq!(s.resolve_range(Some((3.0, 4.0))), (0.0, 10.0));
        assert_eq!(StylingConfig::default().resolve_range(Some((3.0, 4.0))), (3.0, 4.0));
        assert_eq!(StylingConfig::default().resolve_range(Some((2.0, 2.0))), (2.0, 3.0));
    }
}
