//! Data package: the unit of delivery to renderers.
//!
//! A package couples a `data` map with a [`Time`] stamp and the
//! visualization type that says how `data` must be shaped. Satellite
//! structures are optional and owned exclusively by the package.

use serde_json::json;

use crate::agent::MultiAgentContext;
use crate::context::{MultiResolutionData, SemanticContext, VisualSummary};
use crate::error::{ValidationError, VizError, VizResult};
use crate::time::Time;
use crate::validation;
use crate::value::{DataMap, DataValue};

/// A visualization-ready data package.
///
/// # Examples
///
/// ```
/// use vizpack::{DataPackage, NdArray, Time};
///
/// let package = DataPackage::builder()
///     .id("nyc-temp-001")
///     .visualization_type("heatmap")
///     .time(Time::now())
///     .field("grid", NdArray::from_grid(vec![vec![20.0, 21.5], vec![22.0, 23.1]]).unwrap())
///     .field("bounds", serde_json::json!([-74.1, 40.6, -73.9, 40.9]))
///     .build()
///     .unwrap();
///
/// assert!(package.is_well_formed());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct DataPackage {
    pub id: String,
    pub data: DataMap,
    pub time: Time,
    pub visualization_type: String,
    pub metadata: serde_json::Map<String, serde_json::Value>,

    pub semantic_context: Option<SemanticContext>,
    pub visual_summary: Option<VisualSummary>,
    pub multi_resolution: Option<MultiResolutionData>,
    pub agent_context: Option<MultiAgentContext>,
}

impl DataPackage {
    /// Creates a new package builder.
    #[must_use]
    pub fn builder() -> DataPackageBuilder {
        DataPackageBuilder::new()
    }

    /// Checks `data` against the schema of the declared visualization type.
    ///
    /// An uncataloged type yields a single advisory. Processed variants are
    /// checked only for values the wire format cannot carry.
    #[must_use]
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = validation::validate(&self.data, &self.visualization_type);
        if let Some(levels) = &self.multi_resolution {
            for (variant, data) in &levels.processed_variants {
                let prefix = format!("multiResolutionData.processedVariants.{variant}.");
                errors.extend(validation::array_lookalikes(data, &prefix));
            }
        }
        errors
    }

    /// Returns true if validation found nothing but advisories.
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        self.validate().iter().all(ValidationError::is_advisory)
    }

    /// Fails with every validation error when the package is not well formed.
    ///
    /// # Errors
    ///
    /// Returns `VizError::Invalid` carrying the non-advisory errors.
    pub fn ensure_valid(&self) -> VizResult<()> {
        let errors: Vec<ValidationError> = self
            .validate()
            .into_iter()
            .filter(|e| !e.is_advisory())
            .collect();
        if errors.is_empty() {
            return Ok(());
        }
        Err(VizError::Invalid {
            package_id: self.id.clone(),
            visualization_type: self.visualization_type.clone(),
            errors,
        })
    }

    /// Returns true if any enhanced satellite is attached.
    #[must_use]
    pub const fn is_enhanced(&self) -> bool {
        self.semantic_context.is_some()
            || self.visual_summary.is_some()
            || self.multi_resolution.is_some()
            || self.agent_context.is_some()
    }

    pub fn get(&self, field: &str) -> Option<&DataValue> {
        self.data.get(field)
    }

    /// Compact digest of the package for language-model consumers.
    #[must_use]
    pub fn llm_summary(&self) -> serde_json::Value {
        let fields: serde_json::Map<String, serde_json::Value> = self
            .data
            .iter()
            .map(|(name, value)| {
                let desc = match value.numeric_shape() {
                    Some(shape) if !shape.is_empty() => json!({ "shape": shape }),
                    _ => json!({ "type": value.type_name() }),
                };
                (name.clone(), desc)
            })
            .collect();

        let mut summary = json!({
            "id": self.id,
            "visualizationType": self.visualization_type,
            "time": {
                "type": self.time.kind(),
                "start": self.time.start().to_rfc3339(),
                "end": self.time.end().to_rfc3339(),
                "instants": self.time.len(),
            },
            "fields": fields,
        });

        if let Some(ctx) = &self.semantic_context {
            summary["description"] = json!(ctx.natural_description);
            summary["tags"] = json!(ctx.semantic_tags);
            summary["keywords"] = json!(ctx.search_keywords);
        }
        if let Some(agents) = &self.agent_context {
            summary["agentContext"] = json!(agents.summary());
        }
        if let Some(mr) = &self.multi_resolution {
            summary["resolutionLevels"] = json!(mr.levels());
        }
        summary
    }
}

/// Builder for creating `DataPackage` instances.
///
/// `build` checks presence only; schema conformance is checked by
/// [`DataPackage::validate`], so a built package may still be invalid.
#[derive(Debug, Default)]
pub struct DataPackageBuilder {
    id: Option<String>,
    data: DataMap,
    time: Option<Time>,
    visualization_type: Option<String>,
    metadata: serde_json::Map<String, serde_json::Value>,
    semantic_context: Option<SemanticContext>,
    visual_summary: Option<VisualSummary>,
    multi_resolution: Option<MultiResolutionData>,
}

impl DataPackageBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    #[must_use]
    pub fn time(mut self, time: Time) -> Self {
        self.time = Some(time);
        self
    }

    #[must_use]
    pub fn visualization_type(mut self, visualization_type: impl Into<String>) -> Self {
        self.visualization_type = Some(visualization_type.into());
        self
    }

    /// Sets one data field, replacing any previous value.
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, value: impl Into<DataValue>) -> Self {
        self.data.insert(name.into(), value.into());
        self
    }

    /// Replaces the whole data map.
    #[must_use]
    pub fn data(mut self, data: DataMap) -> Self {
        self.data = data;
        self
    }

    #[must_use]
    pub fn metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    #[must_use]
    pub fn semantic_context(mut self, ctx: SemanticContext) -> Self {
        self.semantic_context = Some(ctx);
        self
    }

    #[must_use]
    pub fn visual_summary(mut self, summary: VisualSummary) -> Self {
        self.visual_summary = Some(summary);
        self
    }

    #[must_use]
    pub fn multi_resolution(mut self, levels: MultiResolutionData) -> Self {
        self.multi_resolution = Some(levels);
        self
    }

    /// Builds the package.
    /// Returns `ValidationError` if the id, time or visualization type is missing.
    pub fn build(self) -> Result<DataPackage, ValidationError> {
        let id = self.id.ok_or(ValidationError::MissingField {
            field: "id".to_string(),
        })?;
        if id.trim().is_empty() {
            return Err(ValidationError::EmptyField { field: "id".to_string() });
        }

        let time = self.time.ok_or(ValidationError::MissingField {
            field: "time".to_string(),
        })?;
        time.validate()?;

        let visualization_type = self.visualization_type.ok_or(ValidationError::MissingField {
            field: "visualization_type".to_string(),
        })?;
        if visualization_type.trim().is_empty() {
            return Err(ValidationError::EmptyField {
                field: "visualization_type".to_string(),
            });
        }

        Ok(DataPackage {
            id,
            data: self.data,
            time,
            visualization_type,
            metadata: self.metadata,
            semantic_context: self.semantic_context,
            visual_summary: self.visual_summary,
            multi_resolution: self.multi_resolution,
            agent_context: None,
        })
    }
}
