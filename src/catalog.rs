//! Visualization type catalog.
//!
//! Each visualization type is a registered [`VisualizationSchema`] declaring
//! the fields its `data` must carry. New types are added by registering a
//! schema; the validator and the type suggester only ever consult the catalog.

use std::fmt;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

/// Coarse shape class of a visualization type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShapeClass {
    Grid,
    PointList,
    VectorField,
    Trajectory,
    Composite,
}

impl fmt::Display for ShapeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Grid => write!(f, "grid"),
            Self::PointList => write!(f, "point_list"),
            Self::VectorField => write!(f, "vector_field"),
            Self::Trajectory => write!(f, "trajectory"),
            Self::Composite => write!(f, "composite"),
        }
    }
}

/// Expected type of a single data field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    /// Rectangular 2-D numeric array.
    Grid,
    /// `[west, south, east, north]`.
    Bounds,
    /// 1-D numeric list.
    NumberList,
    /// Numeric array of any rank >= 1.
    NumericArray,
    /// 3-D numeric array with a 3 or 4 channel axis first or last.
    Texture,
    /// Objects with numeric `lat`/`lon`, or an `N x 2|3` numeric array.
    PointList,
    /// Point list whose optional `timestamp`s are non-decreasing.
    Positions,
    /// Object with numeric `lats` and `lons` lists.
    GridPoints,
    Text,
    TextList,
    Number,
    Object,
    /// Objects each carrying `visualization_type` and `data`.
    LayerList,
}

impl FieldKind {
    /// Short description used in error messages.
    #[must_use]
    pub const fn describe(self) -> &'static str {
        match self {
            Self::Grid => "a 2-d numeric grid",
            Self::Bounds => "[west, south, east, north]",
            Self::NumberList => "a list of numbers",
            Self::NumericArray => "a numeric array",
            Self::Texture => "a 3-d channel texture",
            Self::PointList => "a list of points",
            Self::Positions => "a list of positions",
            Self::GridPoints => "an object with lats and lons",
            Self::Text => "a string",
            Self::TextList => "a list of strings",
            Self::Number => "a number",
            Self::Object => "an object",
            Self::LayerList => "a list of layers",
        }
    }
}

/// One field of a schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
    pub required: bool,
}

impl FieldSpec {
    #[must_use]
    pub fn required(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: true,
        }
    }

    #[must_use]
    pub fn optional(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: false,
        }
    }
}

/// Cross-field constraint, checked only when both fields are present and valid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum ConsistencyRule {
    SameLength { left: String, right: String },
    SameShape { left: String, right: String },
}

impl ConsistencyRule {
    #[must_use]
    pub fn same_length(left: impl Into<String>, right: impl Into<String>) -> Self {
        Self::SameLength {
            left: left.into(),
            right: right.into(),
        }
    }

    #[must_use]
    pub fn same_shape(left: impl Into<String>, right: impl Into<String>) -> Self {
        Self::SameShape {
            left: left.into(),
            right: right.into(),
        }
    }
}

/// Static description of what one visualization type requires of `data`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisualizationSchema {
    pub name: String,
    pub description: String,
    pub shape: ShapeClass,
    pub fields: Vec<FieldSpec>,
    #[serde(default)]
    pub rules: Vec<ConsistencyRule>,
}

impl VisualizationSchema {
    #[must_use]
    pub fn new(name: impl Into<String>, shape: ShapeClass) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            shape,
            fields: Vec::new(),
            rules: Vec::new(),
        }
    }

    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    #[must_use]
    pub fn field(mut self, spec: FieldSpec) -> Self {
        self.fields.push(spec);
        self
    }

    #[must_use]
    pub fn rule(mut self, rule: ConsistencyRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn required_fields(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields.iter().filter(|f| f.required)
    }

    #[must_use]
    pub fn field_spec(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// JSON description for catalog discovery consumers.
    #[must_use]
    pub fn describe(&self) -> serde_json::Value {
        let required: Vec<&str> = self.required_fields().map(|f| f.name.as_str()).collect();
        let optional: Vec<&str> = self
            .fields
            .iter()
            .filter(|f| !f.required)
            .map(|f| f.name.as_str())
            .collect();
        let kinds: serde_json::Map<String, serde_json::Value> = self
            .fields
            .iter()
            .map(|f| (f.name.clone(), serde_json::Value::String(f.kind.describe().to_string())))
            .collect();
        serde_json::json!({
            "name": self.name,
            "description": self.description,
            "shape": self.shape.to_string(),
            "required_fields": required,
            "optional_fields": optional,
            "field_types": kinds,
        })
    }
}

/// Ordered set of visualization schemas.
///
/// Declaration order is significant: it breaks ties when ranking suggestions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaCatalog {
    schemas: Vec<VisualizationSchema>,
}

static BUILTIN: OnceLock<SchemaCatalog> = OnceLock::new();

impl SchemaCatalog {
    /// Empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared catalog of the built-in types.
    pub fn builtin() -> &'static Self {
        BUILTIN.get_or_init(Self::with_builtins)
    }

    /// Owned copy of the built-in catalog, for extension.
    #[must_use]
    pub fn with_builtins() -> Self {
        use FieldKind as K;
        use FieldSpec as F;

        let mut catalog = Self::new();
        catalog.register(
            VisualizationSchema::new("heatmap", ShapeClass::Grid)
                .description("Scalar grid draped over a geographic extent")
                .field(F::required("grid", K::Grid))
                .field(F::required("bounds", K::Bounds))
                .field(F::optional("values_range", K::NumberList))
                .field(F::optional("resolution", K::Number))
                .field(F::optional("units", K::Text)),
        );
        catalog.register(
            VisualizationSchema::new("contour", ShapeClass::Grid)
                .description("Iso-lines extracted from a scalar grid")
                .field(F::required("grid", K::Grid))
                .field(F::required("bounds", K::Bounds))
                .field(F::optional("levels", K::NumberList))
                .field(F::optional("units", K::Text)),
        );
        catalog.register(
            VisualizationSchema::new("terrain", ShapeClass::Grid)
                .description("Elevation grid rendered as a displaced surface")
                .field(F::required("elevation", K::Grid))
                .field(F::required("bounds", K::Bounds))
                .field(F::optional("vertical_scale", K::Number)),
        );
        catalog.register(
            VisualizationSchema::new("point_cloud", ShapeClass::PointList)
                .description("Discrete measurements at point locations")
                .field(F::required("locations", K::PointList))
                .field(F::required("values", K::NumberList))
                .field(F::optional("point_ids", K::TextList))
                .field(F::optional("units", K::Text))
                .rule(ConsistencyRule::same_length("locations", "values"))
                .rule(ConsistencyRule::same_length("point_ids", "locations")),
        );
        catalog.register(
            VisualizationSchema::new("vector_field", ShapeClass::VectorField)
                .description("Directional field from paired u/v components")
                .field(F::required("grid_points", K::GridPoints))
                .field(F::required("u_component", K::NumericArray))
                .field(F::required("v_component", K::NumericArray))
                .field(F::optional("magnitude", K::NumericArray))
                .field(F::optional("units", K::Text))
                .rule(ConsistencyRule::same_shape("u_component", "v_component"))
                .rule(ConsistencyRule::same_shape("magnitude", "u_component")),
        );
        catalog.register(
            VisualizationSchema::new("trajectory", ShapeClass::Trajectory)
                .description("Time-ordered path of positions")
                .field(F::required("positions", K::Positions))
                .field(F::optional("intensities", K::NumberList))
                .field(F::optional("track_id", K::Text))
                .rule(ConsistencyRule::same_length("intensities", "positions")),
        );
        catalog.register(
            VisualizationSchema::new("flat_overlay", ShapeClass::Grid)
                .description("Pre-rendered RGBA texture on a flat plane")
                .field(F::required("texture", K::Texture))
                .field(F::optional("bounds", K::Bounds)),
        );
        catalog.register(
            VisualizationSchema::new("multi_layer", ShapeClass::Composite)
                .description("Stack of independently typed layers")
                .field(F::required("layers", K::LayerList)),
        );
        catalog
    }

    /// Adds a schema, replacing (in place) any schema with the same name.
    ///
    /// Returns the replaced schema.
    pub fn register(&mut self, schema: VisualizationSchema) -> Option<VisualizationSchema> {
        if let Some(slot) = self.schemas.iter_mut().find(|s| s.name == schema.name) {
            return Some(std::mem::replace(slot, schema));
        }
        self.schemas.push(schema);
        None
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&VisualizationSchema> {
        self.schemas.iter().find(|s| s.name == name)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Type names in declaration order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.schemas.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &VisualizationSchema> {
        self.schemas.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}

/// Names of the built-in visualization types, in declaration order.
#[must_use]
pub fn available_visualization_types() -> Vec<&'static str> {
    SchemaCatalog::builtin().names()
}
