//! Structural validation of package data.
//!
//! The validator checks `data` against the catalog schema of a
//! visualization type and returns every violation it finds, so a producer
//! can fix all of them in one pass. It also ranks catalog types by how
//! well an unlabelled `data` map fits them.

use chrono::{DateTime, Utc};

use crate::catalog::{ConsistencyRule, FieldKind, SchemaCatalog, VisualizationSchema};
use crate::error::ValidationError;
use crate::value::{json_type_name, DataMap, DataValue};

/// Maximum nesting of composite layers.
pub const MAX_LAYER_DEPTH: usize = 8;

/// Validate `data` against the built-in catalog.
#[must_use]
pub fn validate(data: &DataMap, visualization_type: &str) -> Vec<ValidationError> {
    Validator::new(SchemaCatalog::builtin()).validate(data, visualization_type)
}

/// Rank built-in visualization types for `data`, best first.
#[must_use]
pub fn suggest(data: &DataMap) -> Vec<String> {
    Validator::new(SchemaCatalog::builtin()).suggest(data)
}

/// Validator bound to a catalog.
#[derive(Debug, Clone, Copy)]
pub struct Validator<'a> {
    catalog: &'a SchemaCatalog,
}

impl<'a> Validator<'a> {
    #[must_use]
    pub const fn new(catalog: &'a SchemaCatalog) -> Self {
        Self { catalog }
    }

    /// Returns every violation of the schema for `visualization_type`.
    ///
    /// An uncataloged type yields one advisory error, plus an error for each
    /// field that could not survive the wire.
    #[must_use]
    pub fn validate(&self, data: &DataMap, visualization_type: &str) -> Vec<ValidationError> {
        let mut errors = self.validate_at_depth(data, visualization_type, 0);
        errors.extend(array_lookalikes(data, ""));
        errors
    }

    fn validate_at_depth(
        &self,
        data: &DataMap,
        visualization_type: &str,
        depth: usize,
    ) -> Vec<ValidationError> {
        let Some(schema) = self.catalog.get(visualization_type) else {
            return vec![ValidationError::UnknownVisualizationType {
                visualization_type: visualization_type.to_string(),
            }];
        };

        let mut errors = Vec::new();
        let mut valid_fields: Vec<&str> = Vec::new();

        for spec in &schema.fields {
            match data.get(&spec.name) {
                None if spec.required => errors.push(ValidationError::MissingField {
                    field: spec.name.clone(),
                }),
                None => {}
                Some(value) => {
                    let before = errors.len();
                    self.check_field(&spec.name, spec.kind, value, depth, &mut errors);
                    if errors.len() == before {
                        valid_fields.push(&spec.name);
                    }
                }
            }
        }

        for rule in &schema.rules {
            check_rule(rule, data, &valid_fields, &mut errors);
        }

        errors
    }

    /// Ranks catalog types by the number of required fields present and
    /// shape compatible in `data`.
    ///
    /// Types scoring zero are omitted; ties keep catalog order.
    #[must_use]
    pub fn suggest(&self, data: &DataMap) -> Vec<String> {
        let mut scored: Vec<(usize, &VisualizationSchema)> = self
            .catalog
            .iter()
            .map(|schema| (self.score(schema, data), schema))
            .filter(|(score, _)| *score > 0)
            .collect();
        // Stable sort keeps declaration order among equal scores.
        scored.sort_by(|a, b| b.0.cmp(&a.0));
        scored.into_iter().map(|(_, s)| s.name.clone()).collect()
    }

    fn score(&self, schema: &VisualizationSchema, data: &DataMap) -> usize {
        schema
            .required_fields()
            .filter(|spec| {
                data.get(&spec.name).is_some_and(|value| {
                    let mut scratch = Vec::new();
                    self.check_field(&spec.name, spec.kind, value, 0, &mut scratch);
                    scratch.iter().all(ValidationError::is_advisory)
                })
            })
            .count()
    }

    fn check_field(
        &self,
        field: &str,
        kind: FieldKind,
        value: &DataValue,
        depth: usize,
        errors: &mut Vec<ValidationError>,
    ) {
        let result = match kind {
            FieldKind::Grid => check_grid(field, value),
            FieldKind::Bounds => check_bounds(field, value),
            FieldKind::NumberList => check_rank(field, value, kind, 1, 1),
            FieldKind::NumericArray => check_rank(field, value, kind, 1, usize::MAX),
            FieldKind::Texture => check_texture(field, value),
            FieldKind::PointList => check_points(field, value, false),
            FieldKind::Positions => check_points(field, value, true),
            FieldKind::GridPoints => check_grid_points(field, value),
            FieldKind::Text => check_json(field, value, kind, serde_json::Value::is_string),
            FieldKind::Number => check_json(field, value, kind, serde_json::Value::is_number),
            FieldKind::Object => check_json(field, value, kind, serde_json::Value::is_object),
            FieldKind::TextList => check_json(field, value, kind, |v| {
                v.as_array().is_some_and(|items| items.iter().all(serde_json::Value::is_string))
            }),
            FieldKind::LayerList => {
                self.check_layers(field, value, depth, errors);
                Ok(())
            }
        };
        if let Err(e) = result {
            errors.push(e);
        }
    }

    fn check_layers(
        &self,
        field: &str,
        value: &DataValue,
        depth: usize,
        errors: &mut Vec<ValidationError>,
    ) {
        let Some(layers) = value.as_json().and_then(serde_json::Value::as_array) else {
            errors.push(type_mismatch(field, FieldKind::LayerList, value));
            return;
        };
        if layers.is_empty() {
            errors.push(ValidationError::EmptyField { field: field.to_string() });
            return;
        }
        if depth >= MAX_LAYER_DEPTH {
            errors.push(ValidationError::InvalidShape {
                field: field.to_string(),
                reason: format!("layers nest deeper than {MAX_LAYER_DEPTH}"),
            });
            return;
        }

        for (i, layer) in layers.iter().enumerate() {
            let prefix = format!("{field}[{i}]");
            let vt = layer.get("visualization_type").and_then(serde_json::Value::as_str);
            let data = layer.get("data").and_then(serde_json::Value::as_object);
            let (Some(vt), Some(data)) = (vt, data) else {
                errors.push(ValidationError::InvalidShape {
                    field: prefix,
                    reason: "layer needs a string visualization_type and an object data".to_string(),
                });
                continue;
            };

            let mut layer_data = DataMap::new();
            for (k, v) in data {
                match DataValue::from_json(v.clone()) {
                    Ok(dv) => {
                        layer_data.insert(k.clone(), dv);
                    }
                    Err(reason) => errors.push(ValidationError::InvalidShape {
                        field: format!("{prefix}.{k}"),
                        reason,
                    }),
                }
            }

            for err in self.validate_at_depth(&layer_data, vt, depth + 1) {
                errors.push(match err {
                    advisory @ ValidationError::UnknownVisualizationType { .. } => advisory,
                    other => ValidationError::InvalidShape {
                        field: format!("{prefix}.{}", other.field().unwrap_or("data")),
                        reason: other.to_string(),
                    },
                });
            }
        }
    }
}

/// Fields holding a JSON object that would decode as an encoded array.
pub(crate) fn array_lookalikes<'a>(
    data: &'a DataMap,
    prefix: &'a str,
) -> impl Iterator<Item = ValidationError> + 'a {
    data.iter()
        .filter(|(_, value)| value.is_array_lookalike())
        .map(move |(name, _)| ValidationError::InvalidShape {
            field: format!("{prefix}{name}"),
            reason: "object uses exactly the keys reserved for encoded arrays (shape, dtype, values)".to_string(),
        })
}

fn type_mismatch(field: &str, kind: FieldKind, value: &DataValue) -> ValidationError {
    ValidationError::TypeMismatch {
        field: field.to_string(),
        expected: kind.describe().to_string(),
        found: value.type_name(),
    }
}

fn invalid_shape(field: &str, reason: impl Into<String>) -> ValidationError {
    ValidationError::InvalidShape {
        field: field.to_string(),
        reason: reason.into(),
    }
}

fn is_json_list(value: &DataValue) -> bool {
    matches!(value, DataValue::Json(serde_json::Value::Array(_)))
}

fn check_grid(field: &str, value: &DataValue) -> Result<(), ValidationError> {
    match value.numeric_shape() {
        Some(shape) if shape.len() == 2 && shape[0] > 0 && shape[1] > 0 => Ok(()),
        Some(shape) if shape.len() == 2 => Err(invalid_shape(field, "grid has no cells")),
        Some(shape) => Err(invalid_shape(
            field,
            format!("expected 2 dimensions, found {}", shape.len()),
        )),
        None if is_json_list(value) => Err(invalid_shape(
            field,
            "grid must be rectangular with numeric cells",
        )),
        None => Err(type_mismatch(field, FieldKind::Grid, value)),
    }
}

fn check_bounds(field: &str, value: &DataValue) -> Result<(), ValidationError> {
    let (Some(shape), Some(values)) = (value.numeric_shape(), value.numeric_values()) else {
        return Err(type_mismatch(field, FieldKind::Bounds, value));
    };
    if shape != [4] {
        return Err(invalid_shape(field, format!("expected 4 numbers, found shape {shape:?}")));
    }
    if values.iter().any(|v| !v.is_finite()) {
        return Err(invalid_shape(field, "bounds must be finite"));
    }
    let (south, north) = (values[1], values[3]);
    if south > north {
        return Err(invalid_shape(field, format!("south ({south}) is above north ({north})")));
    }
    Ok(())
}

fn check_rank(
    field: &str,
    value: &DataValue,
    kind: FieldKind,
    min_rank: usize,
    max_rank: usize,
) -> Result<(), ValidationError> {
    match value.numeric_shape() {
        Some(shape) if (min_rank..=max_rank).contains(&shape.len()) => Ok(()),
        Some(shape) => Err(invalid_shape(
            field,
            format!("unexpected rank {} for {}", shape.len(), kind.describe()),
        )),
        None if is_json_list(value) => Err(invalid_shape(
            field,
            "list must be rectangular with numeric elements",
        )),
        None => Err(type_mismatch(field, kind, value)),
    }
}

fn check_texture(field: &str, value: &DataValue) -> Result<(), ValidationError> {
    let Some(shape) = value.numeric_shape() else {
        return Err(type_mismatch(field, FieldKind::Texture, value));
    };
    let channels_ok = |c: usize| c == 3 || c == 4;
    if shape.len() != 3 || !(channels_ok(shape[0]) || channels_ok(shape[2])) {
        return Err(invalid_shape(
            field,
            format!("expected channels x height x width or height x width x channels, found {shape:?}"),
        ));
    }
    Ok(())
}

fn check_points(field: &str, value: &DataValue, time_ordered: bool) -> Result<(), ValidationError> {
    let kind = if time_ordered { FieldKind::Positions } else { FieldKind::PointList };

    if let Some(shape) = value.numeric_shape() {
        return match shape.as_slice() {
            [_, 2 | 3] => Ok(()),
            [0] => Ok(()),
            _ => Err(invalid_shape(field, format!("coordinate array must be N x 2 or N x 3, found {shape:?}"))),
        };
    }

    let Some(items) = value.as_json().and_then(serde_json::Value::as_array) else {
        return Err(type_mismatch(field, kind, value));
    };

    let mut previous: Option<DateTime<Utc>> = None;
    for (i, item) in items.iter().enumerate() {
        let has_coords = ["lat", "lon"]
            .iter()
            .all(|k| item.get(*k).is_some_and(serde_json::Value::is_number));
        if !has_coords {
            return Err(invalid_shape(
                field,
                format!("element {i} ({}) lacks numeric lat/lon", json_type_name(item)),
            ));
        }
        if !time_ordered {
            continue;
        }
        let Some(ts) = item.get("timestamp") else {
            continue;
        };
        let parsed = ts
            .as_str()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|t| t.with_timezone(&Utc))
            .ok_or_else(|| invalid_shape(field, format!("element {i} has an unparseable timestamp")))?;
        if previous.is_some_and(|p| parsed < p) {
            return Err(invalid_shape(field, format!("positions are out of time order at element {i}")));
        }
        previous = Some(parsed);
    }
    Ok(())
}

fn check_grid_points(field: &str, value: &DataValue) -> Result<(), ValidationError> {
    let Some(obj) = value.as_json().and_then(serde_json::Value::as_object) else {
        return Err(type_mismatch(field, FieldKind::GridPoints, value));
    };
    for axis in ["lats", "lons"] {
        let Some(v) = obj.get(axis) else {
            return Err(invalid_shape(field, format!("missing '{axis}'")));
        };
        let ok = v
            .as_array()
            .is_some_and(|items| items.iter().all(serde_json::Value::is_number));
        if !ok {
            return Err(invalid_shape(field, format!("'{axis}' must be a list of numbers")));
        }
    }
    Ok(())
}

fn check_json(
    field: &str,
    value: &DataValue,
    kind: FieldKind,
    accepts: impl Fn(&serde_json::Value) -> bool,
) -> Result<(), ValidationError> {
    match value.as_json() {
        Some(v) if accepts(v) => Ok(()),
        _ => Err(type_mismatch(field, kind, value)),
    }
}

fn check_rule(
    rule: &ConsistencyRule,
    data: &DataMap,
    valid_fields: &[&str],
    errors: &mut Vec<ValidationError>,
) {
    let (left, right) = match rule {
        ConsistencyRule::SameLength { left, right } | ConsistencyRule::SameShape { left, right } => {
            (left.as_str(), right.as_str())
        }
    };
    if !valid_fields.contains(&left) || !valid_fields.contains(&right) {
        return;
    }
    let (Some(lv), Some(rv)) = (data.get(left), data.get(right)) else {
        return;
    };

    match rule {
        ConsistencyRule::SameLength { .. } => {
            if let (Some(l), Some(r)) = (lv.list_len(), rv.list_len()) {
                if l != r {
                    errors.push(ValidationError::LengthMismatch {
                        left: left.to_string(),
                        left_len: l,
                        right: right.to_string(),
                        right_len: r,
                    });
                }
            }
        }
        ConsistencyRule::SameShape { .. } => {
            if let (Some(l), Some(r)) = (lv.numeric_shape(), rv.numeric_shape()) {
                if l != r {
                    errors.push(ValidationError::ShapeMismatch {
                        left: left.to_string(),
                        left_shape: l,
                        right: right.to_string(),
                        right_shape: r,
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{FieldSpec, ShapeClass};
    use crate::value::NdArray;
    use serde_json::json;

    fn heatmap_data() -> DataMap {
        let mut data = DataMap::new();
        data.insert(
            "grid".to_string(),
            NdArray::from_grid(vec![vec![1.0, 2.0, 3.0]; 3]).unwrap().into(),
        );
        data.insert("bounds".to_string(), json!([-74.1, 40.6, -73.9, 40.9]).into());
        data
    }

    fn point_data(n_locations: usize, values: Vec<f64>) -> DataMap {
        let locations: Vec<_> = (0..n_locations)
            .map(|i| json!({"lat": 40.7 + i as f64 * 0.01, "lon": -74.0}))
            .collect();
        let mut data = DataMap::new();
        data.insert("locations".to_string(), json!(locations).into());
        data.insert("values".to_string(), values.into());
        data
    }

    #[test]
    fn test_heatmap_valid() {
        assert!(validate(&heatmap_data(), "heatmap").is_empty());
    }

    #[test]
    fn test_heatmap_accepts_nested_json_grid() {
        let mut data = heatmap_data();
        data.insert("grid".to_string(), json!([[1, 2], [3, 4]]).into());
        assert!(validate(&data, "heatmap").is_empty());
    }

    #[test]
    fn test_heatmap_against_point_cloud_names_missing_fields() {
        let errors = validate(&heatmap_data(), "point_cloud");
        let missing: Vec<_> = errors.iter().filter_map(ValidationError::field).collect();
        assert!(missing.contains(&"locations"));
        assert!(missing.contains(&"values"));
    }

    #[test]
    fn test_reports_all_errors() {
        let mut data = DataMap::new();
        data.insert("grid".to_string(), json!([[1, 2], [3]]).into());
        data.insert("bounds".to_string(), json!([1, 2, 3]).into());
        let errors = validate(&data, "heatmap");
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().all(|e| matches!(e, ValidationError::InvalidShape { .. })));
    }

    #[test]
    fn test_bounds_south_above_north() {
        let mut data = heatmap_data();
        data.insert("bounds".to_string(), json!([-74.1, 41.0, -73.9, 40.9]).into());
        let errors = validate(&data, "heatmap");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field(), Some("bounds"));
    }

    #[test]
    fn test_point_cloud_length_mismatch() {
        let errors = validate(&point_data(3, vec![1.0, 2.0]), "point_cloud");
        assert_eq!(
            errors,
            vec![ValidationError::LengthMismatch {
                left: "locations".to_string(),
                left_len: 3,
                right: "values".to_string(),
                right_len: 2,
            }]
        );
    }

    #[test]
    fn test_point_cloud_coordinate_array() {
        let mut data = DataMap::new();
        data.insert(
            "locations".to_string(),
            NdArray::new(vec![2, 2], crate::value::DType::Float64, vec![40.7, -74.0, 40.8, -74.1])
                .unwrap()
                .into(),
        );
        data.insert("values".to_string(), vec![1.0, 2.0].into());
        assert!(validate(&data, "point_cloud").is_empty());
    }

    #[test]
    fn test_vector_components_must_match() {
        let mut data = DataMap::new();
        data.insert("grid_points".to_string(), json!({"lats": [40.0, 41.0], "lons": [-74.0]}).into());
        data.insert("u_component".to_string(), json!([[1.0, 2.0], [3.0, 4.0]]).into());
        data.insert("v_component".to_string(), json!([[1.0, 2.0]]).into());
        let errors = validate(&data, "vector_field");
        assert!(matches!(errors.as_slice(), [ValidationError::ShapeMismatch { .. }]));
    }

    #[test]
    fn test_trajectory_out_of_order() {
        let mut data = DataMap::new();
        data.insert(
            "positions".to_string(),
            json!([
                {"lat": 25.0, "lon": -80.0, "timestamp": "2023-09-01T12:00:00Z"},
                {"lat": 25.5, "lon": -80.5, "timestamp": "2023-09-01T06:00:00Z"},
            ])
            .into(),
        );
        let errors = validate(&data, "trajectory");
        assert_eq!(errors.len(), 1);
        assert!(errors[0].to_string().contains("time order"));
    }

    #[test]
    fn test_array_lookalike_objects_rejected() {
        let mut data = heatmap_data();
        data.insert("legend".to_string(), json!({"shape": "circle", "dtype": "label", "values": "hot"}).into());
        let errors = validate(&data, "heatmap");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field(), Some("legend"));

        let errors = validate(&data, "hologram");
        assert_eq!(errors.len(), 2);
        assert_eq!(errors.iter().filter(|e| e.is_advisory()).count(), 1);
    }

    #[test]
    fn test_unknown_type_single_advisory() {
        let errors = validate(&heatmap_data(), "hologram");
        assert_eq!(errors.len(), 1);
        assert!(errors[0].is_advisory());
    }

    #[test]
    fn test_multi_layer_recurses() {
        let mut data = DataMap::new();
        data.insert(
            "layers".to_string(),
            json!([
                {"visualization_type": "heatmap", "data": {"grid": [[1, 2]], "bounds": [0, 0, 1, 1]}},
                {"visualization_type": "point_cloud", "data": {"locations": []}},
            ])
            .into(),
        );
        let errors = validate(&data, "multi_layer");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field(), Some("layers[1].values"));
    }

    #[test]
    fn test_suggest_point_cloud_first() {
        let ranked = suggest(&point_data(2, vec![22.5, 21.8]));
        assert_eq!(ranked.first().map(String::as_str), Some("point_cloud"));
        let pc = ranked.iter().position(|n| n == "point_cloud");
        let vf = ranked.iter().position(|n| n == "vector_field");
        assert!(vf.map_or(true, |vf| pc < Some(vf)));
    }

    #[test]
    fn test_suggest_ties_follow_declaration_order() {
        let ranked = suggest(&heatmap_data());
        assert_eq!(&ranked[..2], &["heatmap".to_string(), "contour".to_string()]);
        assert!(ranked.contains(&"terrain".to_string()));
    }

    #[test]
    fn test_custom_catalog() {
        let mut catalog = SchemaCatalog::new();
        catalog.register(
            VisualizationSchema::new("volume", ShapeClass::Grid)
                .field(FieldSpec::required("voxels", FieldKind::NumericArray)),
        );
        let validator = Validator::new(&catalog);
        let mut data = DataMap::new();
        data.insert("voxels".to_string(), json!([[[1, 2]]]).into());
        assert!(validator.validate(&data, "volume").is_empty());
        assert_eq!(validator.suggest(&data), vec!["volume".to_string()]);
    }
}
