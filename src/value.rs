//! Values held in a package's `data` map.
//!
//! Numeric payloads are carried as [`NdArray`] so the wire form keeps the
//! shape and element type next to the flattened values. Everything else a
//! producer puts in `data` is an open JSON value.

use std::collections::BTreeMap;
use std::fmt;

use serde::de::{self, Deserializer};
use serde::ser::{SerializeSeq, SerializeStruct, Serializer};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Field name → value map used for package data and resolution levels.
pub type DataMap = BTreeMap<String, DataValue>;

/// Element type of a numeric array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DType {
    Float32,
    Float64,
    Int32,
    Int64,
    Uint8,
}

impl DType {
    #[must_use]
    pub const fn is_integer(self) -> bool {
        matches!(self, Self::Int32 | Self::Int64 | Self::Uint8)
    }

    /// Returns true if `value` can be stored without loss of meaning.
    #[must_use]
    pub fn admits(self, value: f64) -> bool {
        match self {
            Self::Float32 | Self::Float64 => true,
            Self::Int32 => is_integral(value) && (f64::from(i32::MIN)..=f64::from(i32::MAX)).contains(&value),
            #[allow(clippy::cast_precision_loss)]
            Self::Int64 => is_integral(value) && (i64::MIN as f64..=i64::MAX as f64).contains(&value),
            Self::Uint8 => is_integral(value) && (0.0..=255.0).contains(&value),
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Float32 => "float32",
            Self::Float64 => "float64",
            Self::Int32 => "int32",
            Self::Int64 => "int64",
            Self::Uint8 => "uint8",
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn is_integral(value: f64) -> bool {
    value.is_finite() && value.fract() == 0.0
}

/// A dense, row-major numeric array.
///
/// Missing cells are `NaN` (floating dtypes only) and travel as JSON `null`.
/// Infinite cells travel as the strings `"Infinity"` and `"-Infinity"`.
///
/// # Examples
///
/// ```
/// use vizpack::{DType, NdArray};
///
/// let grid = NdArray::from_grid(vec![vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap();
/// assert_eq!(grid.shape(), &[2, 2]);
/// assert_eq!(grid.dtype(), DType::Float64);
/// assert!(NdArray::from_grid(vec![vec![1.0], vec![2.0, 3.0]]).is_err());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct NdArray {
    shape: Vec<usize>,
    dtype: DType,
    values: Vec<f64>,
}

impl NdArray {
    /// Creates an array, checking that `values` fills `shape` and fits `dtype`.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidShape` if the shape's cell count
    /// overflows `usize`, otherwise `ValidationError::ArrayLength` or
    /// `ValidationError::ArrayValue`.
    pub fn new(shape: Vec<usize>, dtype: DType, values: Vec<f64>) -> Result<Self, ValidationError> {
        let Some(expected) = shape.iter().try_fold(1usize, |acc, &dim| acc.checked_mul(dim)) else {
            return Err(ValidationError::InvalidShape {
                field: "shape".to_string(),
                reason: format!("{shape:?} holds more cells than can be addressed"),
            });
        };
        if expected != values.len() {
            return Err(ValidationError::ArrayLength {
                shape,
                expected,
                actual: values.len(),
            });
        }
        if dtype.is_integer() {
            if let Some((index, &value)) = values.iter().enumerate().find(|(_, v)| !dtype.admits(**v)) {
                return Err(ValidationError::ArrayValue {
                    index,
                    value,
                    dtype: dtype.to_string(),
                });
            }
        }
        Ok(Self { shape, dtype, values })
    }

    /// One-dimensional `float64` array.
    #[must_use]
    pub fn from_vec(values: Vec<f64>) -> Self {
        Self {
            shape: vec![values.len()],
            dtype: DType::Float64,
            values,
        }
    }

    /// Two-dimensional `float64` array from rows.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidShape` when rows differ in length.
    pub fn from_grid(rows: Vec<Vec<f64>>) -> Result<Self, ValidationError> {
        let height = rows.len();
        let width = rows.first().map_or(0, Vec::len);
        if let Some(bad) = rows.iter().position(|r| r.len() != width) {
            return Err(ValidationError::InvalidShape {
                field: "grid".to_string(),
                reason: format!("row {bad} has {} columns, expected {width}", rows[bad].len()),
            });
        }
        Ok(Self {
            shape: vec![height, width],
            dtype: DType::Float64,
            values: rows.into_iter().flatten().collect(),
        })
    }

    /// Returns a copy with a different element type.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::ArrayValue` if a value does not fit.
    pub fn with_dtype(self, dtype: DType) -> Result<Self, ValidationError> {
        Self::new(self.shape, dtype, self.values)
    }

    #[must_use]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    #[must_use]
    pub const fn dtype(&self) -> DType {
        self.dtype
    }

    #[must_use]
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    #[must_use]
    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Row `r` of a 2-D array.
    #[must_use]
    pub fn row(&self, r: usize) -> Option<&[f64]> {
        if self.shape.len() != 2 || r >= self.shape[0] {
            return None;
        }
        let w = self.shape[1];
        Some(&self.values[r * w..(r + 1) * w])
    }

    /// Finite minimum and maximum, ignoring missing cells.
    #[must_use]
    pub fn finite_range(&self) -> Option<(f64, f64)> {
        finite_range(&self.values)
    }
}

pub(crate) fn finite_range(values: &[f64]) -> Option<(f64, f64)> {
    values
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .fold(None, |acc, v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
}

const POS_INFINITY: &str = "Infinity";
const NEG_INFINITY: &str = "-Infinity";

struct WireValues<'a>(&'a NdArray);

impl Serialize for WireValues<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let array = self.0;
        let mut seq = serializer.serialize_seq(Some(array.values.len()))?;
        for &v in &array.values {
            if v.is_nan() {
                seq.serialize_element(&None::<f64>)?;
            } else if v.is_infinite() {
                seq.serialize_element(if v > 0.0 { POS_INFINITY } else { NEG_INFINITY })?;
            } else if array.dtype.is_integer() {
                #[allow(clippy::cast_possible_truncation)]
                seq.serialize_element(&(v as i64))?;
            } else {
                seq.serialize_element(&v)?;
            }
        }
        seq.end()
    }
}

impl Serialize for NdArray {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("NdArray", 3)?;
        state.serialize_field("shape", &self.shape)?;
        state.serialize_field("dtype", &self.dtype)?;
        state.serialize_field("values", &WireValues(self))?;
        state.end()
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawArray {
    shape: Vec<usize>,
    dtype: DType,
    values: Vec<Option<WireCell>>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum WireCell {
    Number(f64),
    Text(String),
}

impl WireCell {
    fn value(self, index: usize) -> Result<f64, ValidationError> {
        match self {
            Self::Number(v) => Ok(v),
            Self::Text(s) if s == POS_INFINITY => Ok(f64::INFINITY),
            Self::Text(s) if s == NEG_INFINITY => Ok(f64::NEG_INFINITY),
            Self::Text(s) => Err(ValidationError::TypeMismatch {
                field: format!("values[{index}]"),
                expected: format!("a number, null, \"{POS_INFINITY}\" or \"{NEG_INFINITY}\""),
                found: format!("string \"{s}\""),
            }),
        }
    }
}

impl NdArray {
    fn from_raw(raw: RawArray) -> Result<Self, ValidationError> {
        let values = raw
            .values
            .into_iter()
            .enumerate()
            .map(|(i, cell)| cell.map_or(Ok(f64::NAN), |c| c.value(i)))
            .collect::<Result<Vec<f64>, _>>()?;
        Self::new(raw.shape, raw.dtype, values)
    }
}

impl<'de> Deserialize<'de> for NdArray {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = RawArray::deserialize(deserializer)?;
        Self::from_raw(raw).map_err(de::Error::custom)
    }
}

/// A value in a package's `data` map.
#[derive(Debug, Clone, PartialEq)]
pub enum DataValue {
    Array(NdArray),
    Json(serde_json::Value),
}

const ARRAY_KEYS: [&str; 3] = ["dtype", "shape", "values"];

impl DataValue {
    pub const fn is_array(&self) -> bool {
        matches!(self, Self::Array(_))
    }

    pub const fn as_array(&self) -> Option<&NdArray> {
        match self {
            Self::Array(a) => Some(a),
            Self::Json(_) => None,
        }
    }

    pub const fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Json(v) => Some(v),
            Self::Array(_) => None,
        }
    }

    /// Returns true for a JSON object that uses exactly the array encoding
    /// keys. Such a value cannot be told apart from an encoded array on the
    /// wire.
    #[must_use]
    pub fn is_array_lookalike(&self) -> bool {
        self.as_json().is_some_and(is_encoded_array)
    }

    pub fn as_str(&self) -> Option<&str> {
        self.as_json().and_then(serde_json::Value::as_str)
    }

    pub fn as_f64(&self) -> Option<f64> {
        self.as_json().and_then(serde_json::Value::as_f64)
    }

    /// Shape of a numeric payload.
    ///
    /// Arrays report their declared shape; JSON numbers report `[]` and
    /// nested JSON lists of numbers report their dimensions when rectangular.
    #[must_use]
    pub fn numeric_shape(&self) -> Option<Vec<usize>> {
        match self {
            Self::Array(a) => Some(a.shape.clone()),
            Self::Json(v) => json_numeric_shape(v),
        }
    }

    /// Flattened numeric values, row-major. `null` cells become `NaN`.
    #[must_use]
    pub fn numeric_values(&self) -> Option<Vec<f64>> {
        match self {
            Self::Array(a) => Some(a.values.clone()),
            Self::Json(v) => {
                json_numeric_shape(v)?;
                let mut out = Vec::new();
                flatten_json_numbers(v, &mut out);
                Some(out)
            }
        }
    }

    /// Number of top-level elements of a list-like value.
    #[must_use]
    pub fn list_len(&self) -> Option<usize> {
        match self {
            Self::Array(a) => a.shape.first().copied(),
            Self::Json(serde_json::Value::Array(items)) => Some(items.len()),
            Self::Json(_) => None,
        }
    }

    /// Human-readable type name.
    #[must_use]
    pub fn type_name(&self) -> String {
        match self {
            Self::Array(a) => format!("{}-d {} array", a.ndim(), a.dtype),
            Self::Json(v) => json_type_name(v).to_string(),
        }
    }

    /// JSON form used for hashing and wire output.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Json(v) => v.clone(),
            Self::Array(a) => serde_json::json!({
                "shape": a.shape,
                "dtype": a.dtype.as_str(),
                "values": serde_json::to_value(WireValues(a)).unwrap_or(serde_json::Value::Null),
            }),
        }
    }

    /// Interprets a JSON value from the wire.
    ///
    /// An object whose keys are exactly `shape`, `dtype` and `values` is
    /// an encoded array and must be well formed.
    ///
    /// # Errors
    ///
    /// Returns a description of why an encoded array is malformed.
    pub fn from_json(value: serde_json::Value) -> Result<Self, String> {
        if !is_encoded_array(&value) {
            return Ok(Self::Json(value));
        }
        serde_json::from_value::<NdArray>(value)
            .map(Self::Array)
            .map_err(|e| e.to_string())
    }
}

fn is_encoded_array(value: &serde_json::Value) -> bool {
    value.as_object().is_some_and(|obj| {
        obj.len() == ARRAY_KEYS.len() && ARRAY_KEYS.iter().all(|k| obj.contains_key(*k))
    })
}

pub(crate) fn json_type_name(v: &serde_json::Value) -> &'static str {
    match v {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "list",
        serde_json::Value::Object(_) => "object",
    }
}

fn json_numeric_shape(v: &serde_json::Value) -> Option<Vec<usize>> {
    match v {
        serde_json::Value::Number(_) | serde_json::Value::Null => Some(Vec::new()),
        serde_json::Value::Array(items) => {
            let Some(first) = items.first() else {
                return Some(vec![0]);
            };
            let inner = json_numeric_shape(first)?;
            for item in &items[1..] {
                if json_numeric_shape(item)? != inner {
                    return None;
                }
            }
            let mut shape = Vec::with_capacity(inner.len() + 1);
            shape.push(items.len());
            shape.extend(inner);
            Some(shape)
        }
        _ => None,
    }
}

fn flatten_json_numbers(v: &serde_json::Value, out: &mut Vec<f64>) {
    match v {
        serde_json::Value::Number(n) => out.push(n.as_f64().unwrap_or(f64::NAN)),
        serde_json::Value::Array(items) => {
            for item in items {
                flatten_json_numbers(item, out);
            }
        }
        _ => out.push(f64::NAN),
    }
}

impl Serialize for DataValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Array(a) => a.serialize(serializer),
            Self::Json(v) => v.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for DataValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        Self::from_json(value).map_err(de::Error::custom)
    }
}

impl From<NdArray> for DataValue {
    fn from(v: NdArray) -> Self {
        Self::Array(v)
    }
}

impl From<Vec<f64>> for DataValue {
    fn from(v: Vec<f64>) -> Self {
        Self::Array(NdArray::from_vec(v))
    }
}

impl From<serde_json::Value> for DataValue {
    fn from(v: serde_json::Value) -> Self {
        Self::Json(v)
    }
}

impl From<&str> for DataValue {
    fn from(v: &str) -> Self {
        Self::Json(serde_json::Value::String(v.to_string()))
    }
}

impl From<String> for DataValue {
    fn from(v: String) -> Self {
        Self::Json(serde_json::Value::String(v))
    }
}

impl From<f64> for DataValue {
    fn from(v: f64) -> Self {
        Self::Json(serde_json::json!(v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_checks_length() {
        let err = NdArray::new(vec![2, 3], DType::Float64, vec![0.0; 5]).unwrap_err();
        assert_eq!(
            err,
            ValidationError::ArrayLength { shape: vec![2, 3], expected: 6, actual: 5 }
        );
    }

    #[test]
    fn test_integer_dtype_rejects_fractions() {
        let err = NdArray::new(vec![2], DType::Uint8, vec![1.0, 1.5]).unwrap_err();
        assert!(matches!(err, ValidationError::ArrayValue { index: 1, .. }));
        assert!(NdArray::new(vec![1], DType::Uint8, vec![256.0]).is_err());
        assert!(NdArray::new(vec![1], DType::Int32, vec![-7.0]).is_ok());
    }

    #[test]
    fn test_wire_form_keeps_shape() {
        let grid = NdArray::from_grid(vec![vec![1.0; 10]; 10]).unwrap();
        let flat = NdArray::from_vec(vec![1.0; 100]);
        let a = serde_json::to_value(&grid).unwrap();
        let b = serde_json::to_value(&flat).unwrap();
        assert_eq!(a["shape"], json!([10, 10]));
        assert_eq!(b["shape"], json!([100]));
        assert_eq!(a["dtype"], "float64");
        assert_eq!(a["values"].as_array().map(Vec::len), Some(100));
    }

    #[test]
    fn test_integer_values_encode_as_integers() {
        let a = NdArray::new(vec![3], DType::Int32, vec![1.0, 2.0, 3.0]).unwrap();
        let json = serde_json::to_value(&a).unwrap();
        assert_eq!(json["values"], json!([1, 2, 3]));
    }

    #[test]
    fn test_missing_cells_travel_as_null() {
        let a = NdArray::from_vec(vec![1.0, f64::NAN]);
        let json = serde_json::to_value(&a).unwrap();
        assert_eq!(json["values"], json!([1.0, null]));
        let back: NdArray = serde_json::from_value(json).unwrap();
        assert!(back.values()[1].is_nan());
    }

    #[test]
    fn test_new_rejects_overflowing_shape() {
        let err = NdArray::new(vec![usize::MAX / 2, 3], DType::Float64, Vec::new()).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidShape { ref field, .. } if field == "shape"));
        assert!(NdArray::new(vec![usize::MAX, 0], DType::Float64, Vec::new()).is_ok());
    }

    #[test]
    fn test_infinite_cells_keep_their_sign() {
        let a = NdArray::from_vec(vec![f64::INFINITY, -2.5, f64::NEG_INFINITY]);
        let json = serde_json::to_value(&a).unwrap();
        assert_eq!(json["values"], json!(["Infinity", -2.5, "-Infinity"]));
        let back: NdArray = serde_json::from_value(json).unwrap();
        assert_eq!(back, a);

        let bad = json!({"shape": [1], "dtype": "float64", "values": ["warm"]});
        assert!(serde_json::from_value::<NdArray>(bad).is_err());
        let int = json!({"shape": [1], "dtype": "int32", "values": ["Infinity"]});
        assert!(serde_json::from_value::<NdArray>(int).is_err());
    }

    #[test]
    fn test_lookalike_objects_are_flagged() {
        let lookalike = DataValue::Json(json!({"shape": "circle", "dtype": "label", "values": "hot"}));
        assert!(lookalike.is_array_lookalike());
        assert!(!DataValue::Json(json!({"shape": "circle"})).is_array_lookalike());
        assert!(!DataValue::from(NdArray::from_vec(vec![1.0])).is_array_lookalike());
    }

    #[test]
    fn test_data_value_detects_encoded_arrays() {
        let v = DataValue::from_json(json!({"shape": [2], "dtype": "int64", "values": [4, 5]})).unwrap();
        assert!(v.is_array());

        let v = DataValue::from_json(json!({"shape": [2], "dtype": "int64", "values": [4, 5], "x": 1})).unwrap();
        assert!(!v.is_array());

        assert!(DataValue::from_json(json!({"shape": [3], "dtype": "int64", "values": [4, 5]})).is_err());
    }

    #[test]
    fn test_nested_json_numeric_shape() {
        let v = DataValue::Json(json!([[1, 2, 3], [4, 5, 6]]));
        assert_eq!(v.numeric_shape(), Some(vec![2, 3]));
        assert_eq!(v.numeric_values().map(|v| v.len()), Some(6));

        let ragged = DataValue::Json(json!([[1, 2], [3]]));
        assert_eq!(ragged.numeric_shape(), None);

        let text = DataValue::from("celsius");
        assert_eq!(text.numeric_shape(), None);
        assert_eq!(text.as_str(), Some("celsius"));
    }

    #[test]
    fn test_finite_range_ignores_missing() {
        let a = NdArray::from_vec(vec![f64::NAN, 3.0, -1.0]);
        assert_eq!(a.finite_range(), Some((-1.0, 3.0)));
        assert_eq!(NdArray::from_vec(vec![f64::NAN]).finite_range(), None);
    }

    #[test]
    fn test_row_access() {
        let grid = NdArray::from_grid(vec![vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap();
        assert_eq!(grid.row(1), Some(&[3.0, 4.0][..]));
        assert_eq!(grid.row(2), None);
    }
}
