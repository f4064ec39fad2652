//! JSON wire format for data packages.
//!
//! The minimal document carries exactly `id`, `data`, `time`,
//! `visualizationType` and `metadata`. Consumers written against that
//! shape keep working when enhanced satellites are added, because
//! satellites only appear when explicitly requested.
//!
//! Decoding is strict about required fields and the time shape, and
//! lenient about satellites: an absent or `null` satellite is simply not
//! attached.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::agent::MultiAgentContext;
use crate::context::{MultiResolutionData, SemanticContext, VisualSummary};
use crate::error::{StructuralError, VizError, VizResult};
use crate::package::DataPackage;
use crate::time::Time;
use crate::value::{DataMap, DataValue};

pub const FIELD_ID: &str = "id";
pub const FIELD_DATA: &str = "data";
pub const FIELD_TIME: &str = "time";
pub const FIELD_VISUALIZATION_TYPE: &str = "visualizationType";
pub const FIELD_METADATA: &str = "metadata";

pub const FIELD_SEMANTIC_CONTEXT: &str = "semanticContext";
pub const FIELD_VISUAL_SUMMARY: &str = "visualSummary";
pub const FIELD_MULTI_RESOLUTION: &str = "multiResolutionData";
pub const FIELD_AGENT_CONTEXT: &str = "multiAgentContext";

/// Top-level keys of the minimal document.
pub const MINIMAL_FIELDS: [&str; 5] = [
    FIELD_ID,
    FIELD_DATA,
    FIELD_TIME,
    FIELD_VISUALIZATION_TYPE,
    FIELD_METADATA,
];

/// Encoding switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeOptions {
    /// Emit attached satellites.
    pub include_enhanced: bool,
}

impl EncodeOptions {
    #[must_use]
    pub const fn minimal() -> Self {
        Self { include_enhanced: false }
    }

    #[must_use]
    pub const fn enhanced() -> Self {
        Self { include_enhanced: true }
    }
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self::enhanced()
    }
}

fn to_wire<T: Serialize>(what: &str, value: &T) -> VizResult<Value> {
    serde_json::to_value(value).map_err(|e| VizError::internal(format!("failed to encode {what}: {e}")))
}

/// Encodes a package as a wire document.
///
/// # Errors
///
/// Returns `VizError::Invalid` if the package fails validation.
pub fn encode(package: &DataPackage, options: EncodeOptions) -> VizResult<Value> {
    package.ensure_valid()?;

    let data: Map<String, Value> = package
        .data
        .iter()
        .map(|(k, v)| (k.clone(), v.to_json()))
        .collect();

    let mut doc = Map::new();
    doc.insert(FIELD_ID.to_string(), Value::String(package.id.clone()));
    doc.insert(FIELD_DATA.to_string(), Value::Object(data));
    doc.insert(FIELD_TIME.to_string(), to_wire("time", &package.time)?);
    doc.insert(
        FIELD_VISUALIZATION_TYPE.to_string(),
        Value::String(package.visualization_type.clone()),
    );
    doc.insert(FIELD_METADATA.to_string(), Value::Object(package.metadata.clone()));

    if options.include_enhanced {
        if let Some(ctx) = &package.semantic_context {
            doc.insert(FIELD_SEMANTIC_CONTEXT.to_string(), to_wire("semantic context", ctx)?);
        }
        if let Some(summary) = &package.visual_summary {
            doc.insert(FIELD_VISUAL_SUMMARY.to_string(), to_wire("visual summary", summary)?);
        }
        if let Some(levels) = &package.multi_resolution {
            doc.insert(FIELD_MULTI_RESOLUTION.to_string(), to_wire("multi-resolution data", levels)?);
        }
        if let Some(agents) = &package.agent_context {
            doc.insert(FIELD_AGENT_CONTEXT.to_string(), to_wire("agent context", agents)?);
        }
    }

    tracing::debug!(
        package_id = %package.id,
        enhanced = options.include_enhanced,
        fields = doc.len(),
        "encoded package"
    );
    Ok(Value::Object(doc))
}

/// Minimal document, as read by consumers that predate satellites.
///
/// # Errors
///
/// Returns `VizError::Invalid` if the package fails validation.
pub fn legacy_projection(package: &DataPackage) -> VizResult<Value> {
    encode(package, EncodeOptions::minimal())
}

/// Decodes a wire document.
///
/// # Errors
///
/// Returns `StructuralError` if a required field is missing or malformed,
/// or if `time` does not match exactly one variant.
pub fn decode(doc: &Value) -> Result<DataPackage, StructuralError> {
    let obj = doc.as_object().ok_or(StructuralError::NotAnObject)?;

    let id = required(obj, FIELD_ID)?
        .as_str()
        .ok_or_else(|| invalid(FIELD_ID, "expected a string"))?;
    if id.trim().is_empty() {
        return Err(invalid(FIELD_ID, "must not be empty"));
    }

    let data = decode_data(required(obj, FIELD_DATA)?)?;
    let time = decode_time(required(obj, FIELD_TIME)?)?;

    let visualization_type = required(obj, FIELD_VISUALIZATION_TYPE)?
        .as_str()
        .ok_or_else(|| invalid(FIELD_VISUALIZATION_TYPE, "expected a string"))?;

    let metadata = match obj.get(FIELD_METADATA) {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(m)) => m.clone(),
        Some(_) => return Err(invalid(FIELD_METADATA, "expected an object")),
    };

    let package = DataPackage {
        id: id.to_string(),
        data,
        time,
        visualization_type: visualization_type.to_string(),
        metadata,
        semantic_context: satellite::<SemanticContext>(obj, FIELD_SEMANTIC_CONTEXT)?,
        visual_summary: satellite::<VisualSummary>(obj, FIELD_VISUAL_SUMMARY)?,
        multi_resolution: satellite::<MultiResolutionData>(obj, FIELD_MULTI_RESOLUTION)?,
        agent_context: satellite::<MultiAgentContext>(obj, FIELD_AGENT_CONTEXT)?,
    };

    tracing::debug!(
        package_id = %package.id,
        visualization_type = %package.visualization_type,
        enhanced = package.is_enhanced(),
        "decoded package"
    );
    Ok(package)
}

fn required<'a>(obj: &'a Map<String, Value>, field: &str) -> Result<&'a Value, StructuralError> {
    match obj.get(field) {
        None | Some(Value::Null) => Err(StructuralError::MissingField {
            field: field.to_string(),
        }),
        Some(v) => Ok(v),
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> StructuralError {
    StructuralError::InvalidField {
        field: field.to_string(),
        reason: reason.into(),
    }
}

fn decode_data(value: &Value) -> Result<DataMap, StructuralError> {
    let obj = value
        .as_object()
        .ok_or_else(|| invalid(FIELD_DATA, "expected an object"))?;
    obj.iter()
        .map(|(k, v)| {
            DataValue::from_json(v.clone())
                .map(|dv| (k.clone(), dv))
                .map_err(|reason| invalid(&format!("{FIELD_DATA}.{k}"), reason))
        })
        .collect()
}

fn time_keys(tag: &str) -> Option<&'static [&'static str]> {
    match tag {
        "instant" => Some(&["type", "at"]),
        "interval" => Some(&["type", "start", "end"]),
        "series" => Some(&["type", "timestamps"]),
        _ => None,
    }
}

fn decode_time(value: &Value) -> Result<Time, StructuralError> {
    let unknown = |reason: String| StructuralError::UnknownTimeVariant { reason };

    let obj = value
        .as_object()
        .ok_or_else(|| unknown("time must be an object".to_string()))?;
    let tag = obj
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| unknown("missing 'type' tag".to_string()))?;
    let keys = time_keys(tag).ok_or_else(|| unknown(format!("unrecognised type '{tag}'")))?;

    if let Some(extra) = obj.keys().find(|k| !keys.contains(&k.as_str())) {
        return Err(unknown(format!("unexpected key '{extra}' for {tag}")));
    }
    if let Some(missing) = keys.iter().find(|k| !obj.contains_key(**k)) {
        return Err(unknown(format!("missing key '{missing}' for {tag}")));
    }

    let time: Time = serde_json::from_value(value.clone()).map_err(|e| unknown(e.to_string()))?;
    time.validate().map_err(StructuralError::InvalidTime)?;
    Ok(time)
}

fn satellite<T: DeserializeOwned>(obj: &Map<String, Value>, field: &str) -> Result<Option<T>, StructuralError> {
    match obj.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => serde_json::from_value(v.clone())
            .map(Some)
            .map_err(|e| invalid(field, e.to_string())),
    }
}

/// Encodes a package to compact JSON text.
///
/// # Errors
///
/// See [`encode`].
pub fn to_json_string(package: &DataPackage, options: EncodeOptions) -> VizResult<String> {
    let doc = encode(package, options)?;
    serde_json::to_string(&doc).map_err(|e| VizError::internal(e.to_string()))
}

/// Encodes a package to indented JSON text.
///
/// # Errors
///
/// See [`encode`].
pub fn to_json_pretty(package: &DataPackage, options: EncodeOptions) -> VizResult<String> {
    let doc = encode(package, options)?;
    serde_json::to_string_pretty(&doc).map_err(|e| VizError::internal(e.to_string()))
}

/// Decodes a package from JSON text.
///
/// # Errors
///
/// Returns `StructuralError::Malformed` for unparseable text, otherwise as [`decode`].
pub fn from_json_str(text: &str) -> Result<DataPackage, StructuralError> {
    let doc: Value = serde_json::from_str(text).map_err(|e| StructuralError::Malformed {
        message: e.to_string(),
    })?;
    decode(&doc)
}

impl DataPackage {
    /// Shorthand for [`encode`].
    ///
    /// # Errors
    ///
    /// Returns `VizError::Invalid` if the package fails validation.
    pub fn to_wire(&self, options: EncodeOptions) -> VizResult<Value> {
        encode(self, options)
    }

    /// Shorthand for [`decode`].
    ///
    /// # Errors
    ///
    /// See [`decode`].
    pub fn from_wire(doc: &Value) -> Result<Self, StructuralError> {
        decode(doc)
    }
}
