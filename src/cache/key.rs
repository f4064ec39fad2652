//! Content-addressed cache keys.
//!
//! Fingerprints are BLAKE3 digests over a canonical walk of a value: object
//! keys are visited in sorted order and every node is prefixed with a type
//! tag, so structurally different values never share an input stream.

use std::fmt;

use blake3::Hasher;

use crate::cache::styling::StylingConfig;
use crate::package::DataPackage;
use crate::value::{DataMap, DataValue, NdArray};

/// 256-bit content digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint(blake3::Hash);

impl Fingerprint {
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        self.0.as_bytes()
    }

    /// First 16 hex digits, for logs.
    #[must_use]
    pub fn short(&self) -> String {
        self.0.to_hex().as_str()[..16].to_string()
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.to_hex())
    }
}

fn update_str(h: &mut Hasher, s: &str) {
    h.update(&(s.len() as u64).to_le_bytes());
    h.update(s.as_bytes());
}

fn update_json(h: &mut Hasher, v: &serde_json::Value) {
    match v {
        serde_json::Value::Null => {
            h.update(b"z");
        }
        serde_json::Value::Bool(b) => {
            h.update(if *b { b"t" } else { b"f" });
        }
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                h.update(b"i");
                h.update(&i.to_le_bytes());
            } else if let Some(u) = n.as_u64() {
                h.update(b"u");
                h.update(&u.to_le_bytes());
            } else {
                h.update(b"d");
                h.update(&n.as_f64().unwrap_or(f64::NAN).to_bits().to_le_bytes());
            }
        }
        serde_json::Value::String(s) => {
            h.update(b"s");
            update_str(h, s);
        }
        serde_json::Value::Array(items) => {
            h.update(b"[");
            h.update(&(items.len() as u64).to_le_bytes());
            for item in items {
                update_json(h, item);
            }
        }
        serde_json::Value::Object(obj) => {
            let mut keys: Vec<&String> = obj.keys().collect();
            keys.sort_unstable();
            h.update(b"{");
            h.update(&(keys.len() as u64).to_le_bytes());
            for k in keys {
                update_str(h, k);
                update_json(h, &obj[k.as_str()]);
            }
        }
    }
}

fn update_array(h: &mut Hasher, a: &NdArray) {
    h.update(b"A");
    update_str(h, a.dtype().as_str());
    h.update(&(a.ndim() as u64).to_le_bytes());
    for &d in a.shape() {
        h.update(&(d as u64).to_le_bytes());
    }
    for &v in a.values() {
        // All NaN payloads hash alike.
        let bits = if v.is_nan() { f64::NAN.to_bits() } else { v.to_bits() };
        h.update(&bits.to_le_bytes());
    }
}

/// Fingerprint of a data map.
#[must_use]
pub fn fingerprint_data(data: &DataMap) -> Fingerprint {
    let mut h = Hasher::new();
    h.update(b"vizpack.data.v1");
    h.update(&(data.len() as u64).to_le_bytes());
    for (k, v) in data {
        update_str(&mut h, k);
        match v {
            DataValue::Array(a) => update_array(&mut h, a),
            DataValue::Json(j) => update_json(&mut h, j),
        }
    }
    Fingerprint(h.finalize())
}

/// Fingerprint of an arbitrary JSON value.
#[must_use]
pub fn fingerprint_json(value: &serde_json::Value) -> Fingerprint {
    let mut h = Hasher::new();
    h.update(b"vizpack.json.v1");
    update_json(&mut h, value);
    Fingerprint(h.finalize())
}

/// Geometry-tier key. Independent of styling.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GeometryKey {
    pub package_id: String,
    pub data_fingerprint: Fingerprint,
    pub visualization_type: String,
}

impl GeometryKey {
    #[must_use]
    pub fn for_package(package: &DataPackage) -> Self {
        Self {
            package_id: package.id.clone(),
            data_fingerprint: fingerprint_data(&package.data),
            visualization_type: package.visualization_type.clone(),
        }
    }
}

impl fmt::Display for GeometryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.package_id,
            self.visualization_type,
            self.data_fingerprint.short()
        )
    }
}

/// Texture and shader tier key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StyleKey {
    pub geometry: GeometryKey,
    pub style_fingerprint: Fingerprint,
}

impl StyleKey {
    #[must_use]
    pub fn new(geometry: GeometryKey, styling: &StylingConfig) -> Self {
        Self {
            geometry,
            style_fingerprint: styling.fingerprint(),
        }
    }
}

impl fmt::Display for StyleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}+{}", self.geometry, self.style_fingerprint.short())
    }
}
