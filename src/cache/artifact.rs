//! Derived artifacts produced by the styling cache.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;

/// Magic prefix of the binary geometry payload.
pub const GEOMETRY_MAGIC: &[u8; 4] = b"VZGM";
pub const GEOMETRY_FORMAT_VERSION: u16 = 1;

/// Primitive assembly of a mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Topology {
    Triangles,
    Lines,
    LineStrip,
    Points,
}

impl Topology {
    const fn code(self) -> u8 {
        match self {
            Self::Triangles => 0,
            Self::Lines => 1,
            Self::LineStrip => 2,
            Self::Points => 3,
        }
    }
}

/// Vertices, connectivity and UV mapping. Carries no colour.
///
/// `scalars` holds the per-vertex data value that styling maps to colour;
/// missing cells are `NaN`.
#[derive(Debug, Clone, PartialEq)]
pub struct GeometryArtifact {
    pub topology: Topology,
    pub positions: Vec<[f32; 3]>,
    pub indices: Vec<u32>,
    pub uvs: Vec<[f32; 2]>,
    pub scalars: Vec<f32>,
    /// `[rows, cols]` when the vertices form a row-major lattice.
    pub lattice: Option<[u32; 2]>,
}

impl GeometryArtifact {
    #[must_use]
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    /// Finite range of the scalar domain.
    #[must_use]
    pub fn scalar_range(&self) -> Option<(f64, f64)> {
        let values: Vec<f64> = self.scalars.iter().map(|&v| f64::from(v)).collect();
        crate::value::finite_range(&values)
    }

    /// Little-endian binary payload.
    ///
    /// Layout: magic, version (u16), topology (u8), padding (u8), vertex
    /// count (u32), index count (u32), lattice rows and cols (u32, zero
    /// when absent), then positions, uvs, scalars and indices. UVs and
    /// scalars are either empty or one per vertex; flags in the padding
    /// byte say which are present.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let has_uvs = !self.uvs.is_empty();
        let has_scalars = !self.scalars.is_empty();
        let flags = u8::from(has_uvs) | (u8::from(has_scalars) << 1);

        let mut out = Vec::with_capacity(24 + self.positions.len() * 24 + self.indices.len() * 4);
        out.extend_from_slice(GEOMETRY_MAGIC);
        out.extend_from_slice(&GEOMETRY_FORMAT_VERSION.to_le_bytes());
        out.push(self.topology.code());
        out.push(flags);
        let [rows, cols] = self.lattice.unwrap_or([0, 0]);
        #[allow(clippy::cast_possible_truncation)]
        let counts = [self.positions.len() as u32, self.indices.len() as u32, rows, cols];
        for n in counts {
            out.extend_from_slice(&n.to_le_bytes());
        }
        for p in &self.positions {
            for c in p {
                out.extend_from_slice(&c.to_le_bytes());
            }
        }
        for uv in &self.uvs {
            for c in uv {
                out.extend_from_slice(&c.to_le_bytes());
            }
        }
        for s in &self.scalars {
            out.extend_from_slice(&s.to_le_bytes());
        }
        for i in &self.indices {
            out.extend_from_slice(&i.to_le_bytes());
        }
        out
    }
}

/// RGBA8 image, row-major from the top row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureArtifact {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl TextureArtifact {
    #[must_use]
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = ((y * self.width + x) * 4) as usize;
        self.pixels.get(i..i + 4).map(|p| [p[0], p[1], p[2], p[3]])
    }

    /// Netpbm PAM encoding.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let header = format!(
            "P7\nWIDTH {}\nHEIGHT {}\nDEPTH 4\nMAXVAL 255\nTUPLTYPE RGB_ALPHA\nENDHDR\n",
            self.width, self.height
        );
        let mut out = Vec::with_capacity(header.len() + self.pixels.len());
        out.extend_from_slice(header.as_bytes());
        out.extend_from_slice(&self.pixels);
        out
    }
}

/// Parameter set for a reusable shader program.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShaderParams {
    pub shader: String,
    pub uniforms: BTreeMap<String, f64>,
    pub colormap: String,
    pub features: Vec<String>,
    #[serde(skip_serializing_if = "serde_json::Map::is_empty")]
    pub parameters: serde_json::Map<String, serde_json::Value>,
}

impl ShaderParams {
    #[must_use]
    pub fn to_document(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

/// Geometry and styling baked in one step.
///
/// Produced only on the fallback path; always marked degraded.
#[derive(Debug, Clone, PartialEq)]
pub struct MonolithicArtifact {
    pub geometry: GeometryArtifact,
    pub texture: TextureArtifact,
    pub reason: String,
}

impl MonolithicArtifact {
    pub const fn is_degraded(&self) -> bool {
        true
    }

    /// Geometry payload followed by the PAM texture.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = self.geometry.to_bytes();
        out.extend(self.texture.to_bytes());
        out
    }
}

/// Result of a cache resolution.
#[derive(Debug, Clone, PartialEq)]
pub enum Artifact {
    Geometry(Arc<GeometryArtifact>),
    Texture(Arc<TextureArtifact>),
    ShaderParams(Arc<ShaderParams>),
    Monolithic(Arc<MonolithicArtifact>),
}

impl Artifact {
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Geometry(_) => "geometry",
            Self::Texture(_) => "texture",
            Self::ShaderParams(_) => "shader_params",
            Self::Monolithic(_) => "monolithic",
        }
    }

    #[must_use]
    pub const fn is_degraded(&self) -> bool {
        matches!(self, Self::Monolithic(_))
    }

    /// Response body: binary geometry, image bytes or a JSON document.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Self::Geometry(g) => g.to_bytes(),
            Self::Texture(t) => t.to_bytes(),
            Self::ShaderParams(s) => serde_json::to_vec(&s.to_document()).unwrap_or_default(),
            Self::Monolithic(m) => m.to_bytes(),
        }
    }

    pub fn as_geometry(&self) -> Option<&GeometryArtifact> {
        match self {
            Self::Geometry(g) => Some(g.as_ref()),
            _ => None,
        }
    }

    pub fn as_texture(&self) -> Option<&TextureArtifact> {
        match self {
            Self::Texture(t) => Some(t.as_ref()),
            _ => None,
        }
    }

    pub fn as_shader_params(&self) -> Option<&ShaderParams> {
        match self {
            Self::ShaderParams(s) => Some(s.as_ref()),
            _ => None,
        }
    }

    pub fn as_monolithic(&self) -> Option<&MonolithicArtifact> {
        match self {
            Self::Monolithic(m) => Some(m.as_ref()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad() -> GeometryArtifact {
        GeometryArtifact {
            topology: Topology::Triangles,
            positions: vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [1.0, 1.0, 0.0]],
            indices: vec![0, 1, 2, 1, 3, 2],
            uvs: vec![[0.0, 0.0], [1.0, 0.0], [0.0, 1.0], [1.0, 1.0]],
            scalars: vec![1.0, 2.0, f32::NAN, 4.0],
            lattice: Some([2, 2]),
        }
    }

    #[test]
    fn test_geometry_bytes_layout() {
        let bytes = quad().to_bytes();
        assert_eq!(&bytes[..4], GEOMETRY_MAGIC);
        assert_eq!(bytes[6], 0);
        assert_eq!(bytes[7], 0b11);
        assert_eq!(u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]), 4);
        assert_eq!(u32::from_le_bytes([bytes[16], bytes[17], bytes[18], bytes[19]]), 2);
        assert_eq!(bytes.len(), 24 + 4 * 12 + 4 * 8 + 4 * 4 + 6 * 4);
    }

    #[test]
    fn test_scalar_range_skips_missing() {
        assert_eq!(quad().scalar_range(), Some((1.0, 4.0)));
    }

    #[test]
    fn test_texture_pam() {
        let tex = TextureArtifact { width: 2, height: 1, pixels: vec![255, 0, 0, 255, 0, 0, 255, 128] };
        let bytes = tex.to_bytes();
        assert!(bytes.starts_with(b"P7\nWIDTH 2\nHEIGHT 1\n"));
        assert!(bytes.ends_with(&[0, 0, 255, 128]));
        assert_eq!(tex.pixel(1, 0), Some([0, 0, 255, 128]));
        assert_eq!(tex.pixel(2, 0), None);
    }

    #[test]
    fn test_shader_document_shape() {
        let params = ShaderParams {
            shader: "contour_lines".to_string(),
            uniforms: BTreeMap::from([("u_min".to_string(), 0.0), ("u_max".to_string(), 10.0)]),
            colormap: "viridis".to_string(),
            features: vec!["contour_levels".to_string()],
            parameters: serde_json::Map::new(),
        };
        let doc = params.to_document();
        assert_eq!(doc["shader"], "contour_lines");
        assert_eq!(doc["uniforms"]["u_max"], 10.0);
        assert!(doc.get("parameters").is_none());
    }
}
