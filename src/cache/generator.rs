//! Artifact derivation.
//!
//! [`ArtifactGenerator`] is the seam between the cache and whatever turns
//! package data into renderable artifacts. [`ReferenceGenerator`] is a
//! small built-in implementation: lattice meshes for grids, point sets,
//! vector glyph segments, polylines and linear colormap ramps.

use std::collections::BTreeMap;

use crate::cache::artifact::{GeometryArtifact, MonolithicArtifact, ShaderParams, TextureArtifact, Topology};
use crate::cache::styling::StylingConfig;
use crate::error::GenerationError;
use crate::package::DataPackage;
use crate::value::DataValue;

/// Width of the lookup texture produced for non-lattice geometry.
pub const LUT_WIDTH: u32 = 256;

/// Contour level count used by shaders when styling sets none.
pub const DEFAULT_CONTOUR_LEVELS: u32 = 10;

/// Produces the artifacts of each cache tier.
///
/// Implementations must be deterministic: equal inputs give byte-identical
/// outputs, since cached entries are never invalidated.
pub trait ArtifactGenerator: Send + Sync {
    /// Styling-independent mesh for a package.
    fn geometry(&self, package: &DataPackage) -> Result<GeometryArtifact, GenerationError>;

    /// Styling applied over a geometry's scalar domain.
    fn texture(&self, geometry: &GeometryArtifact, styling: &StylingConfig) -> Result<TextureArtifact, GenerationError>;

    /// Parameters for a reusable shader.
    fn shader_params(
        &self,
        visualization_type: &str,
        geometry: &GeometryArtifact,
        styling: &StylingConfig,
    ) -> Result<ShaderParams, GenerationError>;

    /// Geometry and styling in one step, used when a tiered step failed.
    fn monolithic(
        &self,
        package: &DataPackage,
        styling: &StylingConfig,
        cause: &GenerationError,
    ) -> Result<MonolithicArtifact, GenerationError>;
}

/// Linear colour ramps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Colormap {
    Viridis,
    Grayscale,
    Coolwarm,
}

impl Colormap {
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "viridis" => Some(Self::Viridis),
            "grayscale" | "greyscale" | "gray" | "grey" => Some(Self::Grayscale),
            "coolwarm" => Some(Self::Coolwarm),
            _ => None,
        }
    }

    const fn stops(self) -> &'static [[u8; 3]] {
        match self {
            Self::Viridis => &[
                [0x44, 0x01, 0x54],
                [0x3b, 0x52, 0x8b],
                [0x21, 0x91, 0x8c],
                [0x5e, 0xc9, 0x62],
                [0xfd, 0xe7, 0x25],
            ],
            Self::Grayscale => &[[0, 0, 0], [255, 255, 255]],
            Self::Coolwarm => &[[0x3b, 0x4c, 0xc0], [0xdd, 0xdd, 0xdd], [0xb4, 0x04, 0x26]],
        }
    }

    /// Colour at `t` in `[0, 1]`; out-of-range values clamp, `NaN` maps to 0.
    #[must_use]
    pub fn sample(self, t: f64) -> [u8; 3] {
        let stops = self.stops();
        let t = if t.is_nan() { 0.0 } else { t.clamp(0.0, 1.0) };
        #[allow(clippy::cast_precision_loss)]
        let pos = t * (stops.len() - 1) as f64;
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let i = (pos.floor() as usize).min(stops.len() - 2);
        let frac = pos - i as f64;
        let (a, b) = (stops[i], stops[i + 1]);
        let mut out = [0u8; 3];
        for c in 0..3 {
            let v = f64::from(a[c]) + (f64::from(b[c]) - f64::from(a[c])) * frac;
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let byte = v.round().clamp(0.0, 255.0) as u8;
            out[c] = byte;
        }
        out
    }
}

fn colormap(styling: &StylingConfig) -> Result<Colormap, GenerationError> {
    Colormap::from_name(&styling.colormap).ok_or_else(|| GenerationError::InvalidStyling {
        reason: format!("unknown colormap '{}'", styling.colormap),
    })
}

fn unusable(field: &str, reason: impl Into<String>) -> GenerationError {
    GenerationError::UnusableData {
        field: field.to_string(),
        reason: reason.into(),
    }
}

fn field<'a>(package: &'a DataPackage, name: &str) -> Result<&'a DataValue, GenerationError> {
    package.get(name).ok_or_else(|| unusable(name, "missing"))
}

fn grid(package: &DataPackage, name: &str) -> Result<(usize, usize, Vec<f64>), GenerationError> {
    let value = field(package, name)?;
    let (Some(&[rows, cols]), Some(values)) = (value.numeric_shape().as_deref(), value.numeric_values()) else {
        return Err(unusable(name, "expected a non-empty 2-d numeric grid"));
    };
    if rows == 0 || cols == 0 {
        return Err(unusable(name, "expected a non-empty 2-d numeric grid"));
    }
    let cells = rows
        .checked_mul(cols)
        .ok_or_else(|| unusable(name, format!("{rows} x {cols} cells overflow the index range")))?;
    vertex_limit(name, cells)?;
    if values.len() != cells {
        return Err(unusable(name, format!("{rows} x {cols} grid holds {} values", values.len())));
    }
    Ok((rows, cols, values))
}

/// `[west, south, east, north]`, or the unit square when absent.
fn bounds_or_unit(package: &DataPackage) -> [f64; 4] {
    package
        .get("bounds")
        .and_then(DataValue::numeric_values)
        .and_then(|v| <[f64; 4]>::try_from(v).ok())
        .filter(|b| b.iter().all(|x| x.is_finite()))
        .unwrap_or([0.0, 0.0, 1.0, 1.0])
}

fn vertex_limit(field: &str, count: usize) -> Result<(), GenerationError> {
    if u32::try_from(count).is_err() {
        return Err(unusable(field, format!("{count} vertices exceed the index range")));
    }
    Ok(())
}

#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn lattice(rows: usize, cols: usize, values: &[f64], bounds: [f64; 4], z_scale: f64) -> GeometryArtifact {
    let [west, south, east, north] = bounds;
    let fx = |c: usize| if cols > 1 { c as f64 / (cols - 1) as f64 } else { 0.5 };
    let fy = |r: usize| if rows > 1 { r as f64 / (rows - 1) as f64 } else { 0.5 };

    let mut positions = Vec::with_capacity(rows * cols);
    let mut uvs = Vec::with_capacity(rows * cols);
    for r in 0..rows {
        for c in 0..cols {
            let v = values[r * cols + c];
            let z = if v.is_finite() { v * z_scale } else { 0.0 };
            positions.push([
                (west + (east - west) * fx(c)) as f32,
                (north - (north - south) * fy(r)) as f32,
                z as f32,
            ]);
            uvs.push([fx(c) as f32, fy(r) as f32]);
        }
    }

    let mut indices = Vec::with_capacity(rows.saturating_sub(1) * cols.saturating_sub(1) * 6);
    for r in 0..rows.saturating_sub(1) {
        for c in 0..cols.saturating_sub(1) {
            let i = (r * cols + c) as u32;
            let right = i + 1;
            let below = i + cols as u32;
            indices.extend_from_slice(&[i, below, right, right, below, below + 1]);
        }
    }

    GeometryArtifact {
        topology: Topology::Triangles,
        positions,
        indices,
        uvs,
        scalars: values.iter().map(|&v| v as f32).collect(),
        lattice: Some([rows as u32, cols as u32]),
    }
}

/// Coordinates as `[lon, lat, alt]`.
///
/// Numeric arrays are read as rows of `lat, lon[, alt]`; object lists read
/// the `lat`, `lon` and optional `alt` keys.
fn coordinates(value: &DataValue, name: &str) -> Result<Vec<[f64; 3]>, GenerationError> {
    if let (Some(shape), Some(values)) = (value.numeric_shape(), value.numeric_values()) {
        return match shape.as_slice() {
            [0] => Ok(Vec::new()),
            [_, width @ (2 | 3)] => Ok(values
                .chunks(*width)
                .map(|row| [row[1], row[0], row.get(2).copied().unwrap_or(0.0)])
                .collect()),
            _ => Err(unusable(name, format!("unexpected coordinate shape {shape:?}"))),
        };
    }
    let items = value
        .as_json()
        .and_then(serde_json::Value::as_array)
        .ok_or_else(|| unusable(name, "expected a list of points"))?;
    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let num = |k: &str| item.get(k).and_then(serde_json::Value::as_f64);
            match (num("lat"), num("lon")) {
                (Some(lat), Some(lon)) => Ok([lon, lat, num("alt").unwrap_or(0.0)]),
                _ => Err(unusable(name, format!("element {i} lacks numeric lat/lon"))),
            }
        })
        .collect()
}

#[allow(clippy::cast_possible_truncation)]
fn to_f32(p: [f64; 3]) -> [f32; 3] {
    [p[0] as f32, p[1] as f32, p[2] as f32]
}

#[allow(clippy::cast_possible_truncation)]
fn sequential_indices(n: usize) -> Vec<u32> {
    (0..n as u32).collect()
}

#[allow(clippy::cast_possible_truncation)]
fn point_cloud(package: &DataPackage) -> Result<GeometryArtifact, GenerationError> {
    let coords = coordinates(field(package, "locations")?, "locations")?;
    let values = field(package, "values")?
        .numeric_values()
        .ok_or_else(|| unusable("values", "expected numbers"))?;
    if values.len() != coords.len() {
        return Err(unusable("values", "one value per location required"));
    }
    vertex_limit("locations", coords.len())?;
    Ok(GeometryArtifact {
        topology: Topology::Points,
        indices: sequential_indices(coords.len()),
        positions: coords.into_iter().map(to_f32).collect(),
        uvs: Vec::new(),
        scalars: values.iter().map(|&v| v as f32).collect(),
        lattice: None,
    })
}

#[allow(clippy::cast_possible_truncation)]
fn trajectory(package: &DataPackage) -> Result<GeometryArtifact, GenerationError> {
    let coords = coordinates(field(package, "positions")?, "positions")?;
    vertex_limit("positions", coords.len())?;
    let scalars: Vec<f32> = match package.get("intensities").and_then(DataValue::numeric_values) {
        Some(v) if v.len() == coords.len() => v.iter().map(|&x| x as f32).collect(),
        Some(_) => return Err(unusable("intensities", "one intensity per position required")),
        #[allow(clippy::cast_precision_loss)]
        None => (0..coords.len()).map(|i| i as f32).collect(),
    };
    Ok(GeometryArtifact {
        topology: Topology::LineStrip,
        indices: sequential_indices(coords.len()),
        positions: coords.into_iter().map(to_f32).collect(),
        uvs: Vec::new(),
        scalars,
        lattice: None,
    })
}

fn number_list(value: &serde_json::Value, name: &str) -> Result<Vec<f64>, GenerationError> {
    value
        .as_array()
        .and_then(|items| items.iter().map(serde_json::Value::as_f64).collect::<Option<Vec<_>>>())
        .ok_or_else(|| unusable(name, "expected a list of numbers"))
}

#[allow(clippy::cast_possible_truncation)]
fn vector_field(package: &DataPackage) -> Result<GeometryArtifact, GenerationError> {
    let points = field(package, "grid_points")?
        .as_json()
        .ok_or_else(|| unusable("grid_points", "expected an object"))?;
    let lats = number_list(points.get("lats").unwrap_or(&serde_json::Value::Null), "grid_points.lats")?;
    let lons = number_list(points.get("lons").unwrap_or(&serde_json::Value::Null), "grid_points.lons")?;
    let n = lats.len() * lons.len();

    let component = |name: &str| -> Result<Vec<f64>, GenerationError> {
        let values = field(package, name)?
            .numeric_values()
            .ok_or_else(|| unusable(name, "expected numbers"))?;
        if values.len() != n {
            return Err(unusable(name, format!("expected {n} values, found {}", values.len())));
        }
        Ok(values)
    };
    let u = component("u_component")?;
    let v = component("v_component")?;
    let magnitude = match package.get("magnitude") {
        Some(_) => component("magnitude")?,
        None => u.iter().zip(&v).map(|(a, b)| a.hypot(*b)).collect(),
    };
    vertex_limit("grid_points", n * 2)?;

    let spacing = |axis: &[f64]| {
        axis.windows(2)
            .map(|w| (w[1] - w[0]).abs())
            .filter(|d| *d > 0.0)
            .fold(f64::INFINITY, f64::min)
    };
    let step = spacing(lats.as_slice()).min(spacing(lons.as_slice()));
    let step = if step.is_finite() { step } else { 1.0 };
    let max_speed = u
        .iter()
        .zip(&v)
        .map(|(a, b)| a.hypot(*b))
        .filter(|m| m.is_finite())
        .fold(0.0, f64::max);
    let scale = if max_speed > 0.0 { step / max_speed } else { 0.0 };

    let mut positions = Vec::with_capacity(n * 2);
    let mut scalars = Vec::with_capacity(n * 2);
    for (i, lat) in lats.iter().enumerate() {
        for (j, lon) in lons.iter().enumerate() {
            let k = i * lons.len() + j;
            let (du, dv) = if u[k].is_finite() && v[k].is_finite() { (u[k], v[k]) } else { (0.0, 0.0) };
            positions.push(to_f32([*lon, *lat, 0.0]));
            positions.push(to_f32([lon + du * scale, lat + dv * scale, 0.0]));
            scalars.push(magnitude[k] as f32);
            scalars.push(magnitude[k] as f32);
        }
    }

    Ok(GeometryArtifact {
        topology: Topology::Lines,
        indices: sequential_indices(n * 2),
        positions,
        uvs: Vec::new(),
        scalars,
        lattice: None,
    })
}

fn quad(bounds: [f64; 4]) -> GeometryArtifact {
    let mut g = lattice(2, 2, &[f64::NAN; 4], bounds, 0.0);
    g.scalars.clear();
    g
}

/// Visualization type, shader name and shader features.
const SHADERS: &[(&str, &str, &[&str])] = &[
    ("heatmap", "scalar_field", &["colormap_lookup"]),
    ("contour", "contour_lines", &["colormap_lookup", "contour_levels"]),
    ("terrain", "displaced_surface", &["colormap_lookup", "vertical_scale"]),
    ("point_cloud", "point_sprites", &["colormap_lookup", "per_vertex_color"]),
    ("vector_field", "vector_glyphs", &["per_vertex_color", "animation"]),
    ("trajectory", "polyline", &["per_vertex_color", "animation"]),
    ("flat_overlay", "textured_quad", &[]),
];

/// Built-in generator for the catalog's visualization types.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReferenceGenerator;

impl ReferenceGenerator {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn shader_for(visualization_type: &str) -> Option<(&'static str, &'static [&'static str])> {
        SHADERS
            .iter()
            .find(|(vt, _, _)| *vt == visualization_type)
            .map(|(_, shader, features)| (*shader, *features))
    }
}

impl ArtifactGenerator for ReferenceGenerator {
    fn geometry(&self, package: &DataPackage) -> Result<GeometryArtifact, GenerationError> {
        match package.visualization_type.as_str() {
            "heatmap" | "contour" => {
                let (rows, cols, values) = grid(package, "grid")?;
                Ok(lattice(rows, cols, &values, bounds_or_unit(package), 0.0))
            }
            "terrain" => {
                let (rows, cols, values) = grid(package, "elevation")?;
                let scale = package.get("vertical_scale").and_then(DataValue::as_f64).unwrap_or(1.0);
                Ok(lattice(rows, cols, &values, bounds_or_unit(package), scale))
            }
            "point_cloud" => point_cloud(package),
            "vector_field" => vector_field(package),
            "trajectory" => trajectory(package),
            "flat_overlay" => Ok(quad(bounds_or_unit(package))),
            other => Err(GenerationError::UnsupportedType {
                visualization_type: other.to_string(),
            }),
        }
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    fn texture(&self, geometry: &GeometryArtifact, styling: &StylingConfig) -> Result<TextureArtifact, GenerationError> {
        styling.validate()?;
        let cmap = colormap(styling)?;
        let alpha = (styling.opacity * 255.0).round() as u8;
        let (lo, hi) = styling.resolve_range(geometry.scalar_range());

        let shade = |v: f64| -> [u8; 4] {
            if !v.is_finite() {
                return [0, 0, 0, 0];
            }
            let mut t = ((v - lo) / (hi - lo)).clamp(0.0, 1.0);
            if let Some(levels) = styling.levels {
                let n = f64::from(levels);
                t = if levels > 1 {
                    (t * n).floor().min(n - 1.0) / (n - 1.0)
                } else {
                    0.5
                };
            }
            let [r, g, b] = cmap.sample(t);
            [r, g, b, alpha]
        };

        match (geometry.lattice, geometry.scalars.is_empty()) {
            (Some([rows, cols]), false) => Ok(TextureArtifact {
                width: cols,
                height: rows,
                pixels: geometry.scalars.iter().flat_map(|&s| shade(f64::from(s))).collect(),
            }),
            (_, false) => Ok(TextureArtifact {
                width: LUT_WIDTH,
                height: 1,
                pixels: (0..LUT_WIDTH)
                    .flat_map(|i| shade(lo + (hi - lo) * f64::from(i) / f64::from(LUT_WIDTH - 1)))
                    .collect(),
            }),
            (_, true) => {
                let [r, g, b] = cmap.sample(0.5);
                Ok(TextureArtifact {
                    width: 1,
                    height: 1,
                    pixels: vec![r, g, b, alpha],
                })
            }
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn shader_params(
        &self,
        visualization_type: &str,
        geometry: &GeometryArtifact,
        styling: &StylingConfig,
    ) -> Result<ShaderParams, GenerationError> {
        styling.validate()?;
        colormap(styling)?;
        let (shader, features) = Self::shader_for(visualization_type).ok_or_else(|| GenerationError::UnsupportedType {
            visualization_type: visualization_type.to_string(),
        })?;

        let (lo, hi) = styling.resolve_range(geometry.scalar_range());
        let mut uniforms = BTreeMap::from([
            ("u_min".to_string(), lo),
            ("u_max".to_string(), hi),
            ("u_opacity".to_string(), styling.opacity),
            ("u_vertex_count".to_string(), geometry.vertex_count() as f64),
        ]);
        let levels = match visualization_type {
            "contour" => Some(styling.levels.unwrap_or(DEFAULT_CONTOUR_LEVELS)),
            _ => styling.levels,
        };
        if let Some(levels) = levels {
            uniforms.insert("u_levels".to_string(), f64::from(levels));
        }
        for (key, value) in &styling.extra {
            if let Some(v) = value.as_f64() {
                uniforms.insert(format!("u_{key}"), v);
            }
        }

        Ok(ShaderParams {
            shader: shader.to_string(),
            uniforms,
            colormap: styling.colormap.clone(),
            features: features.iter().map(|f| (*f).to_string()).collect(),
            parameters: styling.extra.clone(),
        })
    }

    fn monolithic(
        &self,
        package: &DataPackage,
        styling: &StylingConfig,
        cause: &GenerationError,
    ) -> Result<MonolithicArtifact, GenerationError> {
        let geometry = self
            .geometry(package)
            .unwrap_or_else(|_| quad(bounds_or_unit(package)));
        let usable = styling.validate().is_ok() && Colormap::from_name(&styling.colormap).is_some();
        let texture = if usable {
            self.texture(&geometry, styling)?
        } else {
            self.texture(&geometry, &StylingConfig::default())?
        };
        Ok(MonolithicArtifact {
            geometry,
            texture,
            reason: cause.to_string(),
        })
    }
}
