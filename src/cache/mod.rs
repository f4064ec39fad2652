//! Dynamic styling cache.
//!
//! Three tiers of derived artifacts:
//!
//! - **geometry**, keyed by package id, data fingerprint and visualization
//!   type. Never depends on styling.
//! - **texture**, keyed by the geometry key plus a styling fingerprint.
//! - **shader params**, keyed like textures but cheap to recompute, so by
//!   default only concurrent requests are coalesced.
//!
//! Restyling a package therefore reuses its mesh. When a tiered step fails
//! in texture or shader mode, the cache produces a single degraded
//! [`MonolithicArtifact`] and records the cause on the response.
//!
//! # Examples
//!
//! ```
//! use vizpack::cache::{ResolveMode, StylingCache, StylingConfig};
//! use vizpack::{DataPackage, NdArray, Time};
//!
//! let package = DataPackage::builder()
//!     .id("nyc-temp-001")
//!     .visualization_type("heatmap")
//!     .time(Time::now())
//!     .field("grid", NdArray::from_grid(vec![vec![20.0, 21.5], vec![22.0, 23.1]]).unwrap())
//!     .field("bounds", serde_json::json!([-74.1, 40.6, -73.9, 40.9]))
//!     .build()
//!     .unwrap();
//!
//! let cache = StylingCache::new();
//! let first = cache.resolve(&package, &StylingConfig::default(), ResolveMode::Texture).unwrap();
//! let restyled = cache.resolve(&package, &StylingConfig::new("coolwarm"), ResolveMode::Texture).unwrap();
//! assert!(!first.used_fallback());
//! assert_eq!(restyled.geometry, Some(vizpack::cache::CacheStatus::Hit));
//! ```

pub mod artifact;
pub mod generator;
pub mod key;
pub mod styling;
pub mod tier;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::codec;
use crate::config::CacheConfig;
use crate::error::{GenerationError, StructuralError, VizError, VizResult};
use crate::package::DataPackage;
use crate::storage::PackageStore;

pub use artifact::{Artifact, GeometryArtifact, MonolithicArtifact, ShaderParams, TextureArtifact, Topology};
pub use generator::{ArtifactGenerator, Colormap, ReferenceGenerator};
pub use key::{Fingerprint, GeometryKey, StyleKey};
pub use styling::StylingConfig;
pub use tier::{CacheStatus, TierCache, TierStats};

/// Which artifact a request wants.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolveMode {
    /// Geometry only. Never runs texture or shader work.
    GeometryOnly,
    #[default]
    Texture,
    ShaderParams,
}

/// Outcome of [`StylingCache::resolve`].
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved {
    pub artifact: Artifact,
    /// How the geometry tier answered; `None` on the fallback path.
    pub geometry: Option<CacheStatus>,
    /// How the texture or shader tier answered; `None` in geometry-only mode
    /// and on the fallback path.
    pub styling: Option<CacheStatus>,
    /// The tiered failure that triggered the monolithic fallback.
    pub fallback: Option<GenerationError>,
}

impl Resolved {
    #[must_use]
    pub const fn used_fallback(&self) -> bool {
        self.fallback.is_some()
    }
}

/// Counter snapshot across tiers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub geometry: TierStats,
    pub texture: TierStats,
    pub shader: TierStats,
    pub fallbacks: u64,
}

/// Three-tier artifact cache.
///
/// Shared between request threads behind an `Arc`; every method takes
/// `&self`.
pub struct StylingCache {
    generator: Arc<dyn ArtifactGenerator>,
    geometry: TierCache<GeometryKey, GeometryArtifact>,
    texture: TierCache<StyleKey, TextureArtifact>,
    shader: TierCache<StyleKey, ShaderParams>,
    fallbacks: AtomicU64,
}

impl std::fmt::Debug for StylingCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StylingCache")
            .field("geometry", &self.geometry)
            .field("texture", &self.texture)
            .field("shader", &self.shader)
            .finish_non_exhaustive()
    }
}

impl Default for StylingCache {
    fn default() -> Self {
        Self::new()
    }
}

impl StylingCache {
    /// Creates a cache with default capacities and the [`ReferenceGenerator`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(&CacheConfig::default())
    }

    #[must_use]
    pub fn with_config(config: &CacheConfig) -> Self {
        Self::with_generator(config, Arc::new(ReferenceGenerator::new()))
    }

    #[must_use]
    pub fn with_generator(config: &CacheConfig, generator: Arc<dyn ArtifactGenerator>) -> Self {
        Self {
            generator,
            geometry: TierCache::new("geometry", config.geometry_capacity),
            texture: TierCache::new("texture", config.texture_capacity),
            shader: TierCache::new("shader", config.shader_capacity),
            fallbacks: AtomicU64::new(0),
        }
    }

    /// Resolves the artifact for `package` styled by `styling`.
    ///
    /// # Errors
    ///
    /// - `VizError::Invalid` if the package is not well-formed.
    /// - `VizError::Generation` if geometry fails in geometry-only mode, or
    ///   if the monolithic fallback itself fails.
    pub fn resolve(&self, package: &DataPackage, styling: &StylingConfig, mode: ResolveMode) -> VizResult<Resolved> {
        package.ensure_valid()?;
        let key = GeometryKey::for_package(package);

        if mode == ResolveMode::GeometryOnly {
            let (geometry, status) = self.mesh(package, &key)?;
            return Ok(Resolved {
                artifact: Artifact::Geometry(geometry),
                geometry: Some(status),
                styling: None,
                fallback: None,
            });
        }

        match self.resolve_tiered(package, key, styling, mode) {
            Ok(resolved) => Ok(resolved),
            Err(cause) => self.fallback(package, styling, cause),
        }
    }

    fn mesh(
        &self,
        package: &DataPackage,
        key: &GeometryKey,
    ) -> Result<(Arc<GeometryArtifact>, CacheStatus), GenerationError> {
        self.geometry.get_or_generate(key, || self.generator.geometry(package))
    }

    fn resolve_tiered(
        &self,
        package: &DataPackage,
        key: GeometryKey,
        styling: &StylingConfig,
        mode: ResolveMode,
    ) -> Result<Resolved, GenerationError> {
        let (geometry, geometry_status) = self.mesh(package, &key)?;
        let style_key = StyleKey::new(key, styling);

        let (artifact, styling_status) = match mode {
            ResolveMode::ShaderParams => {
                let (params, status) = self.shader.get_or_generate(&style_key, || {
                    self.generator.shader_params(&package.visualization_type, &geometry, styling)
                })?;
                (Artifact::ShaderParams(params), status)
            }
            ResolveMode::Texture | ResolveMode::GeometryOnly => {
                let (texture, status) = self
                    .texture
                    .get_or_generate(&style_key, || self.generator.texture(&geometry, styling))?;
                (Artifact::Texture(texture), status)
            }
        };

        Ok(Resolved {
            artifact,
            geometry: Some(geometry_status),
            styling: Some(styling_status),
            fallback: None,
        })
    }

    fn fallback(&self, package: &DataPackage, styling: &StylingConfig, cause: GenerationError) -> VizResult<Resolved> {
        self.fallbacks.fetch_add(1, Ordering::Relaxed);
        tracing::warn!(
            package_id = %package.id,
            visualization_type = %package.visualization_type,
            error = %cause,
            "tiered generation failed, serving degraded monolithic artifact"
        );
        let artifact = self.generator.monolithic(package, styling, &cause)?;
        Ok(Resolved {
            artifact: Artifact::Monolithic(Arc::new(artifact)),
            geometry: None,
            styling: None,
            fallback: Some(cause),
        })
    }

    /// Resolves a request that names its package by id or carries it inline.
    ///
    /// A request-level visualization type overrides the package's own.
    ///
    /// # Errors
    ///
    /// `VizError::NotFound` for an unknown id, storage failures, and
    /// everything [`StylingCache::resolve`] returns.
    pub fn resolve_request(&self, store: &dyn PackageStore, request: &ResolveRequest) -> VizResult<Resolved> {
        let package: Arc<DataPackage> = match &request.package {
            PackageRef::Id(id) => store.get(id)?.ok_or_else(|| VizError::NotFound {
                package_id: id.clone(),
            })?,
            PackageRef::Inline(package) => Arc::new(package.as_ref().clone()),
        };

        match request.visualization_type.as_deref() {
            Some(vt) if vt != package.visualization_type => {
                let mut overridden = package.as_ref().clone();
                overridden.visualization_type = vt.to_string();
                self.resolve(&overridden, &request.styling, request.mode)
            }
            _ => self.resolve(&package, &request.styling, request.mode),
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            geometry: self.geometry.stats(),
            texture: self.texture.stats(),
            shader: self.shader.stats(),
            fallbacks: self.fallbacks.load(Ordering::Relaxed),
        }
    }

    /// Drops every retained artifact. Counters are kept.
    pub fn clear(&self) {
        self.geometry.clear();
        self.texture.clear();
        self.shader.clear();
    }
}

/// Package named by a resolution request.
#[derive(Debug, Clone, PartialEq)]
pub enum PackageRef {
    Id(String),
    Inline(Box<DataPackage>),
}

/// A cache resolution request.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolveRequest {
    pub package: PackageRef,
    pub visualization_type: Option<String>,
    pub styling: StylingConfig,
    pub mode: ResolveMode,
}

impl ResolveRequest {
    #[must_use]
    pub fn by_id(id: impl Into<String>) -> Self {
        Self::new(PackageRef::Id(id.into()))
    }

    #[must_use]
    pub fn inline(package: DataPackage) -> Self {
        Self::new(PackageRef::Inline(Box::new(package)))
    }

    fn new(package: PackageRef) -> Self {
        Self {
            package,
            visualization_type: None,
            styling: StylingConfig::default(),
            mode: ResolveMode::default(),
        }
    }

    #[must_use]
    pub fn visualization_type(mut self, visualization_type: impl Into<String>) -> Self {
        self.visualization_type = Some(visualization_type.into());
        self
    }

    #[must_use]
    pub fn styling(mut self, styling: StylingConfig) -> Self {
        self.styling = styling;
        self
    }

    #[must_use]
    pub const fn mode(mut self, mode: ResolveMode) -> Self {
        self.mode = mode;
        self
    }

    /// Parses the wire form:
    ///
    /// ```json
    /// {"packageId": "nyc-temp-001", "visualizationType": "heatmap",
    ///  "stylingConfig": {"colormap": "coolwarm"}, "mode": "texture"}
    /// ```
    ///
    /// `package` (a full wire package) may replace `packageId`.
    ///
    /// # Errors
    ///
    /// Returns `StructuralError` when neither or both package forms are
    /// present, or when a field has the wrong shape.
    pub fn from_document(doc: &serde_json::Value) -> Result<Self, StructuralError> {
        let obj = doc.as_object().ok_or(StructuralError::NotAnObject)?;
        let present = |name: &str| obj.get(name).filter(|v| !v.is_null());

        let package = match (present("packageId"), present("package")) {
            (Some(id), None) => PackageRef::Id(
                id.as_str()
                    .ok_or_else(|| invalid("packageId", "expected a string"))?
                    .to_string(),
            ),
            (None, Some(inline)) => PackageRef::Inline(Box::new(codec::decode(inline)?)),
            (None, None) => {
                return Err(StructuralError::MissingField {
                    field: "packageId".to_string(),
                })
            }
            (Some(_), Some(_)) => return Err(invalid("package", "packageId and package are mutually exclusive")),
        };

        let visualization_type = present("visualizationType")
            .map(|v| {
                v.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| invalid("visualizationType", "expected a string"))
            })
            .transpose()?;
        let styling = present("stylingConfig")
            .map(|v| serde_json::from_value(v.clone()).map_err(|e| invalid("stylingConfig", &e.to_string())))
            .transpose()?
            .unwrap_or_default();
        let mode = present("mode")
            .map(|v| serde_json::from_value(v.clone()).map_err(|e| invalid("mode", &e.to_string())))
            .transpose()?
            .unwrap_or_default();

        Ok(Self {
            package,
            visualization_type,
            styling,
            mode,
        })
    }
}

fn invalid(field: &str, reason: &str) -> StructuralError {
    StructuralError::InvalidField {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryPackageStore;
    use crate::time::Time;
    use crate::value::NdArray;
    use serde_json::json;

    fn heatmap(id: &str) -> DataPackage {
        DataPackage::builder()
            .id(id)
            .visualization_type("heatmap")
            .time(Time::now())
            .field("grid", NdArray::from_grid(vec![vec![1.0, 2.0, 3.0]; 3]).unwrap())
            .field("bounds", json!([-74.1, 40.6, -73.9, 40.9]))
            .build()
            .unwrap()
    }

    #[test]
    fn test_geometry_only_never_styles() {
        let cache = StylingCache::new();
        let resolved = cache
            .resolve(&heatmap("a"), &StylingConfig::new("no-such-ramp"), ResolveMode::GeometryOnly)
            .unwrap();
        assert_eq!(resolved.artifact.kind(), "geometry");
        assert_eq!(resolved.styling, None);
        let stats = cache.stats();
        assert_eq!(stats.texture.generations + stats.shader.generations, 0);
    }

    #[test]
    fn test_restyle_reuses_geometry() {
        let cache = StylingCache::new();
        let pkg = heatmap("a");
        let first = cache.resolve(&pkg, &StylingConfig::default(), ResolveMode::Texture).unwrap();
        assert_eq!((first.geometry, first.styling), (Some(CacheStatus::Miss), Some(CacheStatus::Miss)));

        let second = cache.resolve(&pkg, &StylingConfig::new("grayscale"), ResolveMode::Texture).unwrap();
        assert_eq!((second.geometry, second.styling), (Some(CacheStatus::Hit), Some(CacheStatus::Miss)));

        let third = cache.resolve(&pkg, &StylingConfig::default(), ResolveMode::Texture).unwrap();
        assert_eq!(third.styling, Some(CacheStatus::Hit));
        assert_eq!(cache.stats().geometry.generations, 1);
    }

    #[test]
    fn test_shader_params_recomputed_by_default() {
        let cache = StylingCache::new();
        let pkg = heatmap("a");
        let styling = StylingConfig::default().levels(64);
        for _ in 0..2 {
            let resolved = cache.resolve(&pkg, &styling, ResolveMode::ShaderParams).unwrap();
            assert_eq!(resolved.styling, Some(CacheStatus::Miss));
            let params = resolved.artifact.as_shader_params().unwrap();
            assert_eq!(params.uniforms.get("u_levels"), Some(&64.0));
        }
        assert_eq!(cache.stats().shader.generations, 2);
        assert_eq!(cache.stats().geometry.generations, 1);
    }

    #[test]
    fn test_bad_styling_falls_back() {
        let cache = StylingCache::new();
        let resolved = cache
            .resolve(&heatmap("a"), &StylingConfig::default().opacity(3.0), ResolveMode::Texture)
            .unwrap();
        assert!(resolved.used_fallback());
        assert!(resolved.artifact.is_degraded());
        assert!(matches!(resolved.fallback, Some(GenerationError::InvalidStyling { .. })));
        assert_eq!(cache.stats().fallbacks, 1);
        assert!(cache.stats().geometry.entries > 0);
    }

    #[test]
    fn test_unknown_type_falls_back_or_errors_by_mode() {
        let cache = StylingCache::new();
        let mut pkg = heatmap("a");
        pkg.visualization_type = "hologram".to_string();

        let resolved = cache.resolve(&pkg, &StylingConfig::default(), ResolveMode::ShaderParams).unwrap();
        assert!(matches!(resolved.fallback, Some(GenerationError::UnsupportedType { .. })));

        let err = cache.resolve(&pkg, &StylingConfig::default(), ResolveMode::GeometryOnly).unwrap_err();
        assert!(err.is_generation());
    }

    #[test]
    fn test_invalid_package_rejected() {
        let cache = StylingCache::new();
        let mut pkg = heatmap("a");
        pkg.data.remove("bounds");
        let err = cache.resolve(&pkg, &StylingConfig::default(), ResolveMode::Texture).unwrap_err();
        assert!(err.is_invalid());
        assert_eq!(cache.stats().geometry.generations, 0);
    }

    #[test]
    fn test_resolve_request_by_id() {
        let store = InMemoryPackageStore::new();
        store.insert(heatmap("stored")).unwrap();
        let cache = StylingCache::new();

        let resolved = cache.resolve_request(&store, &ResolveRequest::by_id("stored")).unwrap();
        assert_eq!(resolved.artifact.kind(), "texture");

        let err = cache.resolve_request(&store, &ResolveRequest::by_id("missing")).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_request_type_override() {
        let store = InMemoryPackageStore::new();
        let cache = StylingCache::new();
        let request = ResolveRequest::inline(heatmap("a"))
            .visualization_type("contour")
            .mode(ResolveMode::ShaderParams);
        let resolved = cache.resolve_request(&store, &request).unwrap();
        assert_eq!(resolved.artifact.as_shader_params().unwrap().shader, "contour_lines");
    }

    #[test]
    fn test_request_from_document() {
        let request = ResolveRequest::from_document(&json!({
            "packageId": "nyc-temp-001",
            "stylingConfig": {"colormap": "coolwarm", "min": 0.0, "max": 40.0},
            "mode": "shader_params"
        }))
        .unwrap();
        assert_eq!(request.package, PackageRef::Id("nyc-temp-001".to_string()));
        assert_eq!(request.mode, ResolveMode::ShaderParams);
        assert_eq!(request.styling.colormap, "coolwarm");

        let err = ResolveRequest::from_document(&json!({"mode": "texture"})).unwrap_err();
        assert!(matches!(err, StructuralError::MissingField { .. }));

        let err = ResolveRequest::from_document(&json!({"packageId": "a", "mode": "sculpture"})).unwrap_err();
        assert!(matches!(err, StructuralError::InvalidField { ref field, .. } if field == "mode"));
    }
}
