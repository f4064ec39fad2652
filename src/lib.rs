//! # vizpack - Validated data packages for visualization back-ends
//!
//! vizpack packages geospatial, time-indexed data for delivery to
//! heterogeneous renderers, and keeps repeated re-renders cheap when only
//! the styling changes.
//!
//! ## Core Concepts
//!
//! - **DataPackage**: a `data` map, a [`Time`] stamp and the visualization type
//!   that says how `data` must be shaped
//! - **Schema catalog**: registry from visualization type to required fields, used
//!   for validation and type suggestion
//! - **Wire codec**: lossless JSON encoding, minimal or with every satellite
//! - **Multi-agent context**: append-only annotations from independent producers,
//!   grouped by context type
//! - **Styling cache**: geometry, texture and shader-parameter tiers, so that a
//!   new colormap never regenerates a mesh
//!
//! ## Usage
//!
//! ```rust
//! use vizpack::cache::{ResolveMode, StylingCache, StylingConfig};
//! use vizpack::codec::{self, EncodeOptions};
//! use vizpack::{AnnotationRequest, DataPackage, NdArray, Time};
//!
//! let mut package = DataPackage::builder()
//!     .id("nyc-temp-001")
//!     .visualization_type("heatmap")
//!     .time(Time::now())
//!     .field("grid", NdArray::from_grid(vec![vec![20.0, 21.5], vec![22.0, 23.1]]).unwrap())
//!     .field("bounds", serde_json::json!([-74.1, 40.6, -73.9, 40.9]))
//!     .build()
//!     .unwrap();
//!
//! package
//!     .add_annotation(AnnotationRequest::new("Urban heat island visible", "climate-agent").confidence(0.9))
//!     .unwrap();
//!
//! let wire = codec::encode(&package, EncodeOptions::enhanced()).unwrap();
//! assert_eq!(codec::decode(&wire).unwrap(), package);
//!
//! let cache = StylingCache::new();
//! let texture = cache.resolve(&package, &StylingConfig::new("coolwarm"), ResolveMode::Texture).unwrap();
//! assert_eq!(texture.artifact.kind(), "texture");
//! ```

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Data model
pub mod catalog;
pub mod context;
pub mod error;
pub mod package;
pub mod time;
pub mod value;

// Validation, wire format and annotations
pub mod agent;
pub mod codec;
pub mod validation;

// Artifacts, storage and configuration
pub mod cache;
pub mod config;
pub mod storage;

// Re-export primary types at crate root for convenience
pub use agent::{
    AgentAnnotation, AgentContextChain, AnnotationId, AnnotationRequest, Consensus, ContextSummary,
    MultiAgentContext, SharedPackage,
};
pub use catalog::{FieldKind, FieldSpec, SchemaCatalog, VisualizationSchema};
pub use codec::EncodeOptions;
pub use config::{CacheConfig, VizConfig};
pub use context::{MultiResolutionData, Relationship, SemanticContext, VisualSummary};
pub use error::{GenerationError, StructuralError, ValidationError, VizError, VizResult};
pub use package::{DataPackage, DataPackageBuilder};
pub use storage::{InMemoryPackageStore, PackageStore};
pub use time::Time;
pub use validation::Validator;
pub use value::{DType, DataMap, DataValue, NdArray};
