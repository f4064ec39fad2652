//! Optional satellite structures attached to a package.
//!
//! None of these participate in validation. They are descriptive payloads
//! for discovery, previews and level-of-detail delivery, and are only
//! emitted on the wire when enhanced output is requested.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::value::DataMap;

type JsonMap = serde_json::Map<String, serde_json::Value>;

/// Natural-language and tag metadata describing what a package shows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SemanticContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub natural_description: Option<String>,
    pub semantic_tags: Vec<String>,
    pub geographic_context: JsonMap,
    pub temporal_context: JsonMap,
    pub data_insights: JsonMap,
    pub relationships: Vec<Relationship>,
    pub search_keywords: Vec<String>,
}

impl SemanticContext {
    #[must_use]
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            natural_description: Some(description.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.semantic_tags.extend(tags.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn with_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.search_keywords.extend(keywords.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn with_relationship(mut self, relationship: Relationship) -> Self {
        self.relationships.push(relationship);
        self
    }

    /// Ids of every package this one refers to, in first-mention order.
    #[must_use]
    pub fn related_package_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = Vec::new();
        for id in self.relationships.iter().flat_map(|r| r.related_packages.iter()) {
            if !ids.contains(&id.as_str()) {
                ids.push(id);
            }
        }
        ids
    }
}

/// Link from a package to others, by id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Relationship {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub related_packages: Vec<String>,
}

impl Relationship {
    #[must_use]
    pub fn new(kind: impl Into<String>, related: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            description: String::new(),
            related_packages: vec![related.into()],
        }
    }

    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Preview material for a package.
///
/// Never authoritative: consumers must not derive data from it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VisualSummary {
    #[serde(with = "thumbnail_base64", skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<Vec<u8>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vector_preview: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visual_hash: Option<String>,
    pub color_palette: Vec<String>,
    pub visual_stats: JsonMap,
}

impl VisualSummary {
    /// Stores a thumbnail and records its BLAKE3 digest as the visual hash.
    pub fn set_thumbnail(&mut self, bytes: Vec<u8>) {
        self.visual_hash = Some(blake3::hash(&bytes).to_hex().to_string());
        self.thumbnail = Some(bytes);
    }
}

mod thumbnail_base64 {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error> {
        match bytes {
            Some(b) => serializer.serialize_str(&STANDARD.encode(b)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error> {
        let encoded: Option<String> = Option::deserialize(deserializer)?;
        encoded
            .map(|s| STANDARD.decode(s).map_err(serde::de::Error::custom))
            .transpose()
    }
}

/// Level-of-detail variants of a package's data.
///
/// Levels are independent: nothing checks that a reduced level agrees with
/// the full one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MultiResolutionData {
    pub overview: JsonMap,
    pub summary_stats: JsonMap,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reduced_resolution: Option<DataMap>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_resolution: Option<DataMap>,
    pub processed_variants: BTreeMap<String, DataMap>,
}

impl MultiResolutionData {
    /// Names of the populated levels, coarsest first. Processed variants
    /// are listed as `variant:<name>`.
    #[must_use]
    pub fn levels(&self) -> Vec<String> {
        let mut levels = Vec::new();
        if !self.overview.is_empty() {
            levels.push("overview".to_string());
        }
        if !self.summary_stats.is_empty() {
            levels.push("summary_stats".to_string());
        }
        if self.reduced_resolution.is_some() {
            levels.push("reduced_resolution".to_string());
        }
        if self.full_resolution.is_some() {
            levels.push("full_resolution".to_string());
        }
        levels.extend(self.processed_variants.keys().map(|k| format!("variant:{k}")));
        levels
    }

    #[must_use]
    pub fn variant(&self, name: &str) -> Option<&DataMap> {
        self.processed_variants.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_semantic_context_wire_names() {
        let ctx = SemanticContext::new("Surface temperature over Manhattan")
            .with_tags(["temperature", "urban"])
            .with_relationship(Relationship::new("derived_from", "raw-sensors-7"));
        let json = serde_json::to_value(&ctx).unwrap();
        assert_eq!(json["naturalDescription"], "Surface temperature over Manhattan");
        assert_eq!(json["semanticTags"], json!(["temperature", "urban"]));
        assert_eq!(json["relationships"][0]["type"], "derived_from");
        assert_eq!(json["relationships"][0]["relatedPackages"], json!(["raw-sensors-7"]));
    }

    #[test]
    fn test_related_ids_deduplicated() {
        let ctx = SemanticContext::default()
            .with_relationship(Relationship::new("overlaps", "a"))
            .with_relationship(Relationship::new("follows", "b"))
            .with_relationship(Relationship::new("derived_from", "a"));
        assert_eq!(ctx.related_package_ids(), vec!["a", "b"]);
    }

    #[test]
    fn test_thumbnail_travels_as_base64() {
        let mut summary = VisualSummary::default();
        summary.set_thumbnail(vec![0x89, b'P', b'N', b'G']);
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["thumbnail"], "iVBORw==");
        assert_eq!(json["visualHash"].as_str().map(str::len), Some(64));

        let back: VisualSummary = serde_json::from_value(json).unwrap();
        assert_eq!(back, summary);
    }

    #[test]
    fn test_missing_thumbnail_is_absent() {
        let json = serde_json::to_value(VisualSummary::default()).unwrap();
        assert!(json.get("thumbnail").is_none());
        let back: VisualSummary = serde_json::from_value(json!({})).unwrap();
        assert!(back.thumbnail.is_none());
    }

    #[test]
    fn test_levels_listed_in_order() {
        let mut mr = MultiResolutionData::default();
        assert!(mr.levels().is_empty());

        mr.overview.insert("mean".to_string(), json!(21.3));
        mr.full_resolution = Some(DataMap::new());
        mr.processed_variants.insert("smoothed".to_string(), DataMap::new());
        assert_eq!(mr.levels(), vec!["overview", "full_resolution", "variant:smoothed"]);
        assert!(mr.variant("smoothed").is_some());
    }
}
