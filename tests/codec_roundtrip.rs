use chrono::{DateTime, TimeZone, Utc};
use proptest::prelude::*;
use serde_json::json;

use vizpack::codec::{self, EncodeOptions, MINIMAL_FIELDS};
use vizpack::{
    AnnotationRequest, DataPackage, MultiResolutionData, NdArray, Relationship, SemanticContext, StructuralError,
    Time, VisualSummary,
};

fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).single().unwrap()
}

fn enhanced_heatmap() -> DataPackage {
    let mut summary = VisualSummary::default();
    summary.set_thumbnail(vec![0x89, b'P', b'N', b'G', 0, 1, 2, 3]);
    summary.color_palette = vec!["#440154".to_string(), "#fde725".to_string()];

    let mut levels = MultiResolutionData::default();
    levels.overview.insert("mean".to_string(), json!(21.4));
    levels.processed_variants.insert("anomaly".to_string(), {
        let mut m = vizpack::DataMap::new();
        m.insert("grid".to_string(), NdArray::from_grid(vec![vec![0.1, -0.2]]).unwrap().into());
        m
    });

    let mut package = DataPackage::builder()
        .id("nyc-temp-001")
        .visualization_type("heatmap")
        .time(Time::interval(at(1_689_400_000), at(1_689_403_600)).unwrap())
        .field("grid", NdArray::from_grid(vec![vec![20.0, 21.5, 22.0], vec![22.0, 23.1, 24.4]]).unwrap())
        .field("bounds", json!([-74.1, 40.6, -73.9, 40.9]))
        .field("units", "celsius")
        .metadata("source", json!("NOAA"))
        .semantic_context(
            SemanticContext::new("Afternoon surface temperature over Manhattan")
                .with_tags(["temperature", "urban"])
                .with_relationship(Relationship::new("follows", "nyc-temp-000")),
        )
        .visual_summary(summary)
        .multi_resolution(levels)
        .build()
        .unwrap();

    package.add_expert_opinion("Heat island is pronounced", "meteorologist-1", 0.9).unwrap();
    package
        .add_annotation(AnnotationRequest::new("Sensor 4 drifts warm", "qa-bot").context_type("quality"))
        .unwrap();
    package
}

#[test]
fn enhanced_roundtrip_is_lossless() {
    let package = enhanced_heatmap();
    let wire = codec::encode(&package, EncodeOptions::enhanced()).unwrap();
    assert_eq!(codec::decode(&wire).unwrap(), package);
}

#[test]
fn string_roundtrip_is_lossless() {
    let package = enhanced_heatmap();
    let text = codec::to_json_pretty(&package, EncodeOptions::enhanced()).unwrap();
    assert_eq!(codec::from_json_str(&text).unwrap(), package);
}

#[test]
fn minimal_encoding_has_exactly_five_fields() {
    let wire = codec::encode(&enhanced_heatmap(), EncodeOptions::minimal()).unwrap();
    let mut keys: Vec<_> = wire.as_object().unwrap().keys().cloned().collect();
    keys.sort();
    let mut expected: Vec<_> = MINIMAL_FIELDS.iter().map(|f| (*f).to_string()).collect();
    expected.sort();
    assert_eq!(keys, expected);
}

#[test]
fn minimal_decode_drops_satellites() {
    let package = enhanced_heatmap();
    let decoded = codec::decode(&codec::legacy_projection(&package).unwrap()).unwrap();
    assert_eq!(decoded.data, package.data);
    assert!(decoded.semantic_context.is_none());
    assert!(decoded.agent_context.is_none());
}

#[test]
fn invalid_package_is_not_encoded() {
    let mut package = enhanced_heatmap();
    package.data.remove("grid");
    let err = codec::encode(&package, EncodeOptions::minimal()).unwrap_err();
    assert!(err.is_invalid());
}

#[test]
fn decode_reports_structural_problems() {
    let mut wire = codec::encode(&enhanced_heatmap(), EncodeOptions::minimal()).unwrap();
    wire.as_object_mut().unwrap().remove("time");
    assert!(matches!(
        codec::decode(&wire),
        Err(StructuralError::MissingField { ref field }) if field == "time"
    ));

    wire["time"] = json!({"type": "epoch", "at": "2023-07-15T14:30:00Z"});
    assert!(matches!(codec::decode(&wire), Err(StructuralError::UnknownTimeVariant { .. })));

    wire["time"] = json!({"type": "interval", "start": "2023-07-15T15:00:00Z", "end": "2023-07-15T14:00:00Z"});
    assert!(matches!(codec::decode(&wire), Err(StructuralError::InvalidTime(_))));

    assert!(matches!(codec::decode(&json!([1, 2])), Err(StructuralError::NotAnObject)));
}

fn grid_strategy() -> impl Strategy<Value = Vec<Vec<f64>>> {
    (1usize..6, 1usize..6).prop_flat_map(|(rows, cols)| {
        prop::collection::vec(prop::collection::vec(-1.0e6f64..1.0e6, cols), rows)
    })
}

fn time_strategy() -> impl Strategy<Value = Time> {
    prop_oneof![
        (0i64..4_000_000_000).prop_map(|s| Time::instant(at(s))),
        (0i64..2_000_000_000, 0i64..1_000_000).prop_map(|(s, d)| Time::interval(at(s), at(s + d)).unwrap()),
        prop::collection::vec(0i64..4_000_000_000, 1..8).prop_map(|mut v| {
            v.sort_unstable();
            Time::series(v.into_iter().map(at).collect()).unwrap()
        }),
    ]
}

proptest! {
    #[test]
    fn wire_roundtrip_holds_for_valid_packages(
        grid in grid_strategy(),
        time in time_strategy(),
        id in "[a-z0-9-]{1,24}",
        notes in prop::collection::vec(("[a-z][a-z ]{0,29}", "[a-z]{1,8}", 0.0f32..=1.0), 0..6),
    ) {
        let mut package = DataPackage::builder()
            .id(id)
            .visualization_type("contour")
            .time(time)
            .field("grid", NdArray::from_grid(grid).unwrap())
            .field("bounds", json!([-10.0, -5.0, 10.0, 5.0]))
            .build()
            .unwrap();
        for (content, agent, confidence) in notes {
            package.add_annotation(AnnotationRequest::new(content, agent).confidence(confidence)).unwrap();
        }

        let wire = codec::encode(&package, EncodeOptions::enhanced()).unwrap();
        prop_assert_eq!(codec::decode(&wire).unwrap(), package);
    }
}
