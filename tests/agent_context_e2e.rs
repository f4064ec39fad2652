use std::sync::{Arc, Barrier};
use std::thread;

use serde_json::json;

use vizpack::codec::{self, EncodeOptions};
use vizpack::{AnnotationRequest, DataPackage, NdArray, SharedPackage, StructuralError, Time, ValidationError};

fn hurricane_track() -> DataPackage {
    DataPackage::builder()
        .id("hurricane-idalia")
        .visualization_type("trajectory")
        .time(Time::now())
        .field(
            "positions",
            json!([
                {"lat": 21.0, "lon": -85.0, "timestamp": "2023-08-28T00:00:00Z"},
                {"lat": 25.3, "lon": -84.8, "timestamp": "2023-08-29T00:00:00Z"},
                {"lat": 29.9, "lon": -83.6, "timestamp": "2023-08-30T12:00:00Z"}
            ]),
        )
        .field("intensities", NdArray::from_vec(vec![65.0, 95.0, 125.0]))
        .build()
        .unwrap()
}

#[test]
fn narrative_groups_by_context_type_in_call_order() {
    let mut package = hurricane_track();
    package.add_expert_opinion("Rapid intensification over the Gulf", "nhc-forecaster", 0.95).unwrap();
    package
        .add_annotation(AnnotationRequest::new("Track within cone", "verification-bot").context_type("verification"))
        .unwrap();
    package.add_expert_opinion("Landfall near Keaton Beach", "nhc-forecaster", 0.8).unwrap();

    let expected = "## expert_opinion\n\
                    - nhc-forecaster: Rapid intensification over the Gulf\n\
                    - nhc-forecaster: Landfall near Keaton Beach\n\
                    \n\
                    ## verification\n\
                    - verification-bot: Track within cone\n";
    assert_eq!(package.narrative(), expected);

    let summary = package.context_summary();
    assert_eq!(summary.total_annotations, 3);
    assert_eq!(summary.unique_agents, 2);
    assert_eq!(summary.context_types, vec!["expert_opinion", "verification"]);
    assert_eq!(summary.expert_opinions, 2);
}

#[test]
fn rejected_annotations_leave_context_untouched() {
    let mut package = hurricane_track();
    let err = package
        .add_annotation(AnnotationRequest::new("", "agent-1"))
        .unwrap_err();
    assert!(matches!(err, ValidationError::EmptyField { .. }));
    let err = package
        .add_annotation(AnnotationRequest::new("Too sure", "agent-1").confidence(1.5))
        .unwrap_err();
    assert!(matches!(err, ValidationError::ConfidenceOutOfRange { .. }));
    assert_eq!(package.context_summary().total_annotations, 0);
    assert_eq!(package.narrative(), "");
}

#[test]
fn concurrent_producers_lose_nothing() {
    const PRODUCERS: usize = 8;
    const PER_PRODUCER: usize = 50;

    let shared = SharedPackage::new(hurricane_track());
    let barrier = Arc::new(Barrier::new(PRODUCERS));

    let handles: Vec<_> = (0..PRODUCERS)
        .map(|p| {
            let shared = shared.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for i in 0..PER_PRODUCER {
                    let context = if p % 2 == 0 { "observation" } else { "analysis" };
                    shared
                        .add_annotation(
                            AnnotationRequest::new(format!("note {i}"), format!("agent-{p}")).context_type(context),
                        )
                        .unwrap();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let package = shared.try_unwrap().unwrap();
    let summary = package.context_summary();
    assert_eq!(summary.total_annotations, PRODUCERS * PER_PRODUCER);
    assert_eq!(summary.unique_agents, PRODUCERS);
    assert_eq!(summary.context_types.len(), 2);

    // Each producer's own notes stay in call order within its group.
    let context = package.agent_context.as_ref().unwrap();
    for p in 0..PRODUCERS {
        let agent = format!("agent-{p}");
        let mine: Vec<_> = context
            .annotations_where(|a| a.agent_id() == agent)
            .into_iter()
            .map(|a| a.content().to_string())
            .collect();
        let expected: Vec<_> = (0..PER_PRODUCER).map(|i| format!("note {i}")).collect();
        assert_eq!(mine, expected);
    }
}

#[test]
fn annotations_survive_the_wire() {
    let mut package = hurricane_track();
    package.add_expert_opinion("Eyewall replacement cycle", "recon-analyst", 0.7).unwrap();
    let wire = codec::encode(&package, EncodeOptions::enhanced()).unwrap();

    let mut decoded = codec::decode(&wire).unwrap();
    assert_eq!(decoded.narrative(), package.narrative());

    // Appending after a decode continues the sequence.
    decoded.add_expert_opinion("Weakening after landfall", "recon-analyst", 0.9).unwrap();
    let context = decoded.agent_context.as_ref().unwrap();
    let ordered: Vec<_> = context.annotations().into_iter().map(|a| a.content().to_string()).collect();
    assert_eq!(ordered, vec!["Eyewall replacement cycle", "Weakening after landfall"]);
}

#[test]
fn tampered_annotations_are_refused_on_decode() {
    let mut package = hurricane_track();
    package.add_expert_opinion("Eyewall replacement cycle", "recon-analyst", 0.7).unwrap();
    let wire = codec::encode(&package, EncodeOptions::enhanced()).unwrap();

    let tampered = [
        ("confidence", json!(7.5)),
        ("agentId", json!("")),
        ("contextType", json!("verification")),
        ("sequence", json!(u64::MAX)),
    ];
    for (key, value) in tampered {
        let mut doc = wire.clone();
        doc["multiAgentContext"]["chains"][0]["annotations"][0][key] = value;
        let err = codec::decode(&doc).unwrap_err();
        assert!(
            matches!(err, StructuralError::InvalidField { ref field, .. } if field == "multiAgentContext"),
            "{key}: {err}"
        );
    }
}
