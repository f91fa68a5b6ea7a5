//! End-to-end loader tests against the in-memory session.
//!
//! Graphs are built in memory, encoded with the wire encoder and fed through
//! `load` exactly like a payload read from disk.

use approx::assert_relative_eq;
use serde_json::json;
use tokio::sync::broadcast::Receiver;
use tokio_test::{assert_err, assert_ok};
use vgraph_core::mapper::BindingWarning;
use vgraph_core::types::{ColumnGroups, RawColumn};
use vgraph_core::wire::{self, DecodeError};
use vgraph_core::{AttributeTarget, SemanticType, SidecarMetadata, Values, VectorGraph};
use vgraph_loader::memory::{FailPoint, SessionOp};
use vgraph_loader::session::{AllocationHint, LOCAL_BUFFER};
use vgraph_loader::{
    load, LoadError, LoadEvent, MemorySession, PipelineOptions, SessionError, Stage,
};

fn vertex(name: &str, values: Values) -> RawColumn {
    RawColumn::new(name, AttributeTarget::Vertex, values)
}

fn edge(name: &str, values: Values) -> RawColumn {
    RawColumn::new(name, AttributeTarget::Edge, values)
}

fn numbers(values: &[f64]) -> Values {
    Values::Number(values.to_vec())
}

fn encode(version: u32, vertex_count: u32, edges: &[(u32, u32)], columns: ColumnGroups) -> Vec<u8> {
    wire::encode(&VectorGraph {
        version,
        name: "test".to_string(),
        graph_type: 0,
        vertex_count,
        edge_count: edges.len() as u32,
        edges: edges.to_vec(),
        columns,
    })
}

fn metadata(value: serde_json::Value) -> SidecarMetadata {
    serde_json::from_value(value).unwrap()
}

fn seeded() -> PipelineOptions {
    PipelineOptions {
        seed: Some(11),
        ..Default::default()
    }
}

fn drain(rx: &mut Receiver<LoadEvent>) -> Vec<LoadEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn status(s: &str) -> LoadEvent {
    LoadEvent::LoadingStatus(s.to_string())
}

/// Path 0 -> 1 -> 2 with sizes and labels.
fn path_v0() -> Vec<u8> {
    let columns = ColumnGroups {
        uint32: vec![vertex("pointSize", numbers(&[1.0, 2.0, 3.0]))],
        string: vec![vertex(
            "pointLabel",
            Values::Text(vec!["a".into(), "b".into(), "c".into()]),
        )],
        ..Default::default()
    };
    encode(0, 3, &[(0, 1), (1, 2)], columns)
}

/// Metadata matching the single-partition v1 graph built by `triangle_v1`.
fn triangle_metadata() -> serde_json::Value {
    json!({
        "mapper": "opentsdb",
        "nodes": [{
            "count": 3,
            "attributes": {"degree": {}, "label": {}},
            "encodings": {
                "pointSize": {"attributes": ["degree"]},
                "nodeId": {"attributes": ["label"]}
            }
        }],
        "edges": [{
            "count": 3,
            "attributes": {"bytes": {}},
            "encodings": {}
        }]
    })
}

fn triangle_v1() -> Vec<u8> {
    let columns = ColumnGroups {
        int32: vec![vertex("degree", numbers(&[2.0, 2.0, 2.0]))],
        string: vec![vertex(
            "label",
            Values::Text(vec!["x".into(), "y".into(), "z".into()]),
        )],
        int64: vec![edge("bytes", numbers(&[10.0, 1000.0, 100000.0]))],
        ..Default::default()
    };
    encode(1, 3, &[(0, 1), (1, 2), (2, 0)], columns)
}

#[tokio::test]
async fn test_v0_runs_every_stage_in_order() {
    let mut session = MemorySession::new();
    let mut rx = session.events().subscribe();

    let loaded = assert_ok!(load(&mut session, &path_v0(), None, &seeded()).await);

    assert_eq!(loaded.mapper, "default");
    assert!(loaded.seeded_positions);
    assert!(loaded.warnings.is_empty());
    assert_eq!(
        drain(&mut rx),
        vec![
            LoadEvent::SizesForAllocation(AllocationHint { point: 3, edge: 2 }),
            status("Initializing positions"),
            status("Binding nodes"),
            status("Binding edges"),
            status("Binding everything else"),
        ]
    );

    let history = session.history();
    let position = |op: &SessionOp| history.iter().position(|h| h == op).unwrap();
    assert_eq!(history[0], SessionOp::LoadDataframe);
    assert!(position(&SessionOp::SetVertices) < position(&SessionOp::SetEdges));
    assert!(
        position(&SessionOp::SetEdges)
            < position(&SessionOp::LoadColumn("__pointCommunity".to_string()))
    );

    assert_eq!(session.vertices().unwrap().len(), 3);
    assert_eq!(session.edges().unwrap(), &[(0, 1), (1, 2)]);
}

#[tokio::test]
async fn test_sizing_hint_precedes_dataframe_load() {
    let mut session = MemorySession::new().fail_at(FailPoint::LoadDataframe);
    let mut rx = session.events().subscribe();

    let err = assert_err!(load(&mut session, &path_v0(), None, &seeded()).await);

    assert!(matches!(err, LoadError::Stage { stage: Stage::Init, .. }));
    assert_eq!(
        drain(&mut rx),
        vec![LoadEvent::SizesForAllocation(AllocationHint { point: 3, edge: 2 })]
    );
    assert_eq!(session.history(), &[SessionOp::LoadDataframe]);
}

#[tokio::test]
async fn test_edge_weights_follow_sorted_edges() {
    let columns = ColumnGroups {
        double: vec![edge("edgeWeight", numbers(&[1.0, 3.0]))],
        ..Default::default()
    };
    let bytes = encode(0, 3, &[(1, 0), (0, 2)], columns);
    let mut session = MemorySession::new();

    assert_ok!(load(&mut session, &bytes, None, &seeded()).await);

    // normalize_float over [1, 3] into [0.5, 1.5]: span / 3
    let weights = session.column("edge", "__edgeWeights").unwrap();
    let weights = weights.values.as_numbers().unwrap();
    assert_relative_eq!(weights[0], 0.5);
    assert_relative_eq!(weights[1], 0.5 + 2.0 / 3.0);

    let forwards = session.evaluate("hostBuffer", "forwardsEdgeWeights").unwrap();
    let forwards = forwards.as_numbers().unwrap();
    assert_relative_eq!(forwards[0], 0.5 + 2.0 / 3.0);
    assert_relative_eq!(forwards[1], 0.5);

    let backwards = session.evaluate("hostBuffer", "backwardsEdgeWeights").unwrap();
    let backwards = backwards.as_numbers().unwrap();
    assert_relative_eq!(backwards[0], 0.5);
    assert_relative_eq!(backwards[1], 0.5 + 2.0 / 3.0);
}

#[tokio::test]
async fn test_v0_defaults_and_channels() {
    let mut session = MemorySession::new();
    assert_ok!(load(&mut session, &path_v0(), None, &seeded()).await);

    // degrees [1, 2, 1]
    assert_eq!(
        session.column("point", "__defaultPointSize").unwrap().values,
        numbers(&[5.0, 26.0, 5.0])
    );
    assert_eq!(
        session.column("point", "__pointCommunity").unwrap().values,
        numbers(&[1.0, 1.0, 1.0])
    );

    // pointSize goes through normalize(v, 5, 256)
    assert_eq!(
        session.evaluate(LOCAL_BUFFER, "pointSizes").unwrap(),
        numbers(&[5.0, 88.0, 172.0])
    );
    let labels = session.column("point", "__pointLabels").unwrap();
    assert_eq!(labels.value_type, SemanticType::String);
    assert!(session.computed("hostBuffer", "pointLabels").is_some());

    // midEdgeColor had nothing bound and falls back to clearing
    assert_eq!(session.mid_edge_colors(), Some(None));
}

#[tokio::test]
async fn test_existing_positions_skip_seeding() {
    let columns = ColumnGroups {
        double: vec![
            vertex("x", numbers(&[1.0, 2.0])),
            vertex("y", numbers(&[3.0, 4.0])),
        ],
        ..Default::default()
    };
    let bytes = encode(0, 2, &[(0, 1)], columns);
    let mut session = MemorySession::new();
    let mut rx = session.events().subscribe();

    let loaded = assert_ok!(load(&mut session, &bytes, None, &seeded()).await);

    assert!(!loaded.seeded_positions);
    assert!(loaded.warnings.is_empty());
    assert_eq!(session.vertices().unwrap(), &[[1.0, 3.0], [2.0, 4.0]]);
    assert!(!drain(&mut rx).contains(&status("Initializing positions")));
}

#[tokio::test]
async fn test_seeded_layout_is_reproducible() {
    let mut a = MemorySession::new();
    let mut b = MemorySession::new();
    assert_ok!(load(&mut a, &path_v0(), None, &seeded()).await);
    assert_ok!(load(&mut b, &path_v0(), None, &seeded()).await);
    assert_eq!(a.vertices(), b.vertices());

    let bound = 5.0 * 3f64.sqrt();
    for (p, q) in a.vertices().unwrap().iter().zip(b.vertices().unwrap()) {
        assert_relative_eq!(p[0], q[0]);
        assert_relative_eq!(p[1], q[1]);
        assert!(p[0] >= 0.0 && p[0] < bound);
        assert!(p[1] >= 0.0 && p[1] < bound);
    }
}

#[tokio::test]
async fn test_allocation_hint_is_capped() {
    let mut session = MemorySession::new();
    let mut rx = session.events().subscribe();
    let options = PipelineOptions {
        max_allocation: 2,
        ..seeded()
    };

    assert_ok!(load(&mut session, &path_v0(), None, &options).await);

    assert_eq!(
        drain(&mut rx)[0],
        LoadEvent::SizesForAllocation(AllocationHint { point: 2, edge: 2 })
    );
}

#[tokio::test]
async fn test_unknown_mapper_falls_back_with_warning() {
    let mut session = MemorySession::new();
    let meta = metadata(json!({"mapper": "bogus"}));

    let loaded = assert_ok!(load(&mut session, &path_v0(), Some(meta), &seeded()).await);

    assert_eq!(loaded.mapper, "default");
    assert!(loaded.warnings.contains(&BindingWarning::UnknownMapper {
        name: "bogus".to_string()
    }));
    assert!(session.column("point", "__pointSizes").is_some());
}

#[tokio::test]
async fn test_v1_loads_metadata_attributes_per_partition() {
    let mut session = MemorySession::new();
    let meta = metadata(triangle_metadata());

    let loaded = assert_ok!(load(&mut session, &triangle_v1(), Some(meta), &seeded()).await);

    assert_eq!(loaded.version, 1);
    assert_eq!(loaded.mapper, "opentsdb");
    assert_eq!(session.attribute_names("point"), vec!["degree", "label"]);
    assert_eq!(session.attribute_names("edge"), vec!["bytes"]);
    assert_eq!(session.aliases().get("pointSize").map(String::as_str), Some("degree"));
    assert!(!session.aliases().contains_key("nodeId"));

    // bytes -> green-to-red colours, doubled per endpoint
    let colors = session.evaluate(LOCAL_BUFFER, "edgeColors").unwrap();
    assert_eq!(colors.len(), 6);
}

#[tokio::test]
async fn test_v1_encoding_overrides_name_binding() {
    let columns = ColumnGroups {
        double: vec![
            vertex("pointSize", numbers(&[1.0, 2.0, 3.0])),
            vertex("rank", numbers(&[3.0, 2.0, 1.0])),
        ],
        ..Default::default()
    };
    let bytes = encode(1, 3, &[], columns);
    let meta = metadata(json!({
        "nodes": [{
            "count": 3,
            "attributes": {"pointSize": {}, "rank": {}},
            "encodings": {
                "pointSize": {"attributes": ["rank"]},
                "pointColor": {"attributes": ["rank", "pointSize"]},
                "glow": {"attributes": ["rank"]}
            }
        }],
        "edges": [{"count": 0, "attributes": {}}]
    }));
    let mut session = MemorySession::new();

    let loaded = assert_ok!(load(&mut session, &bytes, Some(meta), &seeded()).await);

    assert_eq!(
        session.column("point", "__pointSizes").unwrap().values,
        numbers(&[172.0, 88.0, 5.0])
    );
    assert!(loaded.warnings.contains(&BindingWarning::UnknownEncoding {
        property: "glow".to_string()
    }));
    assert!(loaded
        .warnings
        .iter()
        .any(|w| matches!(w, BindingWarning::UnsupportedEncoding { .. })));
    assert!(session.column("point", "__pointColors").is_none());
}

#[tokio::test]
async fn test_v1_date_inference_strips_aggregations() {
    let columns = ColumnGroups {
        double: vec![vertex("createdAt", numbers(&[1_455_000_000.0, 1_455_000_060.0]))],
        ..Default::default()
    };
    let bytes = encode(1, 2, &[(0, 1)], columns);
    let meta = metadata(json!({
        "nodes": [{
            "count": 2,
            "attributes": {"createdAt": {"aggregations": {"min": 1, "max": 2, "distinct": 2}}}
        }],
        "edges": [{"count": 1, "attributes": {}}]
    }));
    let mut session = MemorySession::new();

    assert_ok!(load(&mut session, &bytes, Some(meta), &seeded()).await);

    let created = session.attribute("point", "createdAt").unwrap();
    assert_eq!(created.inferred_type, SemanticType::Date);
    assert_eq!(
        created.values,
        numbers(&[1_455_000_000_000.0, 1_455_000_060_000.0])
    );
    let stored = session.metadata().unwrap();
    let aggregations = stored.nodes[0].attributes["createdAt"]
        .aggregations
        .as_ref()
        .unwrap();
    assert!(!aggregations.contains_key("min"));
    assert!(!aggregations.contains_key("max"));
    assert!(aggregations.contains_key("distinct"));
}

#[tokio::test]
async fn test_v1_rejects_multiple_node_partitions() {
    let mut meta = triangle_metadata();
    let partition = meta["nodes"][0].clone();
    meta["nodes"].as_array_mut().unwrap().push(partition);

    let mut session = MemorySession::new();
    let mut rx = session.events().subscribe();
    let err = assert_err!(
        load(&mut session, &triangle_v1(), Some(metadata(meta)), &seeded()).await
    );

    assert!(matches!(err, LoadError::UnsupportedTopology { nodes: 2, edges: 1 }));
    assert!(session.history().is_empty());
    assert!(session.vertices().is_none());
    assert!(drain(&mut rx).is_empty());
}

#[tokio::test]
async fn test_v1_rejects_attribute_key_mismatch() {
    let mut meta = triangle_metadata();
    meta["edges"][0]["attributes"] = json!({"packets": {}});

    let mut session = MemorySession::new();
    let err = assert_err!(
        load(&mut session, &triangle_v1(), Some(metadata(meta)), &seeded()).await
    );

    assert!(matches!(err, LoadError::MetadataMismatch(_)));
    assert!(session.history().is_empty());
}

#[tokio::test]
async fn test_v1_rejects_count_mismatch() {
    let mut meta = triangle_metadata();
    meta["nodes"][0]["count"] = json!(4);

    let mut session = MemorySession::new();
    let err = assert_err!(
        load(&mut session, &triangle_v1(), Some(metadata(meta)), &seeded()).await
    );

    assert!(matches!(err, LoadError::MetadataMismatch(_)));
    assert!(session.vertices().is_none());
}

#[tokio::test]
async fn test_v1_requires_metadata() {
    let mut session = MemorySession::new();
    let err = assert_err!(load(&mut session, &triangle_v1(), None, &seeded()).await);
    assert!(matches!(err, LoadError::MetadataMismatch(_)));
}

#[tokio::test]
async fn test_unsupported_version() {
    let bytes = encode(7, 1, &[], ColumnGroups::default());
    let mut session = MemorySession::new();

    let err = assert_err!(load(&mut session, &bytes, None, &seeded()).await);

    assert!(matches!(err, LoadError::Decode(DecodeError::UnsupportedVersion(7))));
    assert!(session.history().is_empty());
}

#[tokio::test]
async fn test_truncated_payload() {
    let mut bytes = path_v0();
    bytes.truncate(bytes.len() - 3);
    let mut session = MemorySession::new();

    let err = assert_err!(load(&mut session, &bytes, None, &seeded()).await);
    assert!(matches!(err, LoadError::Decode(_)));
}

#[tokio::test]
async fn test_session_failure_stops_the_chain() {
    let mut session = MemorySession::new().fail_at(FailPoint::SetEdges);

    let err = assert_err!(load(&mut session, &path_v0(), None, &seeded()).await);

    match err {
        LoadError::Stage { stage, source } => {
            assert_eq!(stage, Stage::EdgesBound);
            assert!(matches!(source, SessionError::Rejected(_)));
        }
        other => panic!("unexpected error: {}", other),
    }
    assert!(session.column("point", "__pointCommunity").is_none());
    assert!(session.column("point", "__pointSizes").is_none());
}

#[tokio::test]
async fn test_missing_template_fails_loader_stage() {
    let mut session = MemorySession::new();
    session.remove_template(LOCAL_BUFFER, "pointSizes");

    let err = assert_err!(load(&mut session, &path_v0(), None, &seeded()).await);

    assert!(matches!(
        err,
        LoadError::Stage {
            stage: Stage::LoadersRun,
            source: SessionError::MissingTemplate { .. }
        }
    ));
    // defaults were already stored before the loaders ran
    assert!(session.column("point", "__defaultPointSize").is_some());
}
