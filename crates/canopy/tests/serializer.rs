//! Integration tests for the binary serializer and its two transports.

use canopy::{
    concatenate, Error, Metadata, Model, ModelBuilder, Operator, PostProcessorFunc, TaskType,
    TreeAnnotation, TypeInfo,
};

/// A model exercising every serialized field: numerical and categorical
/// splits, node statistics, custom post-processor parameters and free-form
/// attributes.
fn rich_model(threshold_type: TypeInfo) -> Model {
    let metadata = Metadata::new(3, TaskType::BinaryClf, false, 1, vec![1], [1, 1]).unwrap();
    let annotation = TreeAnnotation::new(2, vec![0, 0], vec![0, 0]).unwrap();
    let mut builder = ModelBuilder::new(
        threshold_type,
        threshold_type,
        &metadata,
        &annotation,
        &PostProcessorFunc::with_config("sigmoid", r#"{"sigmoid_alpha": 1.5}"#),
        vec![0.25],
        Some(r#"{"trained_by": "unit-test"}"#.to_string()),
    )
    .unwrap();

    // Tree 0: numerical root with stats.
    builder.start_tree().unwrap();
    builder.start_node(0).unwrap();
    builder.numerical_test(1, 0.75, true, Operator::Le, 1, 2).unwrap();
    builder.gain(12.5).unwrap();
    builder.data_count(100).unwrap();
    builder.sum_hess(40.0).unwrap();
    builder.end_node().unwrap();
    builder.start_node(1).unwrap();
    builder.leaf_scalar(-0.5).unwrap();
    builder.data_count(60).unwrap();
    builder.end_node().unwrap();
    builder.start_node(2).unwrap();
    builder.leaf_scalar(0.5).unwrap();
    builder.data_count(40).unwrap();
    builder.end_node().unwrap();
    builder.end_tree().unwrap();

    // Tree 1: categorical root, list handed over unsorted.
    builder.start_tree().unwrap();
    builder.start_node(0).unwrap();
    builder.categorical_test(2, false, &[7, 2, 5], true, 1, 2).unwrap();
    builder.end_node().unwrap();
    builder.start_node(1).unwrap();
    builder.leaf_scalar(-1.0).unwrap();
    builder.end_node().unwrap();
    builder.start_node(2).unwrap();
    builder.leaf_scalar(1.0).unwrap();
    builder.end_node().unwrap();
    builder.end_tree().unwrap();

    builder.commit_model().unwrap()
}

// =============================================================================
// Round-trip identity
// =============================================================================

#[test]
fn framed_round_trip_preserves_dump() {
    for threshold_type in [TypeInfo::Float32, TypeInfo::Float64] {
        let model = rich_model(threshold_type);
        let frames = model.to_frames().unwrap();
        let restored = Model::from_frames(&frames).unwrap();
        assert_eq!(model.dump_as_json(false), restored.dump_as_json(false));
        assert_eq!(restored.threshold_type(), threshold_type);
        assert_eq!(restored.sigmoid_alpha, 1.5);
        assert_eq!(restored.attributes, r#"{"trained_by": "unit-test"}"#);
    }
}

#[test]
fn stream_round_trip_preserves_dump() {
    for threshold_type in [TypeInfo::Float32, TypeInfo::Float64] {
        let model = rich_model(threshold_type);
        let mut buffer = Vec::new();
        model.serialize_to_stream(&mut buffer).unwrap();
        let restored = Model::deserialize_from_stream(&mut buffer.as_slice()).unwrap();
        assert_eq!(model.dump_as_json(true), restored.dump_as_json(true));
    }
}

#[test]
fn file_round_trip_survives_utf8_paths() {
    let model = rich_model(TypeInfo::Float32);
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("モデル-čañópy-🌲.bin");
    model.serialize_to_file(&path).unwrap();
    let restored = Model::deserialize_from_file(&path).unwrap();
    assert_eq!(model.dump_as_json(false), restored.dump_as_json(false));
}

#[test]
fn round_trip_preserves_version() {
    let model = rich_model(TypeInfo::Float32);
    let frames = model.to_frames().unwrap();
    let restored = Model::from_frames(&frames).unwrap();
    assert_eq!(restored.version(), model.version());
}

// =============================================================================
// Version gates
// =============================================================================

/// The stream starts with the version triple as three little-endian i32s.
fn patch_version(buffer: &mut [u8], major: i32, minor: i32, patch: i32) {
    buffer[0..4].copy_from_slice(&major.to_le_bytes());
    buffer[4..8].copy_from_slice(&minor.to_le_bytes());
    buffer[8..12].copy_from_slice(&patch.to_le_bytes());
}

#[test]
fn newer_minor_version_loads() {
    let model = rich_model(TypeInfo::Float32);
    let mut buffer = Vec::new();
    model.serialize_to_stream(&mut buffer).unwrap();
    let version = model.version();
    patch_version(&mut buffer, version.major, version.minor + 7, 0);

    let restored = Model::deserialize_from_stream(&mut buffer.as_slice()).unwrap();
    assert_eq!(restored.version().minor, version.minor + 7);
    assert_eq!(model.dump_as_json(false), restored.dump_as_json(false));
}

#[test]
fn legacy_bridge_version_loads() {
    let model = rich_model(TypeInfo::Float32);
    let mut buffer = Vec::new();
    model.serialize_to_stream(&mut buffer).unwrap();
    patch_version(&mut buffer, 3, 9, 0);

    let restored = Model::deserialize_from_stream(&mut buffer.as_slice()).unwrap();
    assert_eq!(restored.version().major, 3);
}

#[test]
fn foreign_major_version_rejected() {
    let model = rich_model(TypeInfo::Float32);
    let version = model.version();

    for (major, minor) in [(version.major + 1, 0), (3, 8), (2, 4)] {
        let mut buffer = Vec::new();
        model.serialize_to_stream(&mut buffer).unwrap();
        patch_version(&mut buffer, major, minor, 0);
        let result = Model::deserialize_from_stream(&mut buffer.as_slice());
        assert!(
            matches!(result, Err(Error::Serialization(_))),
            "version {major}.{minor} must be rejected"
        );
    }
}

#[test]
fn truncated_stream_rejected() {
    let model = rich_model(TypeInfo::Float32);
    let mut buffer = Vec::new();
    model.serialize_to_stream(&mut buffer).unwrap();

    for keep in [0, 10, buffer.len() / 2, buffer.len() - 1] {
        let result = Model::deserialize_from_stream(&mut &buffer[..keep]);
        assert!(
            matches!(result, Err(Error::Serialization(_))),
            "stream truncated to {keep} bytes must be rejected"
        );
    }
}

#[test]
fn truncated_frame_sequence_rejected() {
    let model = rich_model(TypeInfo::Float32);
    let frames = model.to_frames().unwrap();
    let result = Model::from_frames(&frames[..frames.len() - 3]);
    assert!(matches!(result, Err(Error::Serialization(_))));
}

// =============================================================================
// Dump invariants
// =============================================================================

#[test]
fn categorical_list_sorted_in_dump() {
    let model = rich_model(TypeInfo::Float32);
    let dump: serde_json::Value = serde_json::from_str(&model.dump_as_json(false)).unwrap();
    let root = &dump["trees"][1]["nodes"][0];
    assert_eq!(root["node_type"], "categorical_test_node");
    assert_eq!(root["category_list"], serde_json::json!([2, 5, 7]));
    assert_eq!(root["category_list_right_child"], true);
    assert_eq!(dump["trees"][1]["has_categorical_split"], true);
    assert_eq!(dump["trees"][0]["has_categorical_split"], false);
}

#[test]
fn stats_survive_round_trip() {
    let model = rich_model(TypeInfo::Float64);
    let frames = model.to_frames().unwrap();
    let restored = Model::from_frames(&frames).unwrap();
    let dump: serde_json::Value =
        serde_json::from_str(&restored.dump_as_json(false)).unwrap();
    let root = &dump["trees"][0]["nodes"][0];
    assert_eq!(root["gain"], 12.5);
    assert_eq!(root["data_count"], 100);
    assert_eq!(root["sum_hess"], 40.0);
}

// =============================================================================
// Concatenation
// =============================================================================

#[test]
fn concatenation_of_partition_preserves_dump() {
    // Build the same six-stump ensemble once whole and once as 3 + 2 + 1.
    fn stump_batch(counts: std::ops::Range<usize>) -> Model {
        let leaves: [(f64, f64); 6] =
            [(-1.0, 1.0), (1.0, -1.0), (0.5, 0.5), (-1.0, 0.0), (0.0, -1.0), (0.5, 1.5)];
        let n = counts.len() as u32;
        let metadata =
            Metadata::new(1, TaskType::MultiClf, false, 1, vec![3], [1, 1]).unwrap();
        let annotation = TreeAnnotation::new(
            n,
            vec![0; n as usize],
            counts.clone().map(|i| (i % 3) as i32).collect(),
        )
        .unwrap();
        let mut builder = ModelBuilder::new(
            TypeInfo::Float32,
            TypeInfo::Float32,
            &metadata,
            &annotation,
            &PostProcessorFunc::new("softmax"),
            vec![0.3, 0.2, 0.5],
            None,
        )
        .unwrap();
        for i in counts {
            let (left, right) = leaves[i];
            builder.start_tree().unwrap();
            builder.start_node(0).unwrap();
            builder.numerical_test(0, 0.0, false, Operator::Lt, 1, 2).unwrap();
            builder.end_node().unwrap();
            builder.start_node(1).unwrap();
            builder.leaf_scalar(left).unwrap();
            builder.end_node().unwrap();
            builder.start_node(2).unwrap();
            builder.leaf_scalar(right).unwrap();
            builder.end_node().unwrap();
            builder.end_tree().unwrap();
        }
        builder.commit_model().unwrap()
    }

    let whole = stump_batch(0..6);
    let (a, b, c) = (stump_batch(0..3), stump_batch(3..5), stump_batch(5..6));
    let joined = concatenate(&[&a, &b, &c]).unwrap();
    assert_eq!(whole.dump_as_json(false), joined.dump_as_json(false));
}

#[test]
fn concatenated_model_round_trips() {
    let a = rich_model(TypeInfo::Float32);
    let b = rich_model(TypeInfo::Float32);
    let joined = concatenate(&[&a, &b]).unwrap();
    assert_eq!(joined.num_tree(), 4);

    let frames = joined.to_frames().unwrap();
    let restored = Model::from_frames(&frames).unwrap();
    assert_eq!(joined.dump_as_json(false), restored.dump_as_json(false));
}
