//! Snapshot framing, sealing and pass limits as seen by a caller.

use scriptgraph::{
    seal, snapshot_id_hex, unseal, GraphError, GraphWalker, NativeHandle, ObjectRef,
    ScriptCategory, ScriptRegistry, SerializerConfig, GRAPH_BINARY_MAGIC, GRAPH_FORMAT_VERSION,
};

mod common;
use common::{directory, NativeActor, NativeEntity};

fn snapshot() -> Vec<u8> {
    let directory = directory();
    let mut registry = ScriptRegistry::new();
    registry
        .add(
            &directory,
            ObjectRef::new(NativeEntity::new(11, NativeHandle::from_raw(0xAA))),
            ScriptCategory::Entity,
        )
        .expect("add");
    let walker = GraphWalker::new(&directory);
    registry.snapshot(&walker).expect("snapshot")
}

#[test]
fn snapshot_starts_with_magic_and_version() {
    let bytes = snapshot();
    assert_eq!(&bytes[0..4], &GRAPH_BINARY_MAGIC);
    assert_eq!(u16::from_le_bytes([bytes[4], bytes[5]]), GRAPH_FORMAT_VERSION);
}

#[test]
fn snapshots_are_deterministic() {
    assert_eq!(snapshot_id_hex(&snapshot()), snapshot_id_hex(&snapshot()));
}

#[test]
fn native_handle_values_never_reach_the_stream() {
    let directory = directory();
    let walker = GraphWalker::new(&directory);
    let bound = walker
        .serialize(&ObjectRef::new(NativeEntity::new(1, NativeHandle::from_raw(0xDEAD_BEEF))))
        .expect("serialize");
    let unbound = walker
        .serialize(&ObjectRef::new(NativeEntity::new(1, NativeHandle::UNBOUND)))
        .expect("serialize");
    assert_eq!(bound, unbound);
}

#[test]
fn corrupted_payload_is_rejected() {
    let directory = directory();
    let mut bytes = snapshot();
    let middle = bytes.len() / 2 + 7;
    bytes[middle] ^= 0x01;
    let mut registry = ScriptRegistry::new();
    let err = registry
        .restore(&GraphWalker::new(&directory), &bytes)
        .expect_err("checksum");
    assert!(matches!(err, GraphError::CorruptStream(_)));
}

#[test]
fn future_version_is_incompatible() {
    let directory = directory();
    let mut bytes = snapshot();
    bytes[4..6].copy_from_slice(&(GRAPH_FORMAT_VERSION + 1).to_le_bytes());
    let err = GraphWalker::new(&directory)
        .deserialize_list(&bytes)
        .expect_err("version");
    assert!(matches!(err, GraphError::IncompatibleVersion { .. }));
}

#[test]
fn sealed_snapshot_restores_and_detects_tampering() {
    let directory = directory();
    let key = b"hot-reload-session";
    let sealed = seal(&snapshot(), key).expect("seal");

    let mut registry = ScriptRegistry::new();
    let inner = unseal(&sealed, key).expect("unseal");
    registry
        .restore(&GraphWalker::new(&directory), inner)
        .expect("restore");
    assert_eq!(registry.instance_count(), 1);

    let mut tampered = sealed.clone();
    let last = tampered.len() - 1;
    tampered[last] ^= 0x10;
    assert_eq!(
        unseal(&tampered, key).expect_err("tampered"),
        GraphError::AuthenticationFailed
    );
}

#[test]
fn object_limit_from_toml_is_enforced() {
    let directory = directory();
    let config = SerializerConfig::from_toml_str("max_objects = 2\n").expect("config");
    let walker = GraphWalker::new(&directory).with_config(config);

    let mut registry = ScriptRegistry::new();
    for id in 0..3 {
        registry
            .add(&directory, ObjectRef::new(NativeActor::new(id)), ScriptCategory::Actor)
            .expect("add");
    }
    // The group record itself counts as one object.
    assert!(matches!(
        registry.snapshot(&walker),
        Err(GraphError::ResourceLimit(_))
    ));
}

#[test]
fn list_limit_applies_on_restore() {
    let directory = directory();
    let bytes = snapshot();
    let config = SerializerConfig {
        max_list_len: 0,
        ..SerializerConfig::default()
    };
    let err = GraphWalker::new(&directory)
        .with_config(config)
        .deserialize_list(&bytes)
        .expect_err("list limit");
    assert!(matches!(err, GraphError::ResourceLimit(_)));
}
