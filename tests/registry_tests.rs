//! Snapshot and restore of a whole script registry.

use scriptgraph::{
    rebind_registry, GraphError, GraphWalker, NativeHandle, ObjectRef, RebindError,
    RebindRequest, ScriptCategory, ScriptKind, ScriptRegistry, TypeDirectory,
};

mod common;
use common::{actor_id, directory, entity_id, init_tracing, NativeActor, NativeEntity};

fn populated(directory: &TypeDirectory) -> ScriptRegistry {
    let mut registry = ScriptRegistry::new();
    registry
        .add(
            directory,
            ObjectRef::new(NativeEntity::new(1, NativeHandle::from_raw(0x10))),
            ScriptCategory::Entity,
        )
        .expect("add entity 1");
    registry
        .add(
            directory,
            ObjectRef::new(NativeEntity::new(2, NativeHandle::from_raw(0x20))),
            ScriptCategory::Entity,
        )
        .expect("add entity 2");
    registry
        .add(directory, ObjectRef::new(NativeActor::new(3)), ScriptCategory::Actor)
        .expect("add actor");
    registry
}

#[test]
fn native_scripts_round_trip_grouped_by_kind() {
    init_tracing();
    let directory = directory();
    let walker = GraphWalker::new(&directory);
    let registry = populated(&directory);

    let bytes = registry.snapshot(&walker).expect("snapshot");
    let mut restored = ScriptRegistry::new();
    restored.restore(&walker, &bytes).expect("restore");

    assert_eq!(restored.groups().len(), 2);
    let entities = restored
        .find_kind(ScriptCategory::Entity, |group| {
            group.type_tag().as_str() == "game::NativeEntity"
        })
        .expect("entity group");
    let ids: Vec<u32> = entities.live().map(entity_id).collect();
    assert_eq!(ids, [1, 2]);

    let actor = restored
        .find_instance_of::<NativeActor>(ScriptCategory::Actor, |actor| actor.id == 3)
        .expect("actor 3");
    assert_eq!(actor_id(&actor), 3);
    assert_eq!(actor.borrow_as::<NativeActor>().expect("actor").health, 100.0);
}

#[test]
fn grouped_lists_keep_order_and_holes() {
    let directory = directory();
    let walker = GraphWalker::new(&directory);

    let mut actors = ScriptKind::new("game::NativeActor", ScriptCategory::Actor);
    actors.push(Some(ObjectRef::new(NativeActor::new(759))));
    actors.push(Some(ObjectRef::new(NativeActor::new(5))));
    let mut entities = ScriptKind::new("game::NativeEntity", ScriptCategory::Entity);
    entities.push(Some(ObjectRef::new(NativeEntity::new(987, NativeHandle::UNBOUND))));
    entities.push(Some(ObjectRef::new(NativeEntity::new(8, NativeHandle::UNBOUND))));
    entities.push(None);

    let mut registry = ScriptRegistry::new();
    registry.replace_groups(vec![actors, entities]);
    let bytes = registry.snapshot(&walker).expect("snapshot");
    let mut restored = ScriptRegistry::new();
    restored.restore(&walker, &bytes).expect("restore");

    let groups = restored.groups();
    assert_eq!(groups.len(), 2);
    let actor_ids: Vec<u32> = groups[0].live().map(actor_id).collect();
    assert_eq!(actor_ids, [759, 5]);

    let slots = groups[1].instances();
    assert_eq!(slots.len(), 3);
    assert_eq!(entity_id(slots[0].as_ref().expect("987")), 987);
    assert_eq!(entity_id(slots[1].as_ref().expect("8")), 8);
    assert!(slots[2].is_none());
}

#[test]
fn removed_instances_survive_as_holes() {
    let directory = directory();
    let walker = GraphWalker::new(&directory);
    let mut registry = populated(&directory);
    let first = registry
        .find(ScriptCategory::Entity, |instance| entity_id(instance) == 1)
        .expect("entity 1");
    assert!(registry.remove(&first));

    let bytes = registry.snapshot(&walker).expect("snapshot");
    registry.restore(&walker, &bytes).expect("restore");

    let entities = registry
        .find_kind(ScriptCategory::Entity, |_| true)
        .expect("entity group");
    assert!(entities.instances()[0].is_none());
    assert_eq!(entity_id(entities.instances()[1].as_ref().expect("entity 2")), 2);
}

#[test]
fn cross_references_between_instances_stay_shared() {
    let directory = directory();
    let walker = GraphWalker::new(&directory);
    let mut registry = ScriptRegistry::new();
    let prey = ObjectRef::new(NativeActor::new(1));
    let hunter = ObjectRef::new(NativeActor::new(2));
    hunter.borrow_mut_as::<NativeActor>().expect("hunter").target = Some(prey.clone());
    prey.borrow_mut_as::<NativeActor>().expect("prey").target = Some(hunter.clone());
    registry.add(&directory, prey.clone(), ScriptCategory::Actor).expect("add");
    registry.add(&directory, hunter.clone(), ScriptCategory::Actor).expect("add");

    let bytes = registry.snapshot(&walker).expect("snapshot");
    let mut restored = ScriptRegistry::new();
    restored.restore(&walker, &bytes).expect("restore");

    let group = &restored.groups()[0];
    let slots: Vec<ObjectRef> = group.live().cloned().collect();
    let target_of = |actor: &ObjectRef| {
        actor
            .borrow_as::<NativeActor>()
            .expect("actor")
            .target
            .clone()
            .expect("target")
    };
    assert!(target_of(&slots[1]).ptr_eq(&slots[0]));
    assert!(target_of(&slots[0]).ptr_eq(&slots[1]));

    for actor in slots.iter().chain([&prey, &hunter]) {
        actor.borrow_mut_as::<NativeActor>().expect("actor").target = None;
    }
}

#[test]
fn native_handles_reset_and_rebind_from_durable_ids() {
    init_tracing();
    let directory = directory();
    let walker = GraphWalker::new(&directory);
    let registry = populated(&directory);

    let bytes = registry.snapshot(&walker).expect("snapshot");
    let mut restored = ScriptRegistry::new();
    restored.restore(&walker, &bytes).expect("restore");

    let entity = restored
        .find(ScriptCategory::Entity, |instance| entity_id(instance) == 2)
        .expect("entity 2");
    assert_eq!(
        entity.borrow_as::<NativeEntity>().expect("entity").handle,
        NativeHandle::UNBOUND
    );

    let mut binder = |request: &RebindRequest| -> Result<NativeHandle, RebindError> {
        Ok(NativeHandle::from_raw(0x1000 + request.durable_id.0 as usize))
    };
    let report = rebind_registry(&restored, &walker, &mut binder).expect("rebind");
    assert_eq!(report.rebound, 3);
    assert!(report.is_complete());
    assert_eq!(
        entity.borrow_as::<NativeEntity>().expect("entity").handle,
        NativeHandle::from_raw(0x1002)
    );
}

#[test]
fn unknown_kind_leaves_the_live_registry_untouched() {
    let directory = directory();
    let mut registry = populated(&directory);
    let bytes = registry
        .snapshot(&GraphWalker::new(&directory))
        .expect("snapshot");

    let mut replacement = ScriptRegistry::new();
    replacement
        .add(&directory, ObjectRef::new(NativeActor::new(42)), ScriptCategory::Actor)
        .expect("add");
    let before = replacement.summary();

    // A directory that never learned about entities.
    let mut partial = TypeDirectory::new();
    partial
        .register_kind(
            scriptgraph::KindBuilder::<NativeActor>::new("game::NativeActor")
                .durable_id("id", |a| &a.id, |a| &mut a.id)
                .scalar("health", |a| &a.health, |a| &mut a.health)
                .scalar("position", |a| &a.position, |a| &mut a.position)
                .object("target", |a| &a.target, |a| &mut a.target)
                .native("channel", |a| &a.channel, |a| &mut a.channel),
        )
        .expect("register actor");
    let err = replacement
        .restore(&GraphWalker::new(&partial), &bytes)
        .expect_err("entities are unknown");
    assert_eq!(
        err,
        GraphError::UnknownType {
            tag: "game::NativeEntity".into()
        }
    );
    assert_eq!(replacement.summary(), before);
    assert!(replacement
        .find_instance_of::<NativeActor>(ScriptCategory::Actor, |actor| actor.id == 42)
        .is_some());

    let corrupted = {
        let mut bytes = bytes.clone();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x5A;
        bytes
    };
    assert!(registry
        .restore(&GraphWalker::new(&directory), &corrupted)
        .is_err());
    assert_eq!(registry.instance_count(), 3);
}

#[test]
fn summary_reports_the_grouping() {
    let directory = directory();
    let registry = populated(&directory);
    let summary = registry.summary();
    assert_eq!(summary.instance_count, 3);
    let json = summary.to_json();
    assert!(json.contains("game::NativeEntity"));
    assert!(json.contains("\"Actor\""));
}

#[test]
fn long_target_chains_snapshot_with_default_limits() {
    let directory = directory();
    let walker = GraphWalker::new(&directory);
    let mut registry = ScriptRegistry::new();
    let mut previous: Option<ObjectRef> = None;
    for id in 0..600 {
        let actor = ObjectRef::new(NativeActor::new(id));
        actor.borrow_mut_as::<NativeActor>().expect("actor").target = previous.take();
        registry
            .add(&directory, actor.clone(), ScriptCategory::Actor)
            .expect("add");
        previous = Some(actor);
    }

    let bytes = registry.snapshot(&walker).expect("snapshot");
    let mut restored = ScriptRegistry::new();
    restored.restore(&walker, &bytes).expect("restore");
    assert_eq!(restored.instance_count(), 600);

    let last = restored
        .find_instance_of::<NativeActor>(ScriptCategory::Actor, |actor| actor.id == 599)
        .expect("actor 599");
    let target = last
        .borrow_as::<NativeActor>()
        .expect("actor")
        .target
        .clone()
        .expect("target");
    assert_eq!(actor_id(&target), 598);
}

#[test]
fn misgrouped_registry_fails_at_snapshot_not_restore() {
    let directory = directory();
    let walker = GraphWalker::new(&directory);
    let mut wrong = ScriptKind::new("game::NativeEntity", ScriptCategory::Entity);
    wrong.push(Some(ObjectRef::new(NativeActor::new(1))));
    let mut registry = ScriptRegistry::new();
    registry.replace_groups(vec![wrong]);

    let err = registry.snapshot(&walker).expect_err("actor under entity group");
    assert!(matches!(
        err,
        GraphError::InvalidRegistry(reason) if reason.contains("game::NativeActor")
    ));
}
