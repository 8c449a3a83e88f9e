use super::*;

#[derive(Default)]
struct Guard {
    post: u32,
}

#[derive(Default)]
struct Merchant {
    gold: u32,
}

fn directory() -> TypeDirectory {
    let mut directory = TypeDirectory::new();
    directory
        .register_kind(KindBuilder::<Guard>::new("game::Guard").scalar(
            "post",
            |g| &g.post,
            |g| &mut g.post,
        ))
        .expect("register guard");
    directory
        .register_kind(KindBuilder::<Merchant>::new("game::Merchant").scalar(
            "gold",
            |m| &m.gold,
            |m| &mut m.gold,
        ))
        .expect("register merchant");
    directory
}

#[test]
fn category_round_trips_through_its_discriminant() {
    for category in [
        ScriptCategory::Actor,
        ScriptCategory::Entity,
        ScriptCategory::FlowNode,
        ScriptCategory::GameRules,
        ScriptCategory::Other,
    ] {
        assert_eq!(
            ScriptCategory::from_discriminant(category.to_discriminant()),
            Some(category)
        );
    }
    assert_eq!(ScriptCategory::from_discriminant(99), None);
}

#[test]
fn add_groups_by_kind_and_category() {
    let directory = directory();
    let mut registry = ScriptRegistry::new();
    registry
        .add(&directory, ObjectRef::new(Guard { post: 1 }), ScriptCategory::Actor)
        .expect("add");
    registry
        .add(&directory, ObjectRef::new(Guard { post: 2 }), ScriptCategory::Actor)
        .expect("add");
    registry
        .add(&directory, ObjectRef::new(Guard { post: 3 }), ScriptCategory::Entity)
        .expect("add");
    registry
        .add(&directory, ObjectRef::new(Merchant { gold: 5 }), ScriptCategory::Actor)
        .expect("add");

    assert_eq!(registry.groups().len(), 3);
    assert_eq!(registry.instance_count(), 4);
    let guards = registry
        .find_kind(ScriptCategory::Actor, |group| group.type_tag().as_str() == "game::Guard")
        .expect("guard group");
    assert_eq!(guards.instances().len(), 2);
}

#[test]
fn add_rejects_unregistered_kinds() {
    let directory = directory();
    let mut registry = ScriptRegistry::new();
    let err = registry
        .add(&directory, ObjectRef::new(7u8), ScriptCategory::Other)
        .expect_err("unregistered");
    assert!(matches!(err, GraphError::UnknownType { .. }));
    assert!(registry.groups().is_empty());
}

#[test]
fn remove_leaves_a_hole() {
    let directory = directory();
    let mut registry = ScriptRegistry::new();
    let first = ObjectRef::new(Guard { post: 1 });
    let second = ObjectRef::new(Guard { post: 2 });
    registry.add(&directory, first.clone(), ScriptCategory::Actor).expect("add");
    registry.add(&directory, second, ScriptCategory::Actor).expect("add");

    assert!(registry.remove(&first));
    assert!(!registry.remove(&first));
    let group = &registry.groups()[0];
    assert!(group.instances()[0].is_none());
    assert!(group.instances()[1].is_some());
    assert_eq!(registry.instance_count(), 1);
}

#[test]
fn finders_filter_by_category_and_type() {
    let directory = directory();
    let mut registry = ScriptRegistry::new();
    registry
        .add(&directory, ObjectRef::new(Guard { post: 4 }), ScriptCategory::Actor)
        .expect("add");
    registry
        .add(&directory, ObjectRef::new(Merchant { gold: 9 }), ScriptCategory::Actor)
        .expect("add");

    let merchant = registry
        .find_instance_of::<Merchant>(ScriptCategory::Actor, |m| m.gold == 9)
        .expect("merchant");
    assert!(merchant.is::<Merchant>());
    assert!(registry
        .find_instance_of::<Merchant>(ScriptCategory::Entity, |_| true)
        .is_none());

    let guard = registry
        .find_typed::<Guard>(ScriptCategory::Actor, |instance| instance.is::<Guard>())
        .expect("typed lookup");
    assert!(guard.is_some());

    let err = registry
        .find_typed::<Guard>(ScriptCategory::Actor, |instance| instance.is::<Merchant>())
        .expect_err("mismatch");
    assert!(matches!(err, GraphError::TypeMismatch { .. }));
}

#[test]
fn replace_groups_returns_the_old_storage() {
    let directory = directory();
    let mut registry = ScriptRegistry::new();
    registry
        .add(&directory, ObjectRef::new(Guard::default()), ScriptCategory::Actor)
        .expect("add");

    let old = registry.replace_groups(vec![ScriptKind::new("game::Merchant", ScriptCategory::Other)]);
    assert_eq!(old.len(), 1);
    assert_eq!(registry.groups()[0].type_tag().as_str(), "game::Merchant");
    assert_eq!(registry.instance_count(), 0);
}

#[test]
fn summary_serializes_to_json() {
    let directory = directory();
    let mut registry = ScriptRegistry::new();
    let guard = ObjectRef::new(Guard::default());
    registry.add(&directory, guard.clone(), ScriptCategory::Actor).expect("add");
    registry
        .add(&directory, ObjectRef::new(Guard::default()), ScriptCategory::Actor)
        .expect("add");
    registry.remove(&guard);

    let summary = registry.summary();
    assert_eq!(summary.instance_count, 1);
    assert_eq!(summary.groups[0].slots, 2);
    assert_eq!(summary.groups[0].live, 1);

    let json = summary.to_json_value();
    assert_eq!(json["groups"][0]["type_tag"], "game::Guard");
    assert_eq!(json["groups"][0]["category"], "Actor");
    let parsed: RegistrySummary = serde_json::from_str(&summary.to_json()).expect("parse");
    assert_eq!(parsed, summary);
}

#[test]
fn decode_rejects_instances_in_the_wrong_group() {
    let directory = directory();
    let mut group = ScriptKind::new("game::Guard", ScriptCategory::Actor);
    group.push(Some(ObjectRef::new(Merchant::default())));
    let err = decode_groups(&directory, vec![Some(ObjectRef::new(group))]).expect_err("mismatch");
    assert!(matches!(err, GraphError::CorruptStream(_)));
}

#[test]
fn decode_rejects_null_groups() {
    let directory = directory();
    assert!(matches!(
        decode_groups(&directory, vec![None]),
        Err(GraphError::CorruptStream(_))
    ));
}

#[test]
fn snapshot_rejects_instances_in_the_wrong_group() {
    let directory = directory();
    let mut group = ScriptKind::new("game::Guard", ScriptCategory::Actor);
    group.push(Some(ObjectRef::new(Guard::default())));
    group.push(Some(ObjectRef::new(Merchant::default())));
    let mut registry = ScriptRegistry::new();
    registry.replace_groups(vec![group]);

    let err = registry
        .snapshot(&GraphWalker::new(&directory))
        .expect_err("merchant under guard");
    assert!(matches!(
        err,
        GraphError::InvalidRegistry(reason) if reason.contains("game::Merchant")
    ));
}

#[test]
fn snapshot_rejects_duplicate_groups() {
    let directory = directory();
    let mut registry = ScriptRegistry::new();
    registry.replace_groups(vec![
        ScriptKind::new("game::Guard", ScriptCategory::Actor),
        ScriptKind::new("game::Guard", ScriptCategory::Actor),
    ]);
    let walker = GraphWalker::new(&directory);
    assert!(matches!(
        registry.snapshot(&walker),
        Err(GraphError::InvalidRegistry(_))
    ));

    // Same tag under another category is a separate group.
    registry.replace_groups(vec![
        ScriptKind::new("game::Guard", ScriptCategory::Actor),
        ScriptKind::new("game::Guard", ScriptCategory::Entity),
    ]);
    assert!(registry.snapshot(&walker).is_ok());
}

#[test]
fn snapshot_rejects_unregistered_group_tags() {
    let directory = directory();
    let mut registry = ScriptRegistry::new();
    registry.replace_groups(vec![ScriptKind::new("game::Ghost", ScriptCategory::Other)]);
    assert_eq!(
        registry
            .snapshot(&GraphWalker::new(&directory))
            .expect_err("unknown tag"),
        GraphError::UnknownType {
            tag: "game::Ghost".into()
        }
    );
}
