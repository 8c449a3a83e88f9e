#![allow(dead_code)]

use scriptgraph::{DeferredCall, KindBuilder, NativeHandle, ObjectRef, TypeDirectory};

/// Entity owning one engine-side handle, keyed by its entity id.
#[derive(Debug, Default)]
pub struct NativeEntity {
    pub id: u32,
    pub name: String,
    pub handle: NativeHandle,
}

impl NativeEntity {
    pub fn new(id: u32, handle: NativeHandle) -> Self {
        Self {
            id,
            name: format!("entity-{id}"),
            handle,
        }
    }
}

#[derive(Debug, Default)]
pub struct NativeActor {
    pub id: u32,
    pub health: f32,
    pub position: [f32; 3],
    pub target: Option<ObjectRef>,
    pub channel: NativeHandle,
}

impl NativeActor {
    pub fn new(id: u32) -> Self {
        Self {
            id,
            health: 100.0,
            ..Self::default()
        }
    }
}

/// Entity holding a deferred call back into itself.
#[derive(Debug, Default)]
pub struct TimedEntity {
    pub id: u32,
    pub fired: u32,
    pub pending: Option<ObjectRef>,
}

impl TimedEntity {
    pub fn spawn(directory: &TypeDirectory, id: u32, delay: f32) -> ObjectRef {
        let entity = ObjectRef::new(TimedEntity {
            id,
            ..Self::default()
        });
        let call = DeferredCall::bind(directory, Some(entity.clone()), "on_timer", delay)
            .expect("bind timer");
        entity.borrow_mut_as::<TimedEntity>().expect("entity").pending = Some(ObjectRef::new(call));
        entity
    }

    /// Breaks the entity → call → entity cycle so the test does not leak.
    pub fn despawn(entity: &ObjectRef) {
        if let Some(mut entity) = entity.borrow_mut_as::<TimedEntity>() {
            entity.pending = None;
        }
    }
}

pub fn directory() -> TypeDirectory {
    let mut directory = TypeDirectory::new();
    directory
        .register_kind(
            KindBuilder::<NativeEntity>::new("game::NativeEntity")
                .durable_id("id", |e| &e.id, |e| &mut e.id)
                .scalar("name", |e| &e.name, |e| &mut e.name)
                .native("handle", |e| &e.handle, |e| &mut e.handle),
        )
        .expect("register entity");
    directory
        .register_kind(
            KindBuilder::<NativeActor>::new("game::NativeActor")
                .durable_id("id", |a| &a.id, |a| &mut a.id)
                .scalar("health", |a| &a.health, |a| &mut a.health)
                .scalar("position", |a| &a.position, |a| &mut a.position)
                .object("target", |a| &a.target, |a| &mut a.target)
                .native("channel", |a| &a.channel, |a| &mut a.channel)
                .method_with_arg("damage", |a, amount: f32| a.health -= amount),
        )
        .expect("register actor");
    directory
        .register_kind(
            KindBuilder::<TimedEntity>::new("game::TimedEntity")
                .scalar("id", |e| &e.id, |e| &mut e.id)
                .scalar("fired", |e| &e.fired, |e| &mut e.fired)
                .object("pending", |e| &e.pending, |e| &mut e.pending)
                .method("on_timer", |e| e.fired += 1),
        )
        .expect("register timed entity");
    directory
}

pub fn entity_id(instance: &ObjectRef) -> u32 {
    instance.borrow_as::<NativeEntity>().expect("entity").id
}

pub fn actor_id(instance: &ObjectRef) -> u32 {
    instance.borrow_as::<NativeActor>().expect("actor").id
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}
