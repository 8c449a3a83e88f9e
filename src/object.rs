//! Live script objects and the handles that point at them.

use std::any::{Any, TypeId};
use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::value::{Scalar, ScalarType, Value};

/// Anything that can sit behind an [`ObjectRef`].
///
/// Implemented for every `'static` type; the walker learns the shape of a
/// concrete kind from its descriptor, not from this trait.
pub trait ScriptObject: Any {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> ScriptObject for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

struct ObjectCell<T: ?Sized> {
    type_id: TypeId,
    type_name: &'static str,
    value: RefCell<T>,
}

/// Shared, identity-carrying reference to a live script object.
///
/// Two `ObjectRef`s are the same object when [`ObjectRef::ptr_eq`] holds;
/// value equality is never used by the walker.
#[derive(Clone)]
pub struct ObjectRef(Rc<ObjectCell<dyn ScriptObject>>);

impl ObjectRef {
    pub fn new<T: ScriptObject>(value: T) -> Self {
        let cell: Rc<ObjectCell<dyn ScriptObject>> = Rc::new(ObjectCell {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            value: RefCell::new(value),
        });
        Self(cell)
    }

    pub fn ptr_eq(&self, other: &ObjectRef) -> bool {
        self.identity() == other.identity()
    }

    /// Address of the shared allocation, stable while any clone is alive.
    pub fn identity(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }

    /// `TypeId` of the concrete object. Needs no borrow.
    pub fn concrete_type_id(&self) -> TypeId {
        self.0.type_id
    }

    pub fn concrete_type_name(&self) -> &'static str {
        self.0.type_name
    }

    pub fn is<T: 'static>(&self) -> bool {
        self.concrete_type_id() == TypeId::of::<T>()
    }

    pub fn try_borrow(&self) -> Option<Ref<'_, dyn ScriptObject + 'static>> {
        self.0.value.try_borrow().ok()
    }

    pub fn try_borrow_mut(&self) -> Option<RefMut<'_, dyn ScriptObject + 'static>> {
        self.0.value.try_borrow_mut().ok()
    }

    /// Borrows the object as `T`. `None` if it is another kind or is
    /// currently mutably borrowed.
    pub fn borrow_as<T: 'static>(&self) -> Option<Ref<'_, T>> {
        let guard = self.try_borrow()?;
        Ref::filter_map(guard, |object| object.as_any().downcast_ref::<T>()).ok()
    }

    pub fn borrow_mut_as<T: 'static>(&self) -> Option<RefMut<'_, T>> {
        let guard = self.try_borrow_mut()?;
        RefMut::filter_map(guard, |object| object.as_any_mut().downcast_mut::<T>()).ok()
    }

    /// Number of strong handles to the object.
    pub fn strong_count(&self) -> usize {
        Rc::strong_count(&self.0)
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectRef({}@{:#x})", self.concrete_type_name(), self.identity())
    }
}

/// Process-local resource handle. Never written to a snapshot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct NativeHandle(usize);

impl NativeHandle {
    /// Sentinel every native field holds right after a restore.
    pub const UNBOUND: NativeHandle = NativeHandle(0);

    pub const fn from_raw(raw: usize) -> Self {
        Self(raw)
    }

    pub fn from_ptr<T>(ptr: *const T) -> Self {
        Self(ptr as usize)
    }

    pub const fn raw(self) -> usize {
        self.0
    }

    pub const fn is_bound(self) -> bool {
        self.0 != 0
    }
}

/// Stable identifier the native collaborator uses to re-acquire handles.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct DurableId(pub u64);

impl fmt::Display for DurableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl From<DurableId> for u64 {
    fn from(id: DurableId) -> Self {
        id.0
    }
}

impl Scalar for DurableId {
    const TYPE: ScalarType = ScalarType::U64;

    fn to_value(&self) -> Value {
        Value::U64(self.0)
    }

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::U64(raw) => Some(Self(raw)),
            _ => None,
        }
    }
}
