//! Per-kind descriptor tables: field accessors, methods and restore hooks.
//!
//! A concrete script kind describes itself once at startup through
//! [`KindBuilder`]. The walker and the deferred-call resolver only ever see
//! the type-erased [`KindDescriptor`].
//!
//! # Contracts
//! - **Invariant**: field order is the declaration order and is the order
//!   fields appear on the wire.
//! - **Invariant**: a kind with native fields always names a durable id field.

use std::any::{Any, TypeId};
use std::collections::HashSet;
use std::fmt;

use crate::directory::{TypeDirectory, TypeTag};
use crate::error::{GraphError, GraphResult};
use crate::object::{DurableId, NativeHandle, ObjectRef};
use crate::value::{Scalar, ScalarType, Value};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldKind {
    Scalar(ScalarType),
    /// Process-local handle, never written to the stream.
    Native,
    /// Nullable reference to another object.
    Object,
    /// Ordered sequence of nullable references.
    ObjectList,
}

/// A field's value as seen by the walker.
#[derive(Clone, Debug)]
pub enum FieldValue {
    Scalar(Value),
    Object(Option<ObjectRef>),
    List(Vec<Option<ObjectRef>>),
    Handle(NativeHandle),
}

impl FieldValue {
    fn shape(&self) -> &'static str {
        match self {
            Self::Scalar(_) => "scalar",
            Self::Object(_) => "object",
            Self::List(_) => "list",
            Self::Handle(_) => "native handle",
        }
    }
}

/// Why an accessor refused to read or write.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum AccessError {
    /// The receiver is not the kind this descriptor was built for.
    Receiver,
    /// The value does not fit the field.
    Shape(String),
}

impl AccessError {
    /// `member` names the field or method; `found` the receiver's concrete type.
    pub(crate) fn into_graph_error(
        self,
        kind: &KindDescriptor,
        member: &str,
        found: &str,
    ) -> GraphError {
        match self {
            Self::Receiver => GraphError::TypeMismatch {
                expected: kind.type_name().to_string(),
                found: found.to_string(),
            },
            Self::Shape(detail) => GraphError::UnsupportedValue {
                kind: kind.tag().to_string(),
                field: member.to_string(),
                detail,
            },
        }
    }
}

type ReadFn = Box<dyn Fn(&dyn Any) -> Result<FieldValue, AccessError>>;
type WriteFn = Box<dyn Fn(&mut dyn Any, FieldValue) -> Result<(), AccessError>>;
type ResetFn = Box<dyn Fn(&mut dyn Any) -> Result<(), AccessError>>;
type CallFn = Box<dyn Fn(&mut dyn Any, Option<Value>) -> Result<(), AccessError>>;
type DurableFn = Box<dyn Fn(&dyn Any) -> Result<DurableId, AccessError>>;
type HookFn = Box<dyn Fn(&ObjectRef, &TypeDirectory) -> GraphResult<()>>;
type FactoryFn = Box<dyn Fn() -> ObjectRef>;

pub struct FieldDescriptor {
    name: &'static str,
    kind: FieldKind,
    read: ReadFn,
    write: WriteFn,
    reset: ResetFn,
}

impl FieldDescriptor {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn kind(&self) -> FieldKind {
        self.kind
    }

    pub(crate) fn read(&self, object: &dyn Any) -> Result<FieldValue, AccessError> {
        (self.read)(object)
    }

    pub(crate) fn write(&self, object: &mut dyn Any, value: FieldValue) -> Result<(), AccessError> {
        (self.write)(object, value)
    }

    /// Puts the field back to its unbound sentinel.
    pub(crate) fn reset(&self, object: &mut dyn Any) -> Result<(), AccessError> {
        (self.reset)(object)
    }
}

impl fmt::Debug for FieldDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldDescriptor")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .finish()
    }
}

/// Calling convention of a script method: no argument or one value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MethodArity {
    Zero,
    One(ScalarType),
}

pub struct MethodDescriptor {
    name: &'static str,
    arity: MethodArity,
    call: CallFn,
}

impl MethodDescriptor {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn arity(&self) -> MethodArity {
        self.arity
    }

    pub(crate) fn call(&self, object: &mut dyn Any, arg: Option<Value>) -> Result<(), AccessError> {
        (self.call)(object, arg)
    }
}

impl fmt::Debug for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodDescriptor")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .finish()
    }
}

/// Type-erased description of one concrete script kind.
pub struct KindDescriptor {
    tag: TypeTag,
    type_id: TypeId,
    type_name: &'static str,
    factory: FactoryFn,
    fields: Vec<FieldDescriptor>,
    methods: Vec<MethodDescriptor>,
    durable_field: Option<&'static str>,
    durable_id: Option<DurableFn>,
    restore_hooks: Vec<HookFn>,
}

impl KindDescriptor {
    pub fn tag(&self) -> &TypeTag {
        &self.tag
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|field| field.name == name)
    }

    pub fn methods(&self) -> &[MethodDescriptor] {
        &self.methods
    }

    pub fn method(&self, name: &str) -> Option<&MethodDescriptor> {
        self.methods.iter().find(|method| method.name == name)
    }

    /// Name of the field declared with [`KindBuilder::durable_id`].
    pub fn durable_id_field(&self) -> Option<&'static str> {
        self.durable_field
    }

    pub fn has_native_fields(&self) -> bool {
        self.fields.iter().any(|field| field.kind == FieldKind::Native)
    }

    /// Allocates a default instance; the walker fills the fields afterwards.
    pub(crate) fn allocate(&self) -> ObjectRef {
        (self.factory)()
    }

    pub(crate) fn durable_id(&self, object: &dyn Any) -> Option<Result<DurableId, AccessError>> {
        self.durable_id.as_ref().map(|read| read(object))
    }

    pub(crate) fn run_restore_hooks(
        &self,
        object: &ObjectRef,
        directory: &TypeDirectory,
    ) -> GraphResult<()> {
        self.restore_hooks
            .iter()
            .try_for_each(|hook| hook(object, directory))
    }
}

impl fmt::Debug for KindDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KindDescriptor")
            .field("tag", &self.tag)
            .field("type_name", &self.type_name)
            .field("fields", &self.fields)
            .field("methods", &self.methods)
            .finish()
    }
}

fn receiver<T: 'static>(object: &dyn Any) -> Result<&T, AccessError> {
    object.downcast_ref::<T>().ok_or(AccessError::Receiver)
}

fn receiver_mut<T: 'static>(object: &mut dyn Any) -> Result<&mut T, AccessError> {
    object.downcast_mut::<T>().ok_or(AccessError::Receiver)
}

fn wrong_shape(expected: &str, found: &FieldValue) -> AccessError {
    AccessError::Shape(format!("expected {expected}, found {}", found.shape()))
}

/// Declares the fields and methods of a concrete kind `T`.
///
/// ```
/// use scriptgraph::{KindBuilder, NativeHandle};
///
/// #[derive(Default)]
/// struct Door {
///     id: u32,
///     open: bool,
///     handle: NativeHandle,
/// }
///
/// let kind = KindBuilder::<Door>::new("game::Door")
///     .durable_id("id", |d| &d.id, |d| &mut d.id)
///     .scalar("open", |d| &d.open, |d| &mut d.open)
///     .native("handle", |d| &d.handle, |d| &mut d.handle)
///     .method("toggle", |d| d.open = !d.open)
///     .build()
///     .expect("valid descriptor");
/// assert_eq!(kind.fields().len(), 3);
/// ```
pub struct KindBuilder<T> {
    tag: TypeTag,
    factory: FactoryFn,
    fields: Vec<FieldDescriptor>,
    methods: Vec<MethodDescriptor>,
    durable_field: Option<&'static str>,
    durable_id: Option<DurableFn>,
    restore_hooks: Vec<HookFn>,
    _kind: std::marker::PhantomData<fn() -> T>,
}

impl<T: Default + 'static> KindBuilder<T> {
    pub fn new(tag: impl Into<TypeTag>) -> Self {
        Self::with_factory(tag, T::default)
    }
}

impl<T: 'static> KindBuilder<T> {
    /// Uses `factory` for zero-argument construction instead of `Default`.
    pub fn with_factory(tag: impl Into<TypeTag>, factory: impl Fn() -> T + 'static) -> Self {
        Self {
            tag: tag.into(),
            factory: Box::new(move || ObjectRef::new(factory())),
            fields: Vec::new(),
            methods: Vec::new(),
            durable_field: None,
            durable_id: None,
            restore_hooks: Vec::new(),
            _kind: std::marker::PhantomData,
        }
    }

    pub fn scalar<F: Scalar>(
        mut self,
        name: &'static str,
        get: fn(&T) -> &F,
        get_mut: fn(&mut T) -> &mut F,
    ) -> Self {
        self.fields.push(FieldDescriptor {
            name,
            kind: FieldKind::Scalar(F::TYPE),
            read: Box::new(move |object| {
                Ok(FieldValue::Scalar(get(receiver::<T>(object)?).to_value()))
            }),
            write: Box::new(move |object, value| {
                let value = match value {
                    FieldValue::Scalar(value) => value,
                    other => return Err(wrong_shape("scalar", &other)),
                };
                let found = value.scalar_type();
                let decoded = F::from_value(value).ok_or_else(|| {
                    AccessError::Shape(format!("cannot store {found} in a {} field", F::TYPE))
                })?;
                *get_mut(receiver_mut::<T>(object)?) = decoded;
                Ok(())
            }),
            reset: Box::new(move |object| {
                *get_mut(receiver_mut::<T>(object)?) = F::default();
                Ok(())
            }),
        });
        self
    }

    /// Declares a scalar field that also serves as the durable identifier
    /// used to rebind this kind's native handles.
    pub fn durable_id<F>(
        mut self,
        name: &'static str,
        get: fn(&T) -> &F,
        get_mut: fn(&mut T) -> &mut F,
    ) -> Self
    where
        F: Scalar + Copy + Into<u64>,
    {
        self.durable_field = Some(name);
        self.durable_id = Some(Box::new(move |object| {
            Ok(DurableId((*get(receiver::<T>(object)?)).into()))
        }));
        self.scalar(name, get, get_mut)
    }

    pub fn object(
        mut self,
        name: &'static str,
        get: fn(&T) -> &Option<ObjectRef>,
        get_mut: fn(&mut T) -> &mut Option<ObjectRef>,
    ) -> Self {
        self.fields.push(FieldDescriptor {
            name,
            kind: FieldKind::Object,
            read: Box::new(move |object| Ok(FieldValue::Object(get(receiver::<T>(object)?).clone()))),
            write: Box::new(move |object, value| match value {
                FieldValue::Object(target) => {
                    *get_mut(receiver_mut::<T>(object)?) = target;
                    Ok(())
                }
                other => Err(wrong_shape("object", &other)),
            }),
            reset: Box::new(move |object| {
                *get_mut(receiver_mut::<T>(object)?) = None;
                Ok(())
            }),
        });
        self
    }

    pub fn object_list(
        mut self,
        name: &'static str,
        get: fn(&T) -> &Vec<Option<ObjectRef>>,
        get_mut: fn(&mut T) -> &mut Vec<Option<ObjectRef>>,
    ) -> Self {
        self.fields.push(FieldDescriptor {
            name,
            kind: FieldKind::ObjectList,
            read: Box::new(move |object| Ok(FieldValue::List(get(receiver::<T>(object)?).clone()))),
            write: Box::new(move |object, value| match value {
                FieldValue::List(items) => {
                    *get_mut(receiver_mut::<T>(object)?) = items;
                    Ok(())
                }
                other => Err(wrong_shape("list", &other)),
            }),
            reset: Box::new(move |object| {
                get_mut(receiver_mut::<T>(object)?).clear();
                Ok(())
            }),
        });
        self
    }

    pub fn native(
        mut self,
        name: &'static str,
        get: fn(&T) -> &NativeHandle,
        get_mut: fn(&mut T) -> &mut NativeHandle,
    ) -> Self {
        self.fields.push(FieldDescriptor {
            name,
            kind: FieldKind::Native,
            read: Box::new(move |object| Ok(FieldValue::Handle(*get(receiver::<T>(object)?)))),
            write: Box::new(move |object, value| match value {
                FieldValue::Handle(handle) => {
                    *get_mut(receiver_mut::<T>(object)?) = handle;
                    Ok(())
                }
                other => Err(wrong_shape("native handle", &other)),
            }),
            reset: Box::new(move |object| {
                *get_mut(receiver_mut::<T>(object)?) = NativeHandle::UNBOUND;
                Ok(())
            }),
        });
        self
    }

    /// A method callable with no argument.
    pub fn method(mut self, name: &'static str, body: impl Fn(&mut T) + 'static) -> Self {
        self.methods.push(MethodDescriptor {
            name,
            arity: MethodArity::Zero,
            call: Box::new(move |object, arg| {
                if let Some(arg) = arg {
                    return Err(AccessError::Shape(format!(
                        "takes no argument, got {}",
                        arg.scalar_type()
                    )));
                }
                body(receiver_mut::<T>(object)?);
                Ok(())
            }),
        });
        self
    }

    /// A method taking exactly one value argument.
    pub fn method_with_arg<A: Scalar>(
        mut self,
        name: &'static str,
        body: impl Fn(&mut T, A) + 'static,
    ) -> Self {
        self.methods.push(MethodDescriptor {
            name,
            arity: MethodArity::One(A::TYPE),
            call: Box::new(move |object, arg| {
                let arg = arg
                    .ok_or_else(|| AccessError::Shape(format!("expects one {} argument", A::TYPE)))?;
                let found = arg.scalar_type();
                let arg = A::from_value(arg).ok_or_else(|| {
                    AccessError::Shape(format!("expects a {} argument, got {found}", A::TYPE))
                })?;
                body(receiver_mut::<T>(object)?, arg);
                Ok(())
            }),
        });
        self
    }

    /// Runs after a whole restore pass has populated every object, in
    /// allocation order.
    pub fn on_restore(
        mut self,
        hook: impl Fn(&T, &TypeDirectory) -> GraphResult<()> + 'static,
    ) -> Self {
        let tag = self.tag.clone();
        self.restore_hooks.push(Box::new(move |object, directory| {
            let guard = object.borrow_as::<T>().ok_or_else(|| GraphError::ObjectInUse {
                kind: tag.to_string(),
            })?;
            hook(&*guard, directory)
        }));
        self
    }

    pub fn build(self) -> GraphResult<KindDescriptor> {
        let invalid = |reason: String| GraphError::InvalidDescriptor {
            tag: self.tag.to_string(),
            reason,
        };
        if self.tag.as_str().trim().is_empty() {
            return Err(invalid("type tag is empty".to_string()));
        }
        let mut seen = HashSet::new();
        if let Some(field) = self.fields.iter().find(|field| !seen.insert(field.name)) {
            return Err(invalid(format!("field `{}` declared twice", field.name)));
        }
        let mut seen = HashSet::new();
        if let Some(method) = self.methods.iter().find(|method| !seen.insert(method.name)) {
            return Err(invalid(format!("method `{}` declared twice", method.name)));
        }
        if u16::try_from(self.fields.len()).is_err() {
            return Err(invalid("too many fields".to_string()));
        }
        let has_native = self.fields.iter().any(|field| field.kind == FieldKind::Native);
        if has_native && self.durable_id.is_none() {
            return Err(invalid(
                "native fields require a durable id field to rebind them".to_string(),
            ));
        }
        Ok(self.finish())
    }

    /// Skips validation; for built-in kinds whose shape is fixed.
    pub(crate) fn finish(self) -> KindDescriptor {
        KindDescriptor {
            tag: self.tag,
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            factory: self.factory,
            fields: self.fields,
            methods: self.methods,
            durable_field: self.durable_field,
            durable_id: self.durable_id,
            restore_hooks: self.restore_hooks,
        }
    }
}

#[cfg(test)]
#[path = "tests/descriptor_tests.rs"]
mod tests;
