//! Decides which fields stay out of the stream.
//!
//! Excluded fields are neither written nor read; on restore they are reset
//! to their unbound sentinel so later code can tell they need rebinding.
//! The policy used for a restore must match the one used for the snapshot.
//! Every excluded field is rebound afterwards, so it must be able to hold a
//! handle and its kind must name a durable id.

use std::collections::{HashMap, HashSet};

use crate::descriptor::{FieldDescriptor, FieldKind, KindDescriptor};
use crate::directory::{TypeDirectory, TypeTag};
use crate::error::{GraphError, GraphResult};
use crate::value::ScalarType;

pub trait NativeHandlePolicy {
    fn is_native(&self, kind: &KindDescriptor, field: &FieldDescriptor) -> bool;

    /// Excludes a field when either policy does.
    fn or<P: NativeHandlePolicy>(self, other: P) -> Either<Self, P>
    where
        Self: Sized,
    {
        Either(self, other)
    }
}

/// Excludes fields declared with [`KindBuilder::native`](crate::KindBuilder::native).
#[derive(Clone, Copy, Debug, Default)]
pub struct DeclaredNative;

impl NativeHandlePolicy for DeclaredNative {
    fn is_native(&self, _kind: &KindDescriptor, field: &FieldDescriptor) -> bool {
        field.kind() == FieldKind::Native
    }
}

/// Field names a native collaborator wants excluded, per kind.
#[derive(Clone, Debug, Default)]
pub struct NativeFieldSet {
    fields: HashMap<TypeTag, HashSet<String>>,
}

impl NativeFieldSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark(&mut self, tag: impl Into<TypeTag>, field: impl Into<String>) -> &mut Self {
        self.fields.entry(tag.into()).or_default().insert(field.into());
        self
    }

    pub fn contains(&self, tag: &TypeTag, field: &str) -> bool {
        self.fields
            .get(tag)
            .is_some_and(|names| names.contains(field))
    }
}

impl NativeHandlePolicy for NativeFieldSet {
    fn is_native(&self, kind: &KindDescriptor, field: &FieldDescriptor) -> bool {
        self.contains(kind.tag(), field.name())
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct Either<A, B>(A, B);

impl<A: NativeHandlePolicy, B: NativeHandlePolicy> NativeHandlePolicy for Either<A, B> {
    fn is_native(&self, kind: &KindDescriptor, field: &FieldDescriptor) -> bool {
        self.0.is_native(kind, field) || self.1.is_native(kind, field)
    }
}

impl<P: NativeHandlePolicy + ?Sized> NativeHandlePolicy for &P {
    fn is_native(&self, kind: &KindDescriptor, field: &FieldDescriptor) -> bool {
        (**self).is_native(kind, field)
    }
}

impl<P: NativeHandlePolicy + ?Sized> NativeHandlePolicy for Box<P> {
    fn is_native(&self, kind: &KindDescriptor, field: &FieldDescriptor) -> bool {
        (**self).is_native(kind, field)
    }
}

/// Declared native fields are always excluded, whatever the policy says:
/// a handle has no wire representation.
pub(crate) fn excluded(
    policy: &dyn NativeHandlePolicy,
    kind: &KindDescriptor,
    field: &FieldDescriptor,
) -> bool {
    field.kind() == FieldKind::Native || policy.is_native(kind, field)
}

/// Whether a field of this shape can store a [`NativeHandle`](crate::NativeHandle):
/// a declared handle, or an integer wide enough for a raw handle value.
pub(crate) fn holds_handle(kind: FieldKind) -> bool {
    matches!(
        kind,
        FieldKind::Native
            | FieldKind::Scalar(ScalarType::U32 | ScalarType::U64 | ScalarType::I32 | ScalarType::I64)
    )
}

/// Rejects a policy that excludes a field the rebind pass could not restore.
pub(crate) fn check_policy(
    policy: &dyn NativeHandlePolicy,
    directory: &TypeDirectory,
) -> GraphResult<()> {
    for kind in directory.kinds() {
        for field in kind.fields() {
            if !excluded(policy, kind, field) {
                continue;
            }
            let reason = if !holds_handle(field.kind()) {
                format!(
                    "field `{}` is marked native but a {:?} field cannot hold a handle",
                    field.name(),
                    field.kind()
                )
            } else {
                match kind.durable_id_field() {
                    None => format!(
                        "field `{}` is marked native but the kind has no durable id field",
                        field.name()
                    ),
                    Some(durable) if durable == field.name() => {
                        format!("durable id field `{durable}` cannot be marked native")
                    }
                    Some(_) => continue,
                }
            };
            return Err(GraphError::InvalidDescriptor {
                tag: kind.tag().to_string(),
                reason,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "tests/policy_tests.rs"]
mod tests;
