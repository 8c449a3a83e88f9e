//! Stable type tags and the directory that maps them to kind descriptors.

use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::deferred::DeferredCall;
use crate::descriptor::{KindBuilder, KindDescriptor};
use crate::error::{GraphError, GraphResult};
use crate::object::ObjectRef;
use crate::registry::ScriptKind;
use crate::value::{Scalar, ScalarType, Value};

/// Stable, string-keyed identity of a concrete script kind.
///
/// Tags are chosen by whoever registers the kind (a fully qualified name by
/// convention) and must not change between a snapshot and its restore.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TypeTag(String);

impl TypeTag {
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TypeTag {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for TypeTag {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl Scalar for TypeTag {
    const TYPE: ScalarType = ScalarType::Str;

    fn to_value(&self) -> Value {
        Value::Str(self.0.clone())
    }

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Str(tag) => Some(Self(tag)),
            _ => None,
        }
    }
}

type StaticFn = Box<dyn Fn()>;

/// Closed-at-registration set of kinds the walker can reconstruct.
///
/// # Contracts
/// - **Invariant**: a tag maps to exactly one Rust type and a Rust type to
///   exactly one tag.
/// - **Postcondition**: [`TypeDirectory::new`] already knows the built-in
///   [`ScriptKind`] and [`DeferredCall`] kinds.
pub struct TypeDirectory {
    kinds: Vec<KindDescriptor>,
    by_tag: HashMap<TypeTag, usize>,
    by_type: HashMap<TypeId, usize>,
    statics: HashMap<String, StaticFn>,
}

impl Default for TypeDirectory {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeDirectory {
    pub fn new() -> Self {
        let mut directory = Self::empty();
        for builtin in [ScriptKind::descriptor(), DeferredCall::descriptor()] {
            directory.insert(builtin);
        }
        directory
    }

    /// A directory without the built-in kinds.
    pub fn empty() -> Self {
        Self {
            kinds: Vec::new(),
            by_tag: HashMap::new(),
            by_type: HashMap::new(),
            statics: HashMap::new(),
        }
    }

    /// Adds a kind. Fails eagerly on a reused tag or a type registered twice.
    pub fn register(&mut self, kind: KindDescriptor) -> GraphResult<()> {
        if self.by_tag.contains_key(kind.tag()) {
            return Err(GraphError::DuplicateTag {
                tag: kind.tag().to_string(),
            });
        }
        if let Some(&existing) = self.by_type.get(&kind.type_id()) {
            return Err(GraphError::DuplicateTag {
                tag: format!(
                    "{} (type {} is already registered as `{}`)",
                    kind.tag(),
                    kind.type_name(),
                    self.kinds[existing].tag()
                ),
            });
        }
        debug!(tag = %kind.tag(), fields = kind.fields().len(), "registered script kind");
        self.insert(kind);
        Ok(())
    }

    /// Builds and registers in one step.
    pub fn register_kind<T: 'static>(&mut self, builder: KindBuilder<T>) -> GraphResult<()> {
        self.register(builder.build()?)
    }

    fn insert(&mut self, kind: KindDescriptor) {
        let index = self.kinds.len();
        self.by_tag.insert(kind.tag().clone(), index);
        self.by_type.insert(kind.type_id(), index);
        self.kinds.push(kind);
    }

    /// Registers a free function that target-less deferred calls can select.
    pub fn register_static(
        &mut self,
        name: impl Into<String>,
        body: impl Fn() + 'static,
    ) -> GraphResult<()> {
        let name = name.into();
        if self.statics.contains_key(&name) {
            return Err(GraphError::DuplicateTag { tag: name });
        }
        self.statics.insert(name, Box::new(body));
        Ok(())
    }

    pub(crate) fn static_method(&self, name: &str) -> Option<&dyn Fn()> {
        self.statics.get(name).map(|body| body.as_ref())
    }

    pub fn contains(&self, tag: &TypeTag) -> bool {
        self.by_tag.contains_key(tag)
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }

    /// Registered kinds in registration order, built-ins first.
    pub fn kinds(&self) -> impl Iterator<Item = &KindDescriptor> {
        self.kinds.iter()
    }

    pub fn tags(&self) -> impl Iterator<Item = &TypeTag> {
        self.kinds.iter().map(KindDescriptor::tag)
    }

    pub fn descriptor(&self, tag: &TypeTag) -> GraphResult<&KindDescriptor> {
        self.by_tag
            .get(tag)
            .map(|&index| &self.kinds[index])
            .ok_or_else(|| GraphError::UnknownType {
                tag: tag.to_string(),
            })
    }

    pub fn descriptor_of<T: 'static>(&self) -> Option<&KindDescriptor> {
        self.by_type
            .get(&TypeId::of::<T>())
            .map(|&index| &self.kinds[index])
    }

    pub fn descriptor_for(&self, object: &ObjectRef) -> GraphResult<&KindDescriptor> {
        self.by_type
            .get(&object.concrete_type_id())
            .map(|&index| &self.kinds[index])
            .ok_or_else(|| GraphError::UnknownType {
                tag: object.concrete_type_name().to_string(),
            })
    }

    pub fn tag_for(&self, object: &ObjectRef) -> GraphResult<&TypeTag> {
        self.descriptor_for(object).map(KindDescriptor::tag)
    }

    /// Zero-argument construction of the kind registered under `tag`.
    pub fn allocate(&self, tag: &TypeTag) -> GraphResult<ObjectRef> {
        self.descriptor(tag).map(KindDescriptor::allocate)
    }
}

impl fmt::Debug for TypeDirectory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut statics: Vec<&String> = self.statics.keys().collect();
        statics.sort();
        f.debug_struct("TypeDirectory")
            .field("kinds", &self.kinds.iter().map(KindDescriptor::tag).collect::<Vec<_>>())
            .field("statics", &statics)
            .finish()
    }
}

#[cfg(test)]
#[path = "tests/directory_tests.rs"]
mod tests;
