//! Grouped storage of live script instances; the root of a snapshot.
//!
//! # Contracts
//! - **Invariant**: at most one [`ScriptKind`] group per (type tag, category).
//! - **Invariant**: slots keep insertion order; a removed instance leaves a
//!   hole that survives snapshot and restore.
//! - **Postcondition**: [`ScriptRegistry::snapshot`] only succeeds when the
//!   grouping is one [`ScriptRegistry::restore`] will accept.
//! - **Postcondition**: [`ScriptRegistry::restore`] either installs the whole
//!   decoded registry or leaves the live one untouched.

use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::descriptor::{KindBuilder, KindDescriptor};
use crate::directory::{TypeDirectory, TypeTag};
use crate::error::{corrupt, GraphError, GraphResult};
use crate::object::ObjectRef;
use crate::value::ScriptEnum;
use crate::walker::GraphWalker;

pub const SCRIPT_KIND_TAG: &str = "scriptgraph::ScriptKind";

/// Runtime grouping a script instance belongs to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "arbitrary", derive(arbitrary::Arbitrary))]
pub enum ScriptCategory {
    Actor,
    Entity,
    FlowNode,
    GameRules,
    #[default]
    Other,
}

impl ScriptEnum for ScriptCategory {
    fn to_discriminant(self) -> i64 {
        match self {
            Self::Actor => 0,
            Self::Entity => 1,
            Self::FlowNode => 2,
            Self::GameRules => 3,
            Self::Other => 4,
        }
    }

    fn from_discriminant(value: i64) -> Option<Self> {
        match value {
            0 => Some(Self::Actor),
            1 => Some(Self::Entity),
            2 => Some(Self::FlowNode),
            3 => Some(Self::GameRules),
            4 => Some(Self::Other),
            _ => None,
        }
    }
}

/// Every live instance of one concrete kind within one category.
#[derive(Clone, Debug, Default)]
pub struct ScriptKind {
    type_tag: TypeTag,
    category: ScriptCategory,
    instances: Vec<Option<ObjectRef>>,
}

impl ScriptKind {
    pub fn new(type_tag: impl Into<TypeTag>, category: ScriptCategory) -> Self {
        Self {
            type_tag: type_tag.into(),
            category,
            instances: Vec::new(),
        }
    }

    pub fn type_tag(&self) -> &TypeTag {
        &self.type_tag
    }

    pub fn category(&self) -> ScriptCategory {
        self.category
    }

    /// Slots in insertion order, holes included.
    pub fn instances(&self) -> &[Option<ObjectRef>] {
        &self.instances
    }

    pub fn live(&self) -> impl Iterator<Item = &ObjectRef> {
        self.instances.iter().flatten()
    }

    pub fn push(&mut self, instance: Option<ObjectRef>) {
        self.instances.push(instance);
    }

    pub(crate) fn descriptor() -> KindDescriptor {
        KindBuilder::<ScriptKind>::new(SCRIPT_KIND_TAG)
            .scalar("type_tag", |k| &k.type_tag, |k| &mut k.type_tag)
            .scalar("category", |k| &k.category, |k| &mut k.category)
            .object_list("instances", |k| &k.instances, |k| &mut k.instances)
            .finish()
    }
}

/// Explicitly owned registry of live script instances.
#[derive(Debug, Default)]
pub struct ScriptRegistry {
    groups: Vec<ScriptKind>,
}

impl ScriptRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `instance` to the group of its kind and category, creating
    /// the group on first use.
    pub fn add(
        &mut self,
        directory: &TypeDirectory,
        instance: ObjectRef,
        category: ScriptCategory,
    ) -> GraphResult<()> {
        let tag = directory.tag_for(&instance)?;
        let index = match self
            .groups
            .iter()
            .position(|group| group.category == category && &group.type_tag == tag)
        {
            Some(index) => index,
            None => {
                self.groups.push(ScriptKind::new(tag.clone(), category));
                self.groups.len() - 1
            }
        };
        self.groups[index].instances.push(Some(instance));
        Ok(())
    }

    /// Clears the slot holding `instance`. Returns `false` if it is not
    /// registered.
    pub fn remove(&mut self, instance: &ObjectRef) -> bool {
        for group in &mut self.groups {
            let slot = group
                .instances
                .iter_mut()
                .find(|slot| slot.as_ref().is_some_and(|live| live.ptr_eq(instance)));
            if let Some(slot) = slot {
                *slot = None;
                return true;
            }
        }
        false
    }

    pub fn find(
        &self,
        category: ScriptCategory,
        mut predicate: impl FnMut(&ObjectRef) -> bool,
    ) -> Option<ObjectRef> {
        self.in_category(category)
            .flat_map(ScriptKind::live)
            .find(|instance| predicate(instance))
            .cloned()
    }

    /// Like [`find`](Self::find), but the match must be a `T`.
    pub fn find_typed<T: 'static>(
        &self,
        category: ScriptCategory,
        predicate: impl FnMut(&ObjectRef) -> bool,
    ) -> GraphResult<Option<ObjectRef>> {
        match self.find(category, predicate) {
            Some(instance) if !instance.is::<T>() => Err(GraphError::TypeMismatch {
                expected: std::any::type_name::<T>().to_string(),
                found: instance.concrete_type_name().to_string(),
            }),
            found => Ok(found),
        }
    }

    /// First live `T` in `category` accepted by `predicate`. Instances that
    /// are mutably borrowed are skipped.
    pub fn find_instance_of<T: 'static>(
        &self,
        category: ScriptCategory,
        mut predicate: impl FnMut(&T) -> bool,
    ) -> Option<ObjectRef> {
        self.find(category, |instance| {
            instance
                .borrow_as::<T>()
                .is_some_and(|concrete| predicate(&*concrete))
        })
    }

    pub fn find_kind(
        &self,
        category: ScriptCategory,
        mut predicate: impl FnMut(&ScriptKind) -> bool,
    ) -> Option<&ScriptKind> {
        self.in_category(category).find(|group| predicate(group))
    }

    pub fn groups(&self) -> &[ScriptKind] {
        &self.groups
    }

    pub fn instance_count(&self) -> usize {
        self.groups.iter().map(|group| group.live().count()).sum()
    }

    fn in_category(&self, category: ScriptCategory) -> impl Iterator<Item = &ScriptKind> {
        self.groups
            .iter()
            .filter(move |group| group.category == category)
    }

    /// Serializes every group, holes included. Groupings built by hand
    /// through [`replace_groups`](Self::replace_groups) are checked first and
    /// rejected with [`GraphError::InvalidRegistry`] if a restore could not
    /// accept them.
    #[instrument(skip_all, fields(groups = self.groups.len()))]
    pub fn snapshot(&self, walker: &GraphWalker<'_>) -> GraphResult<Vec<u8>> {
        check_groups(walker.directory(), &self.groups, GraphError::InvalidRegistry)?;
        let roots: Vec<Option<ObjectRef>> = self
            .groups
            .iter()
            .map(|group| Some(ObjectRef::new(group.clone())))
            .collect();
        walker.serialize_list(&roots)
    }

    /// Decodes `bytes` and installs the result. On any error the live
    /// registry is left as it was.
    #[instrument(skip_all, fields(bytes = bytes.len()))]
    pub fn restore(&mut self, walker: &GraphWalker<'_>, bytes: &[u8]) -> GraphResult<()> {
        let roots = walker.deserialize_list(bytes)?;
        let groups = decode_groups(walker.directory(), roots)?;
        self.replace_groups(groups);
        Ok(())
    }

    /// Swaps in new grouped storage and returns the previous one.
    pub fn replace_groups(&mut self, groups: Vec<ScriptKind>) -> Vec<ScriptKind> {
        let previous = std::mem::replace(&mut self.groups, groups);
        info!(
            groups = self.groups.len(),
            instances = self.instance_count(),
            "installed script registry"
        );
        previous
    }

    pub fn summary(&self) -> RegistrySummary {
        RegistrySummary {
            instance_count: self.instance_count(),
            groups: self
                .groups
                .iter()
                .map(|group| GroupSummary {
                    type_tag: group.type_tag.clone(),
                    category: group.category,
                    slots: group.instances.len(),
                    live: group.live().count(),
                })
                .collect(),
        }
    }
}

fn decode_groups(
    directory: &TypeDirectory,
    roots: Vec<Option<ObjectRef>>,
) -> GraphResult<Vec<ScriptKind>> {
    let mut groups: Vec<ScriptKind> = Vec::with_capacity(roots.len());
    for root in roots {
        let root = root.ok_or_else(|| corrupt("null script kind group"))?;
        let group = root
            .borrow_as::<ScriptKind>()
            .map(|group| group.clone())
            .ok_or_else(|| GraphError::TypeMismatch {
                expected: std::any::type_name::<ScriptKind>().to_string(),
                found: root.concrete_type_name().to_string(),
            })?;
        groups.push(group);
    }
    check_groups(directory, &groups, |reason| corrupt(reason))?;
    Ok(groups)
}

/// Enforces the grouping invariants: every group tag is registered, each
/// (tag, category) appears once, and every instance carries its group's tag.
/// `invalid` builds the error for a broken invariant.
fn check_groups(
    directory: &TypeDirectory,
    groups: &[ScriptKind],
    invalid: fn(String) -> GraphError,
) -> GraphResult<()> {
    for (index, group) in groups.iter().enumerate() {
        directory.descriptor(&group.type_tag)?;
        if groups[..index]
            .iter()
            .any(|seen| seen.category == group.category && seen.type_tag == group.type_tag)
        {
            return Err(invalid(format!(
                "group `{}` ({:?}) appears twice",
                group.type_tag, group.category
            )));
        }
        for instance in group.live() {
            let tag = directory.tag_for(instance)?;
            if tag != &group.type_tag {
                return Err(invalid(format!(
                    "group `{}` holds an instance of `{tag}`",
                    group.type_tag
                )));
            }
        }
    }
    Ok(())
}

/// Shape of a registry, for logs and tooling.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrySummary {
    pub instance_count: usize,
    pub groups: Vec<GroupSummary>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupSummary {
    pub type_tag: TypeTag,
    pub category: ScriptCategory,
    /// Slots including holes.
    pub slots: usize,
    pub live: usize,
}

impl RegistrySummary {
    pub fn to_json_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "null".to_string())
    }
}

#[cfg(test)]
#[path = "tests/registry_tests.rs"]
mod tests;
