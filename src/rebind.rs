//! Post-restore pass that re-acquires native handles.
//!
//! Restored instances come back with every native field unbound: handles
//! set to [`NativeHandle::UNBOUND`], policy-marked integer fields set to zero.
//! The pass hands each one's durable id to a [`NativeBinder`] and writes the
//! returned handles back.

use miette::Diagnostic;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::descriptor::{FieldDescriptor, FieldKind, FieldValue};
use crate::directory::TypeTag;
use crate::error::{GraphError, GraphResult};
use crate::object::{DurableId, NativeHandle};
use crate::registry::ScriptRegistry;
use crate::value::{ScalarType, Value};
use crate::walker::GraphWalker;

/// One handle the binder is asked for.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RebindRequest {
    pub tag: TypeTag,
    pub field: &'static str,
    pub durable_id: DurableId,
}

#[derive(Clone, Debug, PartialEq, Eq, Error, Diagnostic, Serialize)]
pub enum RebindError {
    #[error("no native resource for `{tag}` {durable_id}")]
    #[diagnostic(code("rebind.not_found"))]
    NotFound { tag: TypeTag, durable_id: DurableId },
    #[error("native rebind failed: {0}")]
    #[diagnostic(code("rebind.failed"))]
    Failed(String),
}

/// The native collaborator's side of rebinding.
pub trait NativeBinder {
    fn rebind(&mut self, request: &RebindRequest) -> Result<NativeHandle, RebindError>;
}

impl<F> NativeBinder for F
where
    F: FnMut(&RebindRequest) -> Result<NativeHandle, RebindError>,
{
    fn rebind(&mut self, request: &RebindRequest) -> Result<NativeHandle, RebindError> {
        self(request)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RebindFailure {
    pub request: RebindRequest,
    pub error: RebindError,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RebindReport {
    /// Handles written back.
    pub rebound: usize,
    /// Native fields that were already bound.
    pub skipped: usize,
    pub failures: Vec<RebindFailure>,
}

impl RebindReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Rebinds every unbound native field of every live registry instance.
///
/// A field is native when `walker`'s policy excludes it from the stream: a
/// declared handle, or an integer field the collaborator marked native.
/// Binder failures are collected in the report. Structural problems (an
/// unknown group tag, a kind without a durable id, an instance borrowed
/// elsewhere) abort the pass.
#[instrument(skip_all, fields(groups = registry.groups().len()))]
pub fn rebind_registry(
    registry: &ScriptRegistry,
    walker: &GraphWalker<'_>,
    binder: &mut dyn NativeBinder,
) -> GraphResult<RebindReport> {
    let directory = walker.directory();
    let mut report = RebindReport::default();
    for group in registry.groups() {
        let kind = directory.descriptor(group.type_tag())?;
        let natives: Vec<&FieldDescriptor> = kind
            .fields()
            .iter()
            .filter(|field| walker.is_excluded(kind, field))
            .collect();
        if natives.is_empty() {
            continue;
        }
        for instance in group.live() {
            let found = instance.concrete_type_name();
            let mut guard = instance
                .try_borrow_mut()
                .ok_or_else(|| GraphError::ObjectInUse {
                    kind: kind.tag().to_string(),
                })?;
            let object = (*guard).as_any_mut();

            let durable_id = kind
                .durable_id(&*object)
                .ok_or_else(|| GraphError::InvalidDescriptor {
                    tag: kind.tag().to_string(),
                    reason: "native fields require a durable id field to rebind them".to_string(),
                })?
                .map_err(|err| err.into_graph_error(kind, "durable id", found))?;

            for field in &natives {
                let current = field
                    .read(&*object)
                    .map_err(|err| err.into_graph_error(kind, field.name(), found))?;
                if current_handle(&current).is_some_and(NativeHandle::is_bound) {
                    report.skipped += 1;
                    continue;
                }

                let request = RebindRequest {
                    tag: kind.tag().clone(),
                    field: field.name(),
                    durable_id,
                };
                let outcome = binder.rebind(&request).and_then(|handle| {
                    handle_value(field.kind(), handle).ok_or_else(|| {
                        RebindError::Failed(format!(
                            "handle {:#x} does not fit field `{}`",
                            handle.raw(),
                            field.name()
                        ))
                    })
                });
                match outcome {
                    Ok(value) => {
                        field
                            .write(&mut *object, value)
                            .map_err(|err| err.into_graph_error(kind, field.name(), found))?;
                        report.rebound += 1;
                    }
                    Err(error) => {
                        warn!(tag = %request.tag, field = request.field, id = %durable_id, %error, "native rebind failed");
                        report.failures.push(RebindFailure { request, error });
                    }
                }
            }
        }
    }
    debug!(
        rebound = report.rebound,
        skipped = report.skipped,
        failed = report.failures.len(),
        "rebind pass finished"
    );
    Ok(report)
}

/// The handle a native field currently holds. Integer fields hold the raw
/// value; zero is unbound either way.
fn current_handle(value: &FieldValue) -> Option<NativeHandle> {
    let raw = match value {
        FieldValue::Handle(handle) => return Some(*handle),
        FieldValue::Scalar(Value::U32(raw)) => usize::try_from(*raw).ok(),
        FieldValue::Scalar(Value::U64(raw)) => usize::try_from(*raw).ok(),
        FieldValue::Scalar(Value::I32(raw)) => usize::try_from(*raw).ok(),
        FieldValue::Scalar(Value::I64(raw)) => usize::try_from(*raw).ok(),
        _ => None,
    };
    raw.map(NativeHandle::from_raw)
}

/// Converts a handle into a value for a field of shape `kind`. `None` when
/// the raw value does not fit.
fn handle_value(kind: FieldKind, handle: NativeHandle) -> Option<FieldValue> {
    let raw = handle.raw();
    let value = match kind {
        FieldKind::Native => return Some(FieldValue::Handle(handle)),
        FieldKind::Scalar(ScalarType::U32) => Value::U32(u32::try_from(raw).ok()?),
        FieldKind::Scalar(ScalarType::U64) => Value::U64(u64::try_from(raw).ok()?),
        FieldKind::Scalar(ScalarType::I32) => Value::I32(i32::try_from(raw).ok()?),
        FieldKind::Scalar(ScalarType::I64) => Value::I64(i64::try_from(raw).ok()?),
        _ => return None,
    };
    Some(FieldValue::Scalar(value))
}

#[cfg(test)]
#[path = "tests/rebind_tests.rs"]
mod tests;
