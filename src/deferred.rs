//! A bound callable that survives a snapshot.
//!
//! The target rides the object-reference protocol, so it shares identity
//! with the same instance elsewhere in the graph. The selector is a method
//! name resolved through the target kind's method table, both when the call
//! is bound and again after every restore.

use crate::descriptor::{AccessError, KindBuilder, KindDescriptor, MethodArity};
use crate::directory::TypeDirectory;
use crate::error::{GraphError, GraphResult};
use crate::object::ObjectRef;
use crate::value::Value;

pub const DEFERRED_CALL_TAG: &str = "scriptgraph::DeferredCall";

const STATIC_KIND: &str = "<static>";

#[derive(Clone, Debug, Default)]
pub struct DeferredCall {
    target: Option<ObjectRef>,
    selector: String,
    delay: f32,
}

impl DeferredCall {
    /// An unresolved call. Use [`bind`](Self::bind) to resolve eagerly.
    pub fn new(target: Option<ObjectRef>, selector: impl Into<String>, delay: f32) -> Self {
        Self {
            target,
            selector: selector.into(),
            delay,
        }
    }

    /// Builds the call and checks that `selector` resolves.
    pub fn bind(
        directory: &TypeDirectory,
        target: Option<ObjectRef>,
        selector: impl Into<String>,
        delay: f32,
    ) -> GraphResult<Self> {
        let call = Self::new(target, selector, delay);
        call.resolve(directory)?;
        Ok(call)
    }

    pub fn target(&self) -> Option<&ObjectRef> {
        self.target.as_ref()
    }

    pub fn selector(&self) -> &str {
        &self.selector
    }

    /// Seconds the caller should wait before invoking. Not interpreted here.
    pub fn delay(&self) -> f32 {
        self.delay
    }

    /// Arity of the selected method. Target-less calls select a static
    /// function, which never takes an argument.
    pub fn resolve(&self, directory: &TypeDirectory) -> GraphResult<MethodArity> {
        match &self.target {
            None => directory
                .static_method(&self.selector)
                .map(|_| MethodArity::Zero)
                .ok_or_else(|| self.unresolved(STATIC_KIND)),
            Some(target) => {
                let kind = directory.descriptor_for(target)?;
                kind.method(&self.selector)
                    .map(|method| method.arity())
                    .ok_or_else(|| self.unresolved(kind.tag().as_str()))
            }
        }
    }

    pub fn invoke(&self, directory: &TypeDirectory) -> GraphResult<()> {
        self.call(directory, None)
    }

    pub fn invoke_with(&self, directory: &TypeDirectory, arg: Value) -> GraphResult<()> {
        self.call(directory, Some(arg))
    }

    fn call(&self, directory: &TypeDirectory, arg: Option<Value>) -> GraphResult<()> {
        let Some(target) = &self.target else {
            let body = directory
                .static_method(&self.selector)
                .ok_or_else(|| self.unresolved(STATIC_KIND))?;
            if let Some(arg) = arg {
                return Err(GraphError::UnsupportedValue {
                    kind: STATIC_KIND.to_string(),
                    field: self.selector.clone(),
                    detail: format!("takes no argument, got {}", arg.scalar_type()),
                });
            }
            body();
            return Ok(());
        };

        let kind = directory.descriptor_for(target)?;
        let method = kind
            .method(&self.selector)
            .ok_or_else(|| self.unresolved(kind.tag().as_str()))?;
        let mut guard = target.try_borrow_mut().ok_or_else(|| GraphError::ObjectInUse {
            kind: kind.tag().to_string(),
        })?;
        method
            .call((*guard).as_any_mut(), arg)
            .map_err(|err: AccessError| {
                err.into_graph_error(kind, &self.selector, target.concrete_type_name())
            })
    }

    fn unresolved(&self, kind: &str) -> GraphError {
        GraphError::UnresolvedMethod {
            kind: kind.to_string(),
            method: self.selector.clone(),
        }
    }

    pub(crate) fn descriptor() -> KindDescriptor {
        KindBuilder::<DeferredCall>::new(DEFERRED_CALL_TAG)
            .object("target", |c| &c.target, |c| &mut c.target)
            .scalar("selector", |c| &c.selector, |c| &mut c.selector)
            .scalar("delay", |c| &c.delay, |c| &mut c.delay)
            .on_restore(|call, directory| call.resolve(directory).map(|_| ()))
            .finish()
    }
}

#[cfg(test)]
#[path = "tests/deferred_tests.rs"]
mod tests;
