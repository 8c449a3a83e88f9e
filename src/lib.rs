//! Reload-durable snapshots of live script object graphs.
//!
//! A [`ScriptRegistry`] groups live script instances by kind and category.
//! A [`GraphWalker`] turns it (or any graph of registered kinds) into bytes
//! and back, preserving shared references, cycles and null holes. Native
//! handles never reach the stream; [`rebind_registry`] re-acquires them
//! after a restore from each instance's durable id.

mod config;
mod deferred;
mod descriptor;
mod directory;
mod envelope;
mod error;
mod object;
mod policy;
mod rebind;
mod reference;
mod registry;
mod value;
mod version;
mod walker;
mod wire;

pub use config::SerializerConfig;
pub use deferred::{DeferredCall, DEFERRED_CALL_TAG};
pub use descriptor::{
    FieldDescriptor, FieldKind, FieldValue, KindBuilder, KindDescriptor, MethodArity,
    MethodDescriptor,
};
pub use directory::{TypeDirectory, TypeTag};
pub use envelope::{seal, snapshot_id, snapshot_id_hex, unseal, SnapshotId};
pub use error::{GraphError, GraphResult};
pub use object::{DurableId, NativeHandle, ObjectRef, ScriptObject};
pub use policy::{DeclaredNative, Either, NativeFieldSet, NativeHandlePolicy};
pub use rebind::{
    rebind_registry, NativeBinder, RebindError, RebindFailure, RebindReport, RebindRequest,
};
pub use registry::{
    GroupSummary, RegistrySummary, ScriptCategory, ScriptKind, ScriptRegistry, SCRIPT_KIND_TAG,
};
pub use value::{Scalar, ScalarType, ScriptEnum, Value};
pub use version::{GRAPH_BINARY_MAGIC, GRAPH_FORMAT_VERSION, SEALED_BINARY_MAGIC};
pub use walker::GraphWalker;
