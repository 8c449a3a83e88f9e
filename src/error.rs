use miette::Diagnostic;
use thiserror::Error;

pub type GraphResult<T> = Result<T, GraphError>;

/// Failures raised by a serialize/deserialize pass or by directory setup.
///
/// Every variant aborts the pass that produced it. Nothing partially built is
/// handed back to the caller.
#[derive(Clone, Debug, PartialEq, Eq, Error, Diagnostic)]
pub enum GraphError {
    #[error("unknown type tag `{tag}`")]
    #[diagnostic(
        code("graph.unknown_type"),
        help("register the kind with the type directory before restoring")
    )]
    UnknownType { tag: String },
    #[error("type tag `{tag}` is already registered")]
    #[diagnostic(code("graph.duplicate_tag"))]
    DuplicateTag { tag: String },
    #[error("unsupported value for field `{field}` of `{kind}`: {detail}")]
    #[diagnostic(code("graph.unsupported_value"))]
    UnsupportedValue {
        kind: String,
        field: String,
        detail: String,
    },
    #[error("method `{method}` is not exposed by `{kind}`")]
    #[diagnostic(code("graph.unresolved_method"))]
    UnresolvedMethod { kind: String, method: String },
    #[error("type mismatch: expected `{expected}`, found `{found}`")]
    #[diagnostic(code("graph.type_mismatch"))]
    TypeMismatch { expected: String, found: String },
    #[error("corrupt stream: {0}")]
    #[diagnostic(code("graph.corrupt_stream"))]
    CorruptStream(String),
    #[error("incompatible stream version: found {found}, expected {expected}")]
    #[diagnostic(code("graph.incompatible_version"))]
    IncompatibleVersion { found: u16, expected: u16 },
    #[error("snapshot authentication failed")]
    #[diagnostic(code("graph.authentication_failed"))]
    AuthenticationFailed,
    #[error("resource limit exceeded: {0}")]
    #[diagnostic(code("graph.resource_limit"))]
    ResourceLimit(String),
    #[error("object of kind `{kind}` is borrowed elsewhere during the pass")]
    #[diagnostic(
        code("graph.object_in_use"),
        help("passes require exclusive access to the object graph")
    )]
    ObjectInUse { kind: String },
    #[error("registry cannot be snapshotted: {0}")]
    #[diagnostic(
        code("graph.invalid_registry"),
        help("group every instance under its own type tag and category, once")
    )]
    InvalidRegistry(String),
    #[error("invalid kind descriptor for `{tag}`: {reason}")]
    #[diagnostic(code("graph.invalid_descriptor"))]
    InvalidDescriptor { tag: String, reason: String },
    #[error("configuration error: {0}")]
    #[diagnostic(code("graph.config"))]
    Config(String),
}

#[cold]
#[inline(never)]
pub(crate) fn corrupt(message: impl Into<String>) -> GraphError {
    GraphError::CorruptStream(message.into())
}
