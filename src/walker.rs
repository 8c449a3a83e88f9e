//! Object-graph serializer.
//!
//! Walks any graph of registered kinds depth-first. Each node is one
//! discriminator byte: null, back-reference (u32 position) or fresh object
//! (tag, u16 field count, fields in descriptor order). Native fields are
//! never written and come back as their unbound sentinel.
//!
//! # Contracts
//! - **Precondition**: the caller has exclusive access to the graph for the
//!   duration of a pass.
//! - **Postcondition**: every distinct object is written once; later
//!   occurrences are back-references, so shared references stay shared and
//!   cycles terminate.
//! - **Postcondition**: a failed deserialize returns nothing of the graph.

use tracing::{debug, instrument};

use crate::config::SerializerConfig;
use crate::descriptor::{AccessError, FieldDescriptor, FieldKind, FieldValue, KindDescriptor};
use crate::directory::{TypeDirectory, TypeTag};
use crate::envelope;
use crate::error::{corrupt, GraphError, GraphResult};
use crate::object::ObjectRef;
use crate::policy::{check_policy, excluded, DeclaredNative, NativeHandlePolicy};
use crate::reference::{ReadRefTable, Visit, WriteRefTable};
use crate::value::{decode_value, encode_value, FieldContext, ScalarType, Value};
use crate::wire::{
    WireReader, WireWriter, NODE_BACK_REF, NODE_FRESH, NODE_NULL, ROOT_LIST, ROOT_OBJECT,
};

/// Serializes and restores object graphs against one [`TypeDirectory`].
pub struct GraphWalker<'d> {
    directory: &'d TypeDirectory,
    policy: Box<dyn NativeHandlePolicy + 'd>,
    config: SerializerConfig,
}

impl<'d> GraphWalker<'d> {
    pub fn new(directory: &'d TypeDirectory) -> Self {
        Self {
            directory,
            policy: Box::new(DeclaredNative),
            config: SerializerConfig::default(),
        }
    }

    /// Replaces the native handle policy. Fails with
    /// [`GraphError::InvalidDescriptor`] when the policy excludes a field that
    /// cannot hold a handle, the durable id itself, or a field of a kind
    /// without a durable id: such a field could never be rebound.
    pub fn with_policy(mut self, policy: impl NativeHandlePolicy + 'd) -> GraphResult<Self> {
        check_policy(&policy, self.directory)?;
        self.policy = Box::new(policy);
        Ok(self)
    }

    pub fn with_config(mut self, config: SerializerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn directory(&self) -> &'d TypeDirectory {
        self.directory
    }

    pub fn config(&self) -> &SerializerConfig {
        &self.config
    }

    #[instrument(skip_all)]
    pub fn serialize(&self, root: &ObjectRef) -> GraphResult<Vec<u8>> {
        let mut encoder = Encoder::new(self);
        encoder.writer.put_u8(ROOT_OBJECT);
        encoder.run(vec![Task::Node(Some(root.clone()))])?;
        encoder.finish()
    }

    /// Serializes a sequence root. Holes are kept.
    #[instrument(skip_all, fields(len = items.len()))]
    pub fn serialize_list(&self, items: &[Option<ObjectRef>]) -> GraphResult<Vec<u8>> {
        let mut encoder = Encoder::new(self);
        encoder.writer.put_u8(ROOT_LIST);
        let mut tasks = Vec::new();
        encoder.list(items, &mut tasks)?;
        encoder.run(tasks)?;
        encoder.finish()
    }

    #[instrument(skip_all, fields(bytes = bytes.len()))]
    pub fn deserialize(&self, bytes: &[u8]) -> GraphResult<ObjectRef> {
        let mut decoder = Decoder::new(self, envelope::unwrap(bytes)?);
        let root = decoder.root_object();
        decoder.settle(root)
    }

    #[instrument(skip_all, fields(bytes = bytes.len()))]
    pub fn deserialize_list(&self, bytes: &[u8]) -> GraphResult<Vec<Option<ObjectRef>>> {
        let mut decoder = Decoder::new(self, envelope::unwrap(bytes)?);
        let items = decoder.root_list();
        decoder.settle(items)
    }

    pub(crate) fn is_excluded(&self, kind: &KindDescriptor, field: &FieldDescriptor) -> bool {
        excluded(self.policy.as_ref(), kind, field)
    }
}

fn access_error(
    kind: &KindDescriptor,
    field: &FieldDescriptor,
    object: &ObjectRef,
    error: AccessError,
) -> GraphError {
    error.into_graph_error(kind, field.name(), object.concrete_type_name())
}

fn object_in_use(kind: &KindDescriptor) -> GraphError {
    GraphError::ObjectInUse {
        kind: kind.tag().to_string(),
    }
}

/// Pending encoder work. Popped in LIFO order, so pushing fields in reverse
/// emits them in descriptor order, exactly as a recursive walk would.
enum Task<'d> {
    Node(Option<ObjectRef>),
    Field {
        kind: &'d KindDescriptor,
        field: &'d FieldDescriptor,
        value: FieldValue,
    },
    /// Closes the object opened by the matching fresh node.
    Leave,
}

struct Encoder<'w, 'd> {
    walker: &'w GraphWalker<'d>,
    writer: WireWriter,
    refs: WriteRefTable,
    depth: usize,
}

impl<'w, 'd> Encoder<'w, 'd> {
    fn new(walker: &'w GraphWalker<'d>) -> Self {
        Self {
            walker,
            writer: WireWriter::new(),
            refs: WriteRefTable::new(walker.config.max_objects),
            depth: 0,
        }
    }

    fn finish(self) -> GraphResult<Vec<u8>> {
        let objects = self.refs.len();
        let payload = self.writer.into_inner();
        let framed = envelope::wrap(&payload)?;
        debug!(objects, bytes = framed.len(), "serialized object graph");
        Ok(framed)
    }

    /// Drains the work stack. Nesting lives on the heap, so long reference
    /// chains cost memory, not native stack.
    fn run(&mut self, mut tasks: Vec<Task<'d>>) -> GraphResult<()> {
        while let Some(task) = tasks.pop() {
            match task {
                Task::Node(None) => self.writer.put_u8(NODE_NULL),
                Task::Node(Some(object)) => match self.refs.visit(&object)? {
                    Visit::Seen(position) => {
                        self.writer.put_u8(NODE_BACK_REF);
                        self.writer.put_u32(position);
                    }
                    Visit::Fresh => self.fresh(&object, &mut tasks)?,
                },
                Task::Field { kind, field, value } => self.field(kind, field, value, &mut tasks)?,
                Task::Leave => self.depth -= 1,
            }
        }
        Ok(())
    }

    fn list(&mut self, items: &[Option<ObjectRef>], tasks: &mut Vec<Task<'d>>) -> GraphResult<()> {
        let max = self.walker.config.max_list_len;
        if items.len() > max {
            return Err(GraphError::ResourceLimit(format!(
                "list length {} exceeds limit {max}",
                items.len()
            )));
        }
        self.writer.put_len(items.len())?;
        tasks.extend(items.iter().rev().cloned().map(Task::Node));
        Ok(())
    }

    fn fresh(&mut self, object: &ObjectRef, tasks: &mut Vec<Task<'d>>) -> GraphResult<()> {
        let walker = self.walker;
        let kind = walker.directory.descriptor_for(object)?;
        self.enter()?;

        self.writer.put_u8(NODE_FRESH);
        self.put_blob_str(kind.tag().as_str())?;

        let emitted: Vec<&'d FieldDescriptor> = kind
            .fields()
            .iter()
            .filter(|field| !walker.is_excluded(kind, field))
            .collect();
        // Bounded by `KindBuilder::build`.
        self.writer.put_u16(emitted.len() as u16);

        // Read every value under one shared borrow and release it before any
        // child is visited, so cycles back to this object never re-borrow.
        let guard = object.try_borrow().ok_or_else(|| object_in_use(kind))?;
        let values = emitted
            .iter()
            .map(|field| {
                field
                    .read((*guard).as_any())
                    .map_err(|err| access_error(kind, field, object, err))
            })
            .collect::<GraphResult<Vec<FieldValue>>>();
        drop(guard);
        let values = values?;

        tasks.push(Task::Leave);
        for (field, value) in emitted.into_iter().zip(values).rev() {
            tasks.push(Task::Field { kind, field, value });
        }
        Ok(())
    }

    fn field(
        &mut self,
        kind: &KindDescriptor,
        field: &FieldDescriptor,
        value: FieldValue,
        tasks: &mut Vec<Task<'d>>,
    ) -> GraphResult<()> {
        match value {
            FieldValue::Scalar(value) => {
                let context = FieldContext {
                    kind: kind.tag().as_str(),
                    field: field.name(),
                };
                if FieldKind::Scalar(value.scalar_type()) != field.kind() {
                    return Err(context.unsupported(format!(
                        "accessor produced {} for a {:?} field",
                        value.scalar_type(),
                        field.kind()
                    )));
                }
                if let Value::Str(text) = &value {
                    self.check_blob(text.len())?;
                }
                if let Value::Bytes(bytes) = &value {
                    self.check_blob(bytes.len())?;
                }
                encode_value(&mut self.writer, &value)
            }
            FieldValue::Object(target) => {
                tasks.push(Task::Node(target));
                Ok(())
            }
            FieldValue::List(items) => self.list(&items, tasks),
            FieldValue::Handle(_) => Err(GraphError::UnsupportedValue {
                kind: kind.tag().to_string(),
                field: field.name().to_string(),
                detail: "native handles have no wire representation".to_string(),
            }),
        }
    }

    fn enter(&mut self) -> GraphResult<()> {
        self.depth += 1;
        let max = self.walker.config.max_depth;
        if self.depth > max {
            return Err(GraphError::ResourceLimit(format!(
                "object nesting exceeds depth {max}"
            )));
        }
        Ok(())
    }

    fn check_blob(&self, len: usize) -> GraphResult<()> {
        let max = self.walker.config.max_blob_bytes;
        if len > max {
            return Err(GraphError::ResourceLimit(format!(
                "value of {len} bytes exceeds limit {max}"
            )));
        }
        Ok(())
    }

    fn put_blob_str(&mut self, value: &str) -> GraphResult<()> {
        self.check_blob(value.len())?;
        self.writer.put_str(value)
    }
}

/// An object whose fields are still being read.
struct Frame<'d> {
    kind: &'d KindDescriptor,
    object: ObjectRef,
    /// Index of the next field in descriptor order.
    field: usize,
    /// Remaining count and items of the list field at `field`, while it is
    /// being read.
    list: Option<(usize, Vec<Option<ObjectRef>>)>,
}

struct Decoder<'w, 'd, 'b> {
    walker: &'w GraphWalker<'d>,
    reader: WireReader<'b>,
    refs: ReadRefTable,
    frames: Vec<Frame<'d>>,
}

impl<'w, 'd, 'b> Decoder<'w, 'd, 'b> {
    fn new(walker: &'w GraphWalker<'d>, payload: &'b [u8]) -> Self {
        Self {
            walker,
            reader: WireReader::new(payload),
            refs: ReadRefTable::new(walker.config.max_objects),
            frames: Vec::new(),
        }
    }

    fn expect_root(&mut self, expected: u8) -> GraphResult<()> {
        let shape = self.reader.u8()?;
        if shape == expected {
            return Ok(());
        }
        let name = |shape: u8| match shape {
            ROOT_OBJECT => "object root".to_string(),
            ROOT_LIST => "list root".to_string(),
            other => format!("root shape {other}"),
        };
        if shape != ROOT_OBJECT && shape != ROOT_LIST {
            return Err(corrupt(format!("invalid {}", name(shape))));
        }
        Err(GraphError::TypeMismatch {
            expected: name(expected),
            found: name(shape),
        })
    }

    fn root_object(&mut self) -> GraphResult<ObjectRef> {
        self.expect_root(ROOT_OBJECT)?;
        self.node()?
            .ok_or_else(|| corrupt("root object is null"))
    }

    fn root_list(&mut self) -> GraphResult<Vec<Option<ObjectRef>>> {
        self.expect_root(ROOT_LIST)?;
        let len = self
            .reader
            .len(self.walker.config.max_list_len, "list")?;
        // Every element takes at least one byte.
        let mut items = Vec::with_capacity(len.min(self.reader.remaining()));
        for _ in 0..len {
            items.push(self.node()?);
        }
        Ok(items)
    }

    /// Completes the pass. On failure every object allocated so far has its
    /// references cleared, so a half-built cycle does not outlive the pass.
    fn settle<T>(&self, root: GraphResult<T>) -> GraphResult<T> {
        let result = root.and_then(|root| self.finish().map(|()| root));
        if result.is_err() {
            self.discard();
        }
        result
    }

    /// Rejects trailing bytes, then runs restore hooks over every object in
    /// allocation order.
    fn finish(&self) -> GraphResult<()> {
        if self.reader.remaining() != 0 {
            return Err(corrupt(format!(
                "{} trailing bytes after the root",
                self.reader.remaining()
            )));
        }
        let directory = self.walker.directory;
        for object in self.refs.objects() {
            directory
                .descriptor_for(object)?
                .run_restore_hooks(object, directory)?;
        }
        debug!(objects = self.refs.len(), "restored object graph");
        Ok(())
    }

    fn discard(&self) {
        let directory = self.walker.directory;
        for object in self.refs.objects() {
            let (Ok(kind), Some(mut guard)) =
                (directory.descriptor_for(object), object.try_borrow_mut())
            else {
                continue;
            };
            for field in kind.fields() {
                if matches!(field.kind(), FieldKind::Object | FieldKind::ObjectList) {
                    let _ = field.reset((*guard).as_any_mut());
                }
            }
        }
        debug!(objects = self.refs.len(), "discarded partial object graph");
    }

    /// Reads one node and everything it owns without recursing.
    fn node(&mut self) -> GraphResult<Option<ObjectRef>> {
        let base = self.frames.len();
        let mut ready = self.begin()?;
        loop {
            if let Some(value) = ready {
                if self.frames.len() == base {
                    return Ok(value);
                }
                self.accept(value)?;
            }
            ready = self.resume()?;
        }
    }

    /// Starts a node. `None` means a fresh object was pushed as a frame and
    /// its fields are still to be read.
    fn begin(&mut self) -> GraphResult<Option<Option<ObjectRef>>> {
        let at = self.reader.position();
        match self.reader.u8()? {
            NODE_NULL => Ok(Some(None)),
            NODE_BACK_REF => {
                let position = self.reader.u32()?;
                self.refs.resolve(position).map(|object| Some(Some(object)))
            }
            NODE_FRESH => {
                self.fresh()?;
                Ok(None)
            }
            other => Err(corrupt(format!(
                "invalid node discriminator {other} at byte {at}"
            ))),
        }
    }

    fn fresh(&mut self) -> GraphResult<()> {
        let walker = self.walker;
        let max = walker.config.max_depth;
        if self.frames.len() >= max {
            return Err(GraphError::ResourceLimit(format!(
                "object nesting exceeds depth {max}"
            )));
        }

        let tag = TypeTag::new(self.reader.string(walker.config.max_blob_bytes)?);
        let kind = walker.directory.descriptor(&tag)?;
        let object = kind.allocate();
        // Registered before the fields so a cycle resolves to this instance.
        self.refs.register(object.clone())?;

        let declared = kind
            .fields()
            .iter()
            .filter(|field| !walker.is_excluded(kind, field))
            .count();
        let count = self.reader.u16()? as usize;
        if count != declared {
            return Err(corrupt(format!(
                "kind `{tag}` has {declared} serialized fields but the stream holds {count}"
            )));
        }

        self.frames.push(Frame {
            kind,
            object,
            field: 0,
            list: None,
        });
        Ok(())
    }

    /// Hands a finished child node to the innermost frame.
    fn accept(&mut self, value: Option<ObjectRef>) -> GraphResult<()> {
        let Some(frame) = self.frames.last_mut() else {
            return Err(corrupt("child node without a parent object"));
        };
        if let Some((remaining, items)) = frame.list.as_mut() {
            items.push(value);
            *remaining -= 1;
            return Ok(());
        }
        let kind = frame.kind;
        let field = field_at(kind, frame.field)?;
        frame.field += 1;
        let object = frame.object.clone();
        store(kind, field, &object, FieldValue::Object(value))
    }

    /// Advances the innermost frame until it needs a child node or is
    /// complete. A complete frame is popped and returned as a finished node.
    fn resume(&mut self) -> GraphResult<Option<Option<ObjectRef>>> {
        loop {
            let Some(frame) = self.frames.last_mut() else {
                return Err(corrupt("no object is being read"));
            };
            let kind = frame.kind;

            if let Some((remaining, _)) = &frame.list {
                if *remaining > 0 {
                    return self.begin();
                }
                let (_, items) = frame.list.take().unwrap_or_default();
                let field = field_at(kind, frame.field)?;
                frame.field += 1;
                let object = frame.object.clone();
                store(kind, field, &object, FieldValue::List(items))?;
                continue;
            }

            let Some(field) = kind.fields().get(frame.field) else {
                let done = self.frames.pop().map(|frame| frame.object);
                return Ok(Some(done));
            };
            let object = frame.object.clone();

            if self.walker.is_excluded(kind, field) {
                frame.field += 1;
                let mut guard = object.try_borrow_mut().ok_or_else(|| object_in_use(kind))?;
                field
                    .reset((*guard).as_any_mut())
                    .map_err(|err| access_error(kind, field, &object, err))?;
                continue;
            }

            match field.kind() {
                FieldKind::Scalar(expected) => {
                    frame.field += 1;
                    let value = self.scalar(kind, field, expected)?;
                    store(kind, field, &object, FieldValue::Scalar(value))?;
                }
                FieldKind::Object => return self.begin(),
                FieldKind::ObjectList => {
                    let len = self
                        .reader
                        .len(self.walker.config.max_list_len, "list")?;
                    let items = Vec::with_capacity(len.min(self.reader.remaining()));
                    if let Some(frame) = self.frames.last_mut() {
                        frame.list = Some((len, items));
                    }
                }
                FieldKind::Native => {
                    return Err(corrupt(format!(
                        "native field `{}` of `{}` cannot be read from a stream",
                        field.name(),
                        kind.tag()
                    )))
                }
            }
        }
    }

    fn scalar(
        &mut self,
        kind: &KindDescriptor,
        field: &FieldDescriptor,
        expected: ScalarType,
    ) -> GraphResult<Value> {
        let context = FieldContext {
            kind: kind.tag().as_str(),
            field: field.name(),
        };
        let value = decode_value(&mut self.reader, self.walker.config.max_blob_bytes, context)?;
        if value.scalar_type() != expected {
            return Err(context.unsupported(format!(
                "stream holds {} for a {expected} field",
                value.scalar_type()
            )));
        }
        Ok(value)
    }
}

fn field_at(kind: &KindDescriptor, index: usize) -> GraphResult<&FieldDescriptor> {
    kind.fields()
        .get(index)
        .ok_or_else(|| corrupt(format!("`{}` has no field at index {index}", kind.tag())))
}

fn store(
    kind: &KindDescriptor,
    field: &FieldDescriptor,
    object: &ObjectRef,
    value: FieldValue,
) -> GraphResult<()> {
    let mut guard = object.try_borrow_mut().ok_or_else(|| object_in_use(kind))?;
    field
        .write((*guard).as_any_mut(), value)
        .map_err(|err| access_error(kind, field, object, err))
}

#[cfg(test)]
#[path = "tests/walker_tests.rs"]
mod tests;
