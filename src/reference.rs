//! Per-pass identity tables.
//!
//! Positions are assigned in emission order, which is the same on both
//! sides of a pass. The tables hold strong handles so an identity cannot be
//! freed and reused by another allocation while the pass runs.

use std::collections::HashMap;

use crate::error::{corrupt, GraphError, GraphResult};
use crate::object::ObjectRef;

/// Serialize side: object identity → emission position.
#[derive(Debug)]
pub(crate) struct WriteRefTable {
    positions: HashMap<usize, u32>,
    live: Vec<ObjectRef>,
    max_objects: usize,
}

/// Outcome of presenting an object to the write table.
pub(crate) enum Visit {
    /// First occurrence; the caller emits the full object.
    Fresh,
    /// Already emitted at this position.
    Seen(u32),
}

impl WriteRefTable {
    pub(crate) fn new(max_objects: usize) -> Self {
        Self {
            positions: HashMap::new(),
            live: Vec::new(),
            max_objects,
        }
    }

    pub(crate) fn visit(&mut self, object: &ObjectRef) -> GraphResult<Visit> {
        if let Some(&position) = self.positions.get(&object.identity()) {
            return Ok(Visit::Seen(position));
        }
        if self.live.len() >= self.max_objects {
            return Err(GraphError::ResourceLimit(format!(
                "snapshot exceeds {} objects",
                self.max_objects
            )));
        }
        let position = u32::try_from(self.live.len()).map_err(|_| {
            GraphError::ResourceLimit("object count does not fit the stream format".to_string())
        })?;
        self.positions.insert(object.identity(), position);
        self.live.push(object.clone());
        Ok(Visit::Fresh)
    }

    pub(crate) fn len(&self) -> usize {
        self.live.len()
    }
}

/// Deserialize side: emission position → materialized object.
#[derive(Debug)]
pub(crate) struct ReadRefTable {
    objects: Vec<ObjectRef>,
    max_objects: usize,
}

impl ReadRefTable {
    pub(crate) fn new(max_objects: usize) -> Self {
        Self {
            objects: Vec::new(),
            max_objects,
        }
    }

    /// Registers a freshly allocated object before its fields are read, so
    /// cycles back to it resolve to the partially built instance.
    pub(crate) fn register(&mut self, object: ObjectRef) -> GraphResult<()> {
        if self.objects.len() >= self.max_objects {
            return Err(GraphError::ResourceLimit(format!(
                "snapshot exceeds {} objects",
                self.max_objects
            )));
        }
        self.objects.push(object);
        Ok(())
    }

    pub(crate) fn resolve(&self, position: u32) -> GraphResult<ObjectRef> {
        self.objects.get(position as usize).cloned().ok_or_else(|| {
            corrupt(format!(
                "back-reference to position {position} but only {} objects were read",
                self.objects.len()
            ))
        })
    }

    pub(crate) fn len(&self) -> usize {
        self.objects.len()
    }

    /// Objects in allocation order.
    pub(crate) fn objects(&self) -> &[ObjectRef] {
        &self.objects
    }
}

#[cfg(test)]
#[path = "tests/reference_tests.rs"]
mod tests;
