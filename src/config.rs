//! Resource limits applied to every serialize/deserialize pass.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{GraphError, GraphResult};

/// Per-pass budgets. A pass that would exceed any of them fails with
/// [`GraphError::ResourceLimit`] instead of exhausting the stack or memory.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SerializerConfig {
    /// Maximum nesting of object nodes, counted along reference chains: an
    /// actor targeting an actor targeting an actor is three deep. Nesting is
    /// tracked on the heap, so the default only guards memory and never
    /// binds before `max_objects` does.
    pub max_depth: usize,
    /// Maximum number of distinct objects in one snapshot.
    pub max_objects: usize,
    /// Maximum length of a single list field.
    pub max_list_len: usize,
    /// Maximum byte length of a string, tag or byte buffer.
    pub max_blob_bytes: usize,
}

impl Default for SerializerConfig {
    fn default() -> Self {
        Self {
            max_depth: 1_000_000,
            max_objects: 1_000_000,
            max_list_len: 1_000_000,
            max_blob_bytes: 16 * 1024 * 1024,
        }
    }
}

impl SerializerConfig {
    /// Parses a config from TOML. Missing keys fall back to the defaults.
    pub fn from_toml_str(input: &str) -> GraphResult<Self> {
        let config: Self = toml::from_str(input).map_err(|err| GraphError::Config(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a TOML config file.
    pub fn load(path: impl AsRef<Path>) -> GraphResult<Self> {
        let path = path.as_ref();
        let source = fs::read_to_string(path)
            .map_err(|err| GraphError::Config(format!("reading {}: {err}", path.display())))?;
        Self::from_toml_str(&source)
    }

    pub fn validate(&self) -> GraphResult<()> {
        if self.max_depth == 0 {
            return Err(GraphError::Config("max_depth must be at least 1".to_string()));
        }
        if self.max_objects == 0 {
            return Err(GraphError::Config("max_objects must be at least 1".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
