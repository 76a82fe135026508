//! Script node tree produced by the parser

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A composite element: a keyed `{ ... }` clause, or the file root
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScriptNode {
    /// Clause key (the file name for the root)
    pub key: String,
    /// Nested clauses, in source order
    pub nodes: Vec<ScriptNode>,
    /// Keyed leaves, in source order
    pub key_values: Vec<ScriptKeyValue>,
    /// Bare list entries, in source order
    pub values: Vec<ScriptValue>,
    /// Reconstructed source text, only set for object-level depths
    pub code: Option<String>,
    /// Position among the parent's children
    #[serde(default)]
    pub index: usize,
}

/// A direct child of a [`ScriptNode`], whatever its kind
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScriptChild<'a> {
    Node(&'a ScriptNode),
    KeyValue(&'a ScriptKeyValue),
    Value(&'a ScriptValue),
}

impl ScriptChild<'_> {
    pub fn index(&self) -> usize {
        match self {
            ScriptChild::Node(n) => n.index,
            ScriptChild::KeyValue(kv) => kv.index,
            ScriptChild::Value(v) => v.index,
        }
    }
}

impl ScriptNode {
    /// Find a direct child clause by key (case-insensitive)
    pub fn find_node(&self, key: &str) -> Option<&ScriptNode> {
        self.nodes.iter().find(|n| n.key.eq_ignore_ascii_case(key))
    }

    /// Find a direct leaf by key (case-insensitive)
    pub fn find_key_value(&self, key: &str) -> Option<&ScriptKeyValue> {
        self.key_values
            .iter()
            .find(|kv| kv.key.eq_ignore_ascii_case(key))
    }

    /// Total number of direct children of all kinds
    pub fn child_count(&self) -> usize {
        self.nodes.len() + self.key_values.len() + self.values.len()
    }

    /// All direct children interleaved back into source order
    pub fn children(&self) -> Vec<ScriptChild<'_>> {
        let mut children: Vec<ScriptChild<'_>> = self
            .nodes
            .iter()
            .map(ScriptChild::Node)
            .chain(self.key_values.iter().map(ScriptChild::KeyValue))
            .chain(self.values.iter().map(ScriptChild::Value))
            .collect();
        children.sort_by_key(|c| c.index());
        children
    }

    /// Check if the node has no children at all
    pub fn is_empty(&self) -> bool {
        self.child_count() == 0
    }
}

/// A `key = value` leaf
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScriptKeyValue {
    pub key: String,
    /// Raw value text, quoted strings without their quotes
    pub value: String,
    pub code: Option<String>,
    #[serde(default)]
    pub index: usize,
}

/// A value with no key
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScriptValue {
    pub value: String,
    pub code: Option<String>,
    #[serde(default)]
    pub index: usize,
}

/// Structured parse failure, 1-based position
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("line {line}, column {column}: {message}")]
pub struct ScriptError {
    pub line: usize,
    pub column: usize,
    pub message: String,
}

impl From<crate::structure::StructureError> for ScriptError {
    fn from(e: crate::structure::StructureError) -> Self {
        Self {
            line: e.line,
            column: e.column,
            message: e.message,
        }
    }
}
