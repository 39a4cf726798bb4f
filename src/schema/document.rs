//! Resolved schema document model
//!
//! A resolved schema is a tree of `SchemaNode`s in which every `$ref` object
//! has been replaced by a `Ref` link to the target document's cell. Links
//! are `Arc`s: a diamond (two branches referencing the same id) shares one
//! resolved instance, and a cycle is a back-edge to an ancestor cell rather
//! than an infinite expansion.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use serde_json::Value;

use super::error::SchemaError;

/// A resolved document shared by every location that referenced it.
pub type SharedSchema = Arc<SchemaCell>;

/// A resolved document: its registry id plus a body filled in exactly once
/// during the link phase.
pub struct SchemaCell {
    id: String,
    body: OnceLock<SchemaNode>,
}

impl SchemaCell {
    pub(crate) fn new(id: impl Into<String>) -> SharedSchema {
        Arc::new(Self {
            id: id.into(),
            body: OnceLock::new(),
        })
    }

    /// Install the linked body. The resolver links each document once.
    pub(crate) fn fill(&self, body: SchemaNode) {
        let _ = self.body.set(body);
    }

    /// The id this document was registered under.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The resolved body. Cells handed out by the resolver are always
    /// filled before they escape the link phase.
    pub fn body(&self) -> &SchemaNode {
        self.body.get().expect("schema cell read before link phase")
    }

    /// Flatten this document into a `serde_json::Value`.
    ///
    /// Fails with [`SchemaError::CyclicDocument`] when the document
    /// participates in a reference cycle, which has no finite JSON form.
    pub fn to_value(&self) -> Result<Value, SchemaError> {
        let mut active = vec![self.id.clone()];
        self.body().flatten(&mut active)
    }
}

// Cells can link back to themselves, so Debug stays shallow.
impl fmt::Debug for SchemaCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaCell")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

/// One node of a resolved schema tree.
#[derive(Debug, Clone)]
pub enum SchemaNode {
    Null,
    Bool(bool),
    Number(serde_json::Number),
    String(String),
    Array(Vec<SchemaNode>),
    Object(BTreeMap<String, SchemaNode>),
    /// A spliced link to another resolved document.
    Ref(SharedSchema),
}

impl SchemaNode {
    /// Object member lookup. A `Ref` is transparent: looking up a key on a
    /// spliced link reads the referenced document's body.
    pub fn get(&self, key: &str) -> Option<&SchemaNode> {
        match self {
            SchemaNode::Object(members) => members.get(key),
            SchemaNode::Ref(cell) => cell.body().get(key),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            SchemaNode::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[SchemaNode]> {
        match self {
            SchemaNode::Array(items) => Some(items),
            _ => None,
        }
    }

    /// The spliced document behind this node, when it is a link.
    pub fn as_link(&self) -> Option<&SharedSchema> {
        match self {
            SchemaNode::Ref(cell) => Some(cell),
            _ => None,
        }
    }

    /// Flatten into a `serde_json::Value`, inlining every spliced document.
    /// Fails on cyclic graphs.
    pub fn to_value(&self) -> Result<Value, SchemaError> {
        let mut active = Vec::new();
        self.flatten(&mut active)
    }

    fn flatten(&self, active: &mut Vec<String>) -> Result<Value, SchemaError> {
        match self {
            SchemaNode::Null => Ok(Value::Null),
            SchemaNode::Bool(b) => Ok(Value::Bool(*b)),
            SchemaNode::Number(n) => Ok(Value::Number(n.clone())),
            SchemaNode::String(s) => Ok(Value::String(s.clone())),
            SchemaNode::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(item.flatten(active)?);
                }
                Ok(Value::Array(out))
            }
            SchemaNode::Object(members) => {
                let mut out = serde_json::Map::new();
                for (key, value) in members {
                    out.insert(key.clone(), value.flatten(active)?);
                }
                Ok(Value::Object(out))
            }
            SchemaNode::Ref(cell) => {
                if active.iter().any(|id| id == cell.id()) {
                    return Err(SchemaError::CyclicDocument {
                        id: cell.id().to_string(),
                    });
                }
                active.push(cell.id().to_string());
                let value = cell.body().flatten(active)?;
                active.pop();
                Ok(value)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn leaf(s: &str) -> SchemaNode {
        SchemaNode::String(s.to_string())
    }

    #[test]
    fn get_reads_through_links() {
        let target = SchemaCell::new("T");
        target.fill(SchemaNode::Object(BTreeMap::from([(
            "id".to_string(),
            leaf("T"),
        )])));

        let root = SchemaNode::Object(BTreeMap::from([(
            "child".to_string(),
            SchemaNode::Ref(Arc::clone(&target)),
        )]));

        let id = root.get("child").and_then(|c| c.get("id")).unwrap();
        assert_eq!(id.as_str(), Some("T"));
    }

    #[test]
    fn flatten_inlines_links() {
        let target = SchemaCell::new("T");
        target.fill(SchemaNode::Object(BTreeMap::from([(
            "value".to_string(),
            SchemaNode::Bool(true),
        )])));

        let root = SchemaNode::Object(BTreeMap::from([(
            "child".to_string(),
            SchemaNode::Ref(target),
        )]));

        assert_eq!(root.to_value().unwrap(), json!({"child": {"value": true}}));
    }

    #[test]
    fn flatten_rejects_cycles() {
        let cell = SchemaCell::new("Loop");
        cell.fill(SchemaNode::Object(BTreeMap::from([(
            "again".to_string(),
            SchemaNode::Ref(Arc::clone(&cell)),
        )])));

        let err = cell.to_value().unwrap_err();
        assert!(matches!(err, SchemaError::CyclicDocument { id } if id == "Loop"));
    }
}
