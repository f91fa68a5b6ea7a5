//! Data models for decoded vector graphs.
//!
//! These types represent a graph as it comes off the wire: an edge list plus
//! typed attribute columns, each bound to either the vertex or the edge side
//! of the graph.

use serde::{Deserialize, Serialize};
use std::fmt;

/// 2D vertex position `[x, y]`.
pub type Position = [f64; 2];

/// Which side of the graph an attribute column describes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeTarget {
    Vertex,
    Edge,
}

impl AttributeTarget {
    /// Wire value of the target enum.
    pub fn as_wire(&self) -> u64 {
        match self {
            AttributeTarget::Vertex => 0,
            AttributeTarget::Edge => 1,
        }
    }

    /// Dataframe partition name used by the session for this target.
    pub fn partition(&self) -> &'static str {
        match self {
            AttributeTarget::Vertex => "point",
            AttributeTarget::Edge => "edge",
        }
    }
}

impl fmt::Display for AttributeTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeTarget::Vertex => write!(f, "vertex"),
            AttributeTarget::Edge => write!(f, "edge"),
        }
    }
}

/// Column payload. Every integer and floating group widens to `f64`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Values {
    Number(Vec<f64>),
    Text(Vec<String>),
    Bool(Vec<bool>),
}

impl Values {
    pub fn len(&self) -> usize {
        match self {
            Values::Number(v) => v.len(),
            Values::Text(v) => v.len(),
            Values::Bool(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Native type of the values, judged from the first element.
    pub fn native_type(&self) -> SemanticType {
        match self {
            Values::Number(_) => SemanticType::Number,
            Values::Text(_) => SemanticType::String,
            Values::Bool(_) => SemanticType::Boolean,
        }
    }

    pub fn as_numbers(&self) -> Option<&[f64]> {
        match self {
            Values::Number(v) => Some(v),
            _ => None,
        }
    }
}

/// Semantic type of an attribute column after inference.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SemanticType {
    Number,
    String,
    Date,
    Color,
    /// Native type of boolean columns; no channel accepts it.
    Boolean,
}

impl SemanticType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SemanticType::Number => "number",
            SemanticType::String => "string",
            SemanticType::Date => "date",
            SemanticType::Color => "color",
            SemanticType::Boolean => "boolean",
        }
    }
}

impl fmt::Display for SemanticType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A raw typed column as carried by the wire message.
#[derive(Clone, Debug, PartialEq)]
pub struct RawColumn {
    pub name: String,
    pub target: AttributeTarget,
    pub values: Values,
}

impl RawColumn {
    pub fn new(name: impl Into<String>, target: AttributeTarget, values: Values) -> Self {
        Self {
            name: name.into(),
            target,
            values,
        }
    }
}

/// Column groups of a vector graph, one per wire vector type.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ColumnGroups {
    pub string: Vec<RawColumn>,
    pub uint32: Vec<RawColumn>,
    pub int32: Vec<RawColumn>,
    pub int64: Vec<RawColumn>,
    pub float: Vec<RawColumn>,
    pub double: Vec<RawColumn>,
    pub bool: Vec<RawColumn>,
}

impl ColumnGroups {
    /// Groups understood by version 0 messages, in load order.
    pub fn v0(&self) -> impl Iterator<Item = &RawColumn> {
        self.string
            .iter()
            .chain(&self.uint32)
            .chain(&self.int32)
            .chain(&self.double)
    }

    /// All groups, in version 1 load order.
    pub fn v1(&self) -> impl Iterator<Item = &RawColumn> {
        self.uint32
            .iter()
            .chain(&self.int32)
            .chain(&self.int64)
            .chain(&self.float)
            .chain(&self.double)
            .chain(&self.string)
            .chain(&self.bool)
    }
}

/// A decoded vector graph message.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct VectorGraph {
    pub version: u32,
    pub name: String,
    /// Directed/undirected flag carried on the wire; informational only.
    pub graph_type: u32,
    pub vertex_count: u32,
    pub edge_count: u32,
    pub edges: Vec<(u32, u32)>,
    pub columns: ColumnGroups,
}

/// An attribute column after type inference.
#[derive(Clone, Debug, PartialEq)]
pub struct AttributeColumn {
    pub name: String,
    pub target: AttributeTarget,
    pub inferred_type: SemanticType,
    pub values: Values,
}

impl AttributeColumn {
    pub fn numbers(&self) -> Option<&[f64]> {
        self.values.as_numbers()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_native_type() {
        assert_eq!(Values::Number(vec![1.0]).native_type(), SemanticType::Number);
        assert_eq!(
            Values::Text(vec!["a".into()]).native_type(),
            SemanticType::String
        );
        assert_eq!(Values::Bool(vec![true]).native_type(), SemanticType::Boolean);
    }

    #[test]
    fn test_v0_groups_skip_v1_only_vectors() {
        let groups = ColumnGroups {
            string: vec![RawColumn::new(
                "label",
                AttributeTarget::Vertex,
                Values::Text(vec!["a".into()]),
            )],
            int64: vec![RawColumn::new("big", AttributeTarget::Vertex, Values::Number(vec![1.0]))],
            ..Default::default()
        };

        let v0: Vec<_> = groups.v0().map(|c| c.name.as_str()).collect();
        assert_eq!(v0, vec!["label"]);

        let v1: Vec<_> = groups.v1().map(|c| c.name.as_str()).collect();
        assert_eq!(v1, vec!["big", "label"]);
    }

    #[test]
    fn test_partition_names() {
        assert_eq!(AttributeTarget::Vertex.partition(), "point");
        assert_eq!(AttributeTarget::Edge.partition(), "edge");
    }
}
