//! Core domain types for the asset graph.
//!
//! A `Node` is a device, group, or component vertex together with the
//! relationships that were materialized alongside it by a traversal.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AssetGraphError;

/// Separator used to join a type chain into the single `label` property.
pub const LABEL_SEPARATOR: &str = "::";

/// Vertex property holding the encoded vertex id.
pub const ID_PROPERTY: &str = "id";

/// Vertex property holding the `::`-joined type chain.
pub const LABEL_PROPERTY: &str = "label";

/// Relationship label linking a component to its parent device.
pub const COMPONENT_OF: &str = "component_of";

/// Relationship label linking a group to its parent group.
pub const PARENT: &str = "parent";

/// Arbitrary property bag of a node.
pub type Attributes = serde_json::Map<String, serde_json::Value>;

/// Adjacency of a node: direction -> relationship label -> related nodes.
pub type Links = BTreeMap<Direction, BTreeMap<String, Vec<Node>>>;

// ── Category ──────────────────────────────────────────────────────

/// Coarse entity kind, always the last entry of a type chain.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Device,
    Group,
    Component,
}

impl Category {
    /// The graph label carried by every vertex of this category.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Device => "device",
            Self::Group => "group",
            Self::Component => "component",
        }
    }

    /// Classify a type chain. A chain carrying several category labels
    /// resolves as Group, then Component, then Device.
    pub fn from_types<S: AsRef<str>>(types: &[S]) -> Option<Self> {
        let has = |c: Category| types.iter().any(|t| t.as_ref() == c.label());
        [Self::Group, Self::Component, Self::Device]
            .into_iter()
            .find(|c| has(*c))
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ── Direction ─────────────────────────────────────────────────────

/// Direction of an edge relative to the entity it is viewed from.
///
/// `Out` edges originate at the entity, `In` edges originate at the other
/// entity, `Both` considers either.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    In,
    Out,
    Both,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::In => "in",
            Self::Out => "out",
            Self::Both => "both",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = AssetGraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in" => Ok(Self::In),
            "out" => Ok(Self::Out),
            "both" | "" => Ok(Self::Both),
            other => Err(AssetGraphError::UnknownDirection(other.to_string())),
        }
    }
}

// ── Node ──────────────────────────────────────────────────────────

/// A device, group, or component in the asset graph.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Node {
    /// Logical natural key (device id, group path, component id).
    pub id: String,
    /// Type chain, most specific first: `[template, category]`.
    pub types: Vec<String>,
    pub category: Category,
    #[serde(default)]
    pub attributes: Attributes,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub links: Links,
    /// Encoded graph vertex id, populated when the node was read from the graph.
    #[serde(skip)]
    pub vertex_id: Option<String>,
}

impl Node {
    /// Create a node whose type chain is `[template, category]`.
    pub fn new(id: impl Into<String>, template: impl Into<String>, category: Category) -> Self {
        Self {
            id: id.into(),
            types: vec![template.into(), category.label().to_string()],
            category,
            attributes: Attributes::new(),
            links: Links::new(),
            vertex_id: None,
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// The most specific type in the chain.
    pub fn template(&self) -> Option<&str> {
        self.types.first().map(String::as_str)
    }

    /// The type chain joined into the single `label` property form.
    pub fn type_chain(&self) -> String {
        self.types.join(LABEL_SEPARATOR)
    }

    pub fn add_link(&mut self, direction: Direction, relation: impl Into<String>, other: Node) {
        self.links
            .entry(direction)
            .or_default()
            .entry(relation.into())
            .or_default()
            .push(other);
    }

    /// Nodes linked over `relation` in `direction`, empty if none.
    pub fn linked(&self, direction: Direction, relation: &str) -> &[Node] {
        self.links
            .get(&direction)
            .and_then(|by_rel| by_rel.get(relation))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Total number of materialized links across every direction and relation.
    pub fn link_count(&self) -> usize {
        self.links
            .values()
            .flat_map(|by_rel| by_rel.values())
            .map(Vec::len)
            .sum()
    }
}

/// Split a `::`-joined type chain.
pub fn split_type_chain(label: &str) -> Vec<String> {
    label
        .split(LABEL_SEPARATOR)
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect()
}

// ── Relationship declarations ─────────────────────────────────────

/// Relationships declared on an entity for creation, grouped by direction
/// then relationship label, listing the natural keys of the other entities.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DirectionalRelations {
    #[serde(rename = "in", default, skip_serializing_if = "BTreeMap::is_empty")]
    pub incoming: BTreeMap<String, Vec<String>>,
    #[serde(rename = "out", default, skip_serializing_if = "BTreeMap::is_empty")]
    pub outgoing: BTreeMap<String, Vec<String>>,
}

impl DirectionalRelations {
    pub fn is_empty(&self) -> bool {
        self.incoming.values().all(Vec::is_empty) && self.outgoing.values().all(Vec::is_empty)
    }

    pub fn add(&mut self, direction: Direction, relation: impl Into<String>, key: impl Into<String>) {
        let map = match direction {
            Direction::In => &mut self.incoming,
            _ => &mut self.outgoing,
        };
        map.entry(relation.into()).or_default().push(key.into());
    }

    /// Flatten into `(direction, relation, key)` triples, inbound first.
    pub fn entries(&self) -> impl Iterator<Item = (Direction, &str, &str)> {
        let incoming = self.incoming.iter().flat_map(|(rel, keys)| {
            keys.iter()
                .map(move |k| (Direction::In, rel.as_str(), k.as_str()))
        });
        let outgoing = self.outgoing.iter().flat_map(|(rel, keys)| {
            keys.iter()
                .map(move |k| (Direction::Out, rel.as_str(), k.as_str()))
        });
        incoming.chain(outgoing)
    }
}
