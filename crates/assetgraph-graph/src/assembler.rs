//! Reassembly of typed `Node`s from flat traversal projections.
//!
//! Traversals return a root vertex projection alongside the edges and
//! vertices around it, plus path pairs that say which edge reaches which
//! vertex. The shapes are resolved once into the DTOs below; everything
//! after that works on typed values.

use std::collections::{HashMap, HashSet};

use serde::Deserialize;
use serde_json::Value;

use assetgraph_core::identity;
use assetgraph_core::types::{split_type_chain, Category, Direction, Node, ID_PROPERTY, LABEL_PROPERTY};
use assetgraph_core::{AssetGraphError, Attributes};

use crate::client::GraphError;

/// Flat vertex property map as projected by a traversal.
pub type VertexProps = serde_json::Map<String, Value>;

/// Root object plus its associated edges, vertices, and correlating paths.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NodeDto {
    pub object: VertexProps,
    #[serde(default)]
    pub paths: Vec<PathDto>,
    #[serde(default, rename = "pathsIn")]
    pub paths_in: Vec<PathDto>,
    #[serde(default, rename = "pathsOut")]
    pub paths_out: Vec<PathDto>,
    #[serde(default, rename = "Es")]
    pub edges: Vec<EdgeDto>,
    #[serde(default, rename = "Vs")]
    pub vertices: Vec<VertexProps>,
}

/// One hop from the root: the edge taken and the vertex it reached.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PathDto {
    pub edge: String,
    pub vertex: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EdgeDto {
    pub id: String,
    pub label: String,
    /// Head vertex id: the vertex the edge points at.
    #[serde(rename = "inV")]
    pub in_v: String,
    /// Tail vertex id: the vertex the edge originates from.
    #[serde(rename = "outV", default)]
    pub out_v: String,
}

/// A related entity reached from `owner`, with its direction stated by the
/// projection itself.
#[derive(Debug, Clone, Deserialize)]
pub struct RelatedEntityDto {
    pub owner: String,
    pub dir: Direction,
    pub e: EdgeDto,
    #[serde(rename = "vProps")]
    pub v_props: VertexProps,
}

/// A row of a union-style traversal, discriminated by its `kind` field.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TraversalRow {
    Vertex { props: VertexProps },
    Related(RelatedEntityDto),
}

/// Parse one `result` value into a typed DTO.
pub fn decode<T: serde::de::DeserializeOwned>(value: Value) -> Result<T, GraphError> {
    serde_json::from_value(value).map_err(GraphError::from)
}

/// The engine returns properties as value lists by convention; a list of
/// exactly one value collapses to that value.
///
/// Lists of two or more values are kept whole rather than cut to their
/// first element, so genuinely multi-valued attributes are not truncated.
pub fn extract_property_value(value: &Value) -> Value {
    match value {
        Value::Array(items) if items.len() == 1 => items[0].clone(),
        other => other.clone(),
    }
}

fn string_property(props: &VertexProps, key: &str) -> Option<String> {
    match props.get(key).map(extract_property_value) {
        Some(Value::String(s)) => Some(s),
        _ => None,
    }
}

/// Build a `Node` from a vertex property map.
///
/// `id` holds the encoded vertex id and `label` the `::`-joined type chain;
/// every other key becomes an attribute.
pub fn assemble_node(props: &VertexProps) -> Result<Node, GraphError> {
    let vertex_id = string_property(props, ID_PROPERTY)
        .ok_or_else(|| GraphError::Decode("vertex projection has no id".to_string()))?;
    let (decoded_category, mut keys) = identity::decode(&vertex_id)?;
    let natural_key = keys.pop().unwrap_or_default();

    let label = string_property(props, LABEL_PROPERTY).unwrap_or_default();
    let types = split_type_chain(&label);
    if types.len() < 2 {
        return Err(AssetGraphError::InvalidLabels {
            id: vertex_id,
            labels: types,
        }
        .into());
    }

    let attributes: Attributes = props
        .iter()
        .filter(|(key, _)| key.as_str() != ID_PROPERTY && key.as_str() != LABEL_PROPERTY)
        .map(|(key, value)| (key.clone(), extract_property_value(value)))
        .collect();

    let category = Category::from_types(&types).unwrap_or(decoded_category);

    Ok(Node {
        id: natural_key,
        types,
        category,
        attributes,
        links: Default::default(),
        vertex_id: Some(vertex_id),
    })
}

/// Assemble the root of a projection together with its associations.
pub fn assemble_projection(dto: &NodeDto) -> Result<Node, GraphError> {
    let mut node = assemble_node(&dto.object)?;
    assemble_associations(&mut node, dto)?;
    Ok(node)
}

/// Fold the edges and vertices of a projection into `node.links`.
///
/// Direction comes from the edge's head: an edge pointing at the node is
/// inbound, anything else outbound. Paths whose edge or vertex is missing
/// from the accompanying lists are skipped.
pub fn assemble_associations(node: &mut Node, dto: &NodeDto) -> Result<(), GraphError> {
    let own_id = node.vertex_id.clone().unwrap_or_default();

    let edges: HashMap<&str, &EdgeDto> = dto.edges.iter().map(|e| (e.id.as_str(), e)).collect();
    let vertices: HashMap<String, &VertexProps> = dto
        .vertices
        .iter()
        .filter_map(|v| string_property(v, ID_PROPERTY).map(|id| (id, v)))
        .collect();

    let mut seen: HashSet<&str> = HashSet::new();
    let paths = dto.paths.iter().chain(&dto.paths_in).chain(&dto.paths_out);

    for path in paths {
        if !seen.insert(path.edge.as_str()) {
            continue;
        }
        let (Some(edge), Some(vertex)) = (edges.get(path.edge.as_str()), vertices.get(&path.vertex)) else {
            continue;
        };
        let direction = if edge.in_v == own_id {
            Direction::In
        } else {
            Direction::Out
        };
        let other = assemble_node(vertex)?;
        node.add_link(direction, edge.label.clone(), other);
    }

    Ok(())
}

/// Fold one related-entity row into `node.links`.
pub fn assemble_related(node: &mut Node, related: &RelatedEntityDto) -> Result<(), GraphError> {
    let other = assemble_node(&related.v_props)?;
    node.add_link(related.dir, related.e.label.clone(), other);
    Ok(())
}

/// Assemble union-style rows: vertex rows become nodes in arrival order and
/// related rows attach to the node named by their `owner`.
pub fn assemble_rows(rows: Vec<TraversalRow>) -> Result<Vec<Node>, GraphError> {
    let mut nodes: Vec<Node> = Vec::new();
    let mut related = Vec::new();

    for row in rows {
        match row {
            TraversalRow::Vertex { props } => nodes.push(assemble_node(&props)?),
            TraversalRow::Related(r) => related.push(r),
        }
    }

    for r in &related {
        match nodes
            .iter_mut()
            .find(|n| n.vertex_id.as_deref() == Some(r.owner.as_str()))
        {
            Some(owner) => assemble_related(owner, r)?,
            None => tracing::debug!(owner = %r.owner, "Related row without owner vertex, skipping"),
        }
    }

    Ok(nodes)
}
