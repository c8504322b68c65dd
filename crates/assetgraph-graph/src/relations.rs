//! Traversal fragments and operations shared by the device and group DAOs.

use serde::Deserialize;
use serde_json::Value;

use assetgraph_core::identity;
use assetgraph_core::types::{split_type_chain, Category, Direction, Node, ID_PROPERTY, LABEL_PROPERTY};
use assetgraph_core::{AssetGraphError, Attributes};

use crate::assembler::{self, NodeDto};
use crate::client::GraphError;
use crate::engine::{quote_identifier, ConnectionScope, GraphEngine, Traversal};

/// Relationship name meaning "any relationship, any template".
pub const ANY_RELATIONSHIP: &str = "*";

/// A half-open `[offset, offset + count)` window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub offset: u32,
    pub count: u32,
}

impl Page {
    pub fn new(offset: u32, count: u32) -> Self {
        Self { offset, count }
    }

    pub fn end(&self) -> u64 {
        u64::from(self.offset) + u64::from(self.count)
    }
}

/// Which related entities `list_related` should return.
#[derive(Debug, Clone, PartialEq)]
pub struct RelatedQuery {
    pub relationship: String,
    pub direction: Direction,
    pub template: Option<String>,
    /// Equality filters applied to the related entities.
    pub filter: Attributes,
    pub page: Option<Page>,
}

impl RelatedQuery {
    pub fn new(relationship: impl Into<String>, direction: Direction) -> Self {
        Self {
            relationship: relationship.into(),
            direction,
            template: None,
            filter: Attributes::new(),
            page: None,
        }
    }

    pub fn template(mut self, template: impl Into<String>) -> Self {
        self.template = Some(template.into());
        self
    }

    pub fn filter(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter.insert(key.into(), value.into());
        self
    }

    pub fn page(mut self, offset: u32, count: u32) -> Self {
        self.page = Some(Page::new(offset, count));
        self
    }
}

// ── Projection fragments ─────────────────────────────────────────

/// Stable edge id, falling back to the engine's internal id for edges not
/// created through this layer.
pub(crate) fn edge_id_expr(e: &str) -> String {
    format!("coalesce({e}.id, toString(id({e})))")
}

pub(crate) fn edge_projection(e: &str) -> String {
    format!(
        "{{id: {}, label: type({e}), inV: endNode({e}).id, outV: startNode({e}).id}}",
        edge_id_expr(e)
    )
}

pub(crate) fn path_projection(e: &str, v: &str) -> String {
    format!("{{edge: {}, vertex: {v}.id}}", edge_id_expr(e))
}

/// Remove duplicates from a list expression, keeping first occurrences.
pub(crate) fn dedup(list: &str) -> String {
    format!("reduce(acc = [], x IN {list} | CASE WHEN x IN acc THEN acc ELSE acc + [x] END)")
}

/// `(from)-[e:rel]->(to:label)` shaped for the given direction.
pub(crate) fn edge_pattern(
    direction: Direction,
    from: &str,
    edge: &str,
    rel_type: Option<&str>,
    to: &str,
    to_label: Option<&str>,
) -> Result<String, GraphError> {
    let rel = match rel_type {
        Some(r) => format!("{edge}:{}", quote_identifier(r)?),
        None => edge.to_string(),
    };
    let target = match to_label {
        Some(l) => format!("{to}:{}", quote_identifier(l)?),
        None => to.to_string(),
    };
    Ok(match direction {
        Direction::In => format!("({from})<-[{rel}]-({target})"),
        Direction::Out => format!("({from})-[{rel}]->({target})"),
        Direction::Both => format!("({from})-[{rel}]-({target})"),
    })
}

/// Node pattern matching a vertex by id under its category label, binding
/// the id to a fresh parameter.
pub(crate) fn vertex_pattern(t: &mut Traversal, var: &str, vertex_id: &str) -> Result<String, GraphError> {
    let (category, _) = identity::decode(vertex_id)?;
    let label = quote_identifier(category.label())?;
    let param = t.bind_next("vid", vertex_id);
    Ok(format!("({var}:{label} {{id: ${param}}})"))
}

/// Neo4j labels for a vertex: its type chain, ending in its category label.
pub(crate) fn vertex_labels(node: &Node, category: Category, vertex_id: &str) -> Result<String, GraphError> {
    let mut types: Vec<&str> = Vec::new();
    for t in &node.types {
        if !types.contains(&t.as_str()) {
            types.push(t);
        }
    }
    if !types.contains(&category.label()) {
        types.push(category.label());
    }
    if types.len() < 2 {
        return Err(AssetGraphError::InvalidLabels {
            id: vertex_id.to_string(),
            labels: types.iter().map(|t| t.to_string()).collect(),
        }
        .into());
    }
    let quoted = types
        .iter()
        .map(|t| quote_identifier(t))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(quoted.join(":"))
}

/// Attribute map written on create: nulls and reserved keys dropped, the
/// natural key stored under `key_property`.
pub(crate) fn creation_properties(node: &Node, key_property: &str) -> Attributes {
    let mut props: Attributes = node
        .attributes
        .iter()
        .filter(|(k, v)| !v.is_null() && !is_reserved(k))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    props.insert(key_property.to_string(), Value::String(node.id.clone()));
    props
}

pub(crate) fn is_reserved(key: &str) -> bool {
    key == ID_PROPERTY || key == LABEL_PROPERTY
}

/// Append a `CREATE` of `var` with its id, type chain, and attributes.
pub(crate) fn push_create_vertex(
    t: &mut Traversal,
    var: &str,
    vertex_id: &str,
    node: &Node,
    category: Category,
    key_property: &str,
) -> Result<(), GraphError> {
    let labels = vertex_labels(node, category, vertex_id)?;
    let id_param = t.bind_next("id", vertex_id);
    let label_param = t.bind_next("label", node.type_chain());
    let props_param = t.bind_next("props", Value::Object(creation_properties(node, key_property)));
    t.push(format!(
        "CREATE ({var}:{labels} {{{ID_PROPERTY}: ${id_param}, {LABEL_PROPERTY}: ${label_param}}})"
    ));
    t.push(format!("SET {var} += ${props_param}"));
    Ok(())
}

/// Append an edge between `var` and an existing vertex, skipped when the
/// other vertex does not exist.
pub(crate) fn push_optional_link(
    t: &mut Traversal,
    var: &str,
    direction: Direction,
    relation: &str,
    other_vertex_id: &str,
) -> Result<(), GraphError> {
    let rel = quote_identifier(relation)?;
    let other = format!("o{}", t.params().len());
    let pattern = vertex_pattern(t, &other, other_vertex_id)?;
    let edge_param = t.bind_next("eid", uuid::Uuid::new_v4().to_string());
    let create = match direction {
        Direction::In => format!("CREATE ({other})-[:{rel} {{id: ${edge_param}}}]->({var})"),
        _ => format!("CREATE ({var})-[:{rel} {{id: ${edge_param}}}]->({other})"),
    };
    t.push(format!("WITH {var}"));
    t.push(format!("OPTIONAL MATCH {pattern}"));
    t.push(format!(
        "FOREACH (_ IN CASE WHEN {other} IS NULL THEN [] ELSE [1] END | {create})"
    ));
    Ok(())
}

// ── Shared operations ────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct LabelsDto {
    #[serde(default)]
    labels: Vec<String>,
    chain: Option<String>,
}

/// Resolve the type chain of a vertex from its stored chain, falling back
/// to the engine's label list.
fn resolve_labels(vertex_id: &str, dto: LabelsDto, legacy_fallback: bool) -> Result<Vec<String>, GraphError> {
    if let Some(chain) = dto.chain.as_deref() {
        let types = split_type_chain(chain);
        if types.len() >= 2 {
            return Ok(types);
        }
    }

    let labels = if legacy_fallback && dto.labels.len() == 1 {
        split_type_chain(&dto.labels[0])
    } else {
        dto.labels
    };
    if labels.len() < 2 {
        tracing::error!(vertex_id, ?labels, "Vertex does not have correct labels");
        return Err(AssetGraphError::InvalidLabels {
            id: vertex_id.to_string(),
            labels,
        }
        .into());
    }
    Ok(labels)
}

/// Type chain of a vertex, `None` if the vertex does not exist.
pub async fn get_labels<E: GraphEngine>(
    engine: &E,
    vertex_id: &str,
    legacy_fallback: bool,
) -> Result<Option<Vec<String>>, GraphError> {
    tracing::debug!(vertex_id, "get_labels: in");

    let mut t = Traversal::read("");
    let root = vertex_pattern(&mut t, "v", vertex_id)?;
    t.push(format!("MATCH {root}"));
    t.push(format!("RETURN {{labels: labels(v), chain: v.{LABEL_PROPERTY}}} AS result"));

    let rows = ConnectionScope::run(engine, "relations.get_labels", t).await?;
    let Some(row) = rows.into_iter().next() else {
        tracing::debug!(vertex_id, "get_labels: exit: labels: none");
        return Ok(None);
    };

    let labels = resolve_labels(vertex_id, assembler::decode(row)?, legacy_fallback)?;
    tracing::debug!(vertex_id, ?labels, "get_labels: exit");
    Ok(Some(labels))
}

/// Build the traversal for `list_related`.
pub(crate) fn list_related_traversal(root_vertex_id: &str, query: &RelatedQuery) -> Result<Traversal, GraphError> {
    let mut t = Traversal::read("");
    let root = vertex_pattern(&mut t, "root", root_vertex_id)?;

    let any = query.relationship == ANY_RELATIONSHIP;
    let rel_type = (!any).then_some(query.relationship.as_str());
    let template = if any {
        None
    } else {
        query.template.as_deref().filter(|s| !s.is_empty())
    };
    let related_pattern = edge_pattern(query.direction, "root", "e", rel_type, "n", template)?;

    let mut predicates = Vec::new();
    for (key, value) in &query.filter {
        let prop = quote_identifier(key)?;
        if value.is_null() {
            predicates.push(format!("n.{prop} IS NULL"));
        } else {
            let param = t.bind_next("f", value.clone());
            predicates.push(format!("n.{prop} = ${param}"));
        }
    }
    let where_clause = if predicates.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", predicates.join(" AND "))
    };

    let slice = match query.page {
        Some(page) => {
            t.bind("offset", page.offset);
            t.bind("end", page.end());
            "[$offset..$end]".to_string()
        }
        None => String::new(),
    };

    t.push(format!("MATCH {root}"));
    t.push(format!("WITH root, [{related_pattern}{where_clause} | n] AS related"));
    t.push(format!("WITH root, {}{slice} AS page", dedup("related")));
    t.push("RETURN {");
    t.push("  object: properties(root),");
    t.push(format!("  pathsIn: [(root)<-[e]-(n) | {}],", path_projection("e", "n")));
    t.push(format!("  pathsOut: [(root)-[e]->(n) | {}],", path_projection("e", "n")));
    t.push(format!("  Es: [{related_pattern} WHERE n IN page | {}],", edge_projection("e")));
    t.push("  Vs: [n IN page | properties(n)]");
    t.push("} AS result");
    Ok(t)
}

/// The root entity with the related entities selected by `query` linked in.
///
/// `None` only when the root does not exist; an empty page still returns
/// the root.
pub async fn list_related<E: GraphEngine>(
    engine: &E,
    root_vertex_id: &str,
    query: &RelatedQuery,
) -> Result<Option<Node>, GraphError> {
    tracing::debug!(root_vertex_id, ?query, "list_related: in");

    let t = list_related_traversal(root_vertex_id, query)?;
    let rows = ConnectionScope::run(engine, "relations.list_related", t).await?;

    let Some(row) = rows.into_iter().next() else {
        tracing::debug!(root_vertex_id, "list_related: exit: node: none");
        return Ok(None);
    };
    let dto: NodeDto = assembler::decode(row)?;
    let node = assembler::assemble_projection(&dto)?;

    tracing::debug!(root_vertex_id, related = node.link_count(), "list_related: exit");
    Ok(Some(node))
}

/// Add one `relation` edge between an entity and another vertex.
///
/// `Out` makes the entity the edge's origin, `In` the other vertex.
pub async fn attach<E: GraphEngine>(
    engine: &E,
    entity_vertex_id: &str,
    relation: &str,
    direction: Direction,
    other_vertex_id: &str,
) -> Result<(), GraphError> {
    tracing::debug!(entity_vertex_id, relation, %direction, other_vertex_id, "attach: in");

    let (source, target) = endpoints(entity_vertex_id, direction, other_vertex_id)?;
    let mut t = Traversal::write("");
    let source_pattern = vertex_pattern(&mut t, "source", source)?;
    let target_pattern = vertex_pattern(&mut t, "target", target)?;
    let rel = quote_identifier(relation)?;
    t.bind("edge_id", uuid::Uuid::new_v4().to_string());
    t.push(format!("MATCH {source_pattern}, {target_pattern}"));
    t.push(format!("CREATE (source)-[:{rel} {{id: $edge_id}}]->(target)"));

    ConnectionScope::run(engine, "relations.attach", t).await?;
    tracing::debug!(entity_vertex_id, "attach: exit");
    Ok(())
}

/// Remove every `relation` edge between an entity and another vertex.
///
/// Edges are de-duplicated before dropping so accidental duplicates go in
/// one call.
pub async fn detach<E: GraphEngine>(
    engine: &E,
    entity_vertex_id: &str,
    relation: &str,
    direction: Direction,
    other_vertex_id: &str,
) -> Result<(), GraphError> {
    tracing::debug!(entity_vertex_id, relation, %direction, other_vertex_id, "detach: in");

    let (source, target) = endpoints(entity_vertex_id, direction, other_vertex_id)?;
    let mut t = Traversal::write("");
    let source_pattern = vertex_pattern(&mut t, "source", source)?;
    let target_pattern = vertex_pattern(&mut t, "target", target)?;
    let rel = quote_identifier(relation)?;
    t.push(format!("MATCH {source_pattern}-[e:{rel}]->{target_pattern}"));
    t.push("WITH DISTINCT e");
    t.push("DELETE e");

    ConnectionScope::run(engine, "relations.detach", t).await?;
    tracing::debug!(entity_vertex_id, "detach: exit");
    Ok(())
}

fn endpoints<'a>(
    entity: &'a str,
    direction: Direction,
    other: &'a str,
) -> Result<(&'a str, &'a str), GraphError> {
    match direction {
        Direction::Out => Ok((entity, other)),
        Direction::In => Ok((other, entity)),
        Direction::Both => Err(GraphError::InvalidArgument(
            "a relationship edge needs an explicit in/out direction".to_string(),
        )),
    }
}

/// Set each non-null attribute as a single value and drop null ones.
pub async fn update_vertex<E: GraphEngine>(
    engine: &E,
    vertex_id: &str,
    attributes: &Attributes,
) -> Result<(), GraphError> {
    tracing::debug!(vertex_id, ?attributes, "update_vertex: in");

    let mut t = Traversal::write("");
    let root = vertex_pattern(&mut t, "v", vertex_id)?;

    let mut sets = Vec::new();
    let mut removes = Vec::new();
    for (key, value) in attributes {
        if is_reserved(key) {
            tracing::warn!(vertex_id, key = %key, "Ignoring update of reserved property");
            continue;
        }
        let prop = quote_identifier(key)?;
        if value.is_null() {
            removes.push(format!("v.{prop}"));
        } else {
            let param = t.bind_next("p", value.clone());
            sets.push(format!("v.{prop} = ${param}"));
        }
    }

    if sets.is_empty() && removes.is_empty() {
        tracing::debug!(vertex_id, "update_vertex: exit: nothing to update");
        return Ok(());
    }

    t.push(format!("MATCH {root}"));
    if !sets.is_empty() {
        t.push(format!("SET {}", sets.join(", ")));
    }
    if !removes.is_empty() {
        t.push(format!("REMOVE {}", removes.join(", ")));
    }

    ConnectionScope::run(engine, "relations.update_vertex", t).await?;
    tracing::debug!(vertex_id, "update_vertex: exit");
    Ok(())
}

/// Remove a vertex and its incident edges. Missing vertices are not an error.
pub async fn delete_vertex<E: GraphEngine>(engine: &E, vertex_id: &str) -> Result<(), GraphError> {
    tracing::debug!(vertex_id, "delete_vertex: in");

    let mut t = Traversal::write("");
    let root = vertex_pattern(&mut t, "v", vertex_id)?;
    t.push(format!("MATCH {root}"));
    t.push("DETACH DELETE v");

    ConnectionScope::run(engine, "relations.delete_vertex", t).await?;
    tracing::debug!(vertex_id, "delete_vertex: exit");
    Ok(())
}
