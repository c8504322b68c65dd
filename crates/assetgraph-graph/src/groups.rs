//! Group data access.
//!
//! Groups form a hierarchy over `parent` edges pointing from a child to its
//! parent; the root group `/` has no parent.

use serde_json::Value;

use assetgraph_core::identity;
use assetgraph_core::types::{Category, Direction, DirectionalRelations, Node, PARENT};

use crate::assembler::{self, TraversalRow};
use crate::client::GraphError;
use crate::engine::{quote_identifier, ConnectionScope, GraphEngine, Traversal};
use crate::relations::{self, RelatedQuery};

/// Attribute holding a group's natural key.
pub const GROUP_KEY_PROPERTY: &str = "groupPath";

/// Attribute naming a group's parent.
pub const PARENT_PATH_PROPERTY: &str = "parentPath";

/// Path of the root group.
pub const ROOT_PATH: &str = "/";

/// Data access for groups.
pub struct GroupsDao<E: GraphEngine> {
    engine: E,
    legacy_label_fallback: bool,
}

impl<E: GraphEngine> GroupsDao<E> {
    pub fn new(engine: E) -> Self {
        Self {
            engine,
            legacy_label_fallback: true,
        }
    }

    pub fn with_legacy_label_fallback(mut self, enabled: bool) -> Self {
        self.legacy_label_fallback = enabled;
        self
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// A group with the groups related to it over anything but `parent`.
    pub async fn get(&self, group_path: &str, include_groups: bool) -> Result<Option<Node>, GraphError> {
        let mut nodes = self.get_bulk(&[group_path.to_string()], include_groups).await?;
        Ok(if nodes.is_empty() { None } else { Some(nodes.swap_remove(0)) })
    }

    pub async fn get_bulk(&self, group_paths: &[String], include_groups: bool) -> Result<Vec<Node>, GraphError> {
        tracing::debug!(?group_paths, include_groups, "groups.get: in");

        let t = get_traversal(group_paths, include_groups)?;
        let rows = ConnectionScope::run(&self.engine, "groups.get", t).await?;
        let rows = rows
            .into_iter()
            .map(assembler::decode::<TraversalRow>)
            .collect::<Result<Vec<_>, _>>()?;
        let nodes = assembler::assemble_rows(rows)?;

        tracing::debug!(count = nodes.len(), "groups.get: exit");
        Ok(nodes)
    }

    pub async fn get_labels(&self, group_path: &str) -> Result<Option<Vec<String>>, GraphError> {
        let vertex_id = identity::group_id(group_path)?;
        relations::get_labels(&self.engine, &vertex_id, self.legacy_label_fallback).await
    }

    pub async fn list_related(&self, group_path: &str, query: &RelatedQuery) -> Result<Option<Node>, GraphError> {
        let vertex_id = identity::group_id(group_path)?;
        relations::list_related(&self.engine, &vertex_id, query).await
    }

    /// The group followed by each of its ancestors, nearest first. Empty when
    /// the group does not exist.
    pub async fn list_parent_groups(&self, group_path: &str) -> Result<Vec<Node>, GraphError> {
        tracing::debug!(group_path, "groups.list_parent_groups: in");

        let vertex_id = identity::group_id(group_path)?;
        let mut t = Traversal::read("");
        let root = relations::vertex_pattern(&mut t, "g", &vertex_id)?;
        let parent = quote_identifier(PARENT)?;
        let group = quote_identifier(Category::Group.label())?;
        t.push(format!("MATCH {root}"));
        t.push(format!("OPTIONAL MATCH p = (g)-[:{parent}*1..]->(a:{group})"));
        t.push("WITH g, a, min(length(p)) AS depth");
        t.push("ORDER BY depth");
        t.push("WITH g, collect(a) AS ancestors");
        t.push("UNWIND [g] + ancestors AS x");
        t.push("RETURN properties(x) AS result");

        let rows = ConnectionScope::run(&self.engine, "groups.list_parent_groups", t).await?;
        let nodes = rows
            .into_iter()
            .map(|row| assembler::assemble_node(&assembler::decode(row)?))
            .collect::<Result<Vec<_>, _>>()?;

        tracing::debug!(count = nodes.len(), "groups.list_parent_groups: exit");
        Ok(nodes)
    }

    /// Create a group under the group named by its `parentPath` attribute,
    /// with the declared relationships to other groups. Nothing is created
    /// when the parent does not exist. Returns the group's vertex id.
    pub async fn create(&self, group: &Node, groups: &DirectionalRelations) -> Result<String, GraphError> {
        tracing::debug!(group_path = %group.id, ?groups, "groups.create: in");

        let vertex_id = identity::group_id(&group.id)?;
        let parent_path = match group.attributes.get(PARENT_PATH_PROPERTY) {
            Some(Value::String(p)) if group.id != ROOT_PATH => Some(p.as_str()),
            _ => None,
        };

        let mut t = Traversal::write("");
        if let Some(parent_path) = parent_path {
            let parent_vid = identity::group_id(parent_path)?;
            let pattern = relations::vertex_pattern(&mut t, "parent", &parent_vid)?;
            t.push(format!("MATCH {pattern}"));
        }
        relations::push_create_vertex(&mut t, "v", &vertex_id, group, Category::Group, GROUP_KEY_PROPERTY)?;
        if parent_path.is_some() {
            let rel = quote_identifier(PARENT)?;
            let edge_param = t.bind_next("eid", uuid::Uuid::new_v4().to_string());
            t.push(format!("CREATE (v)-[:{rel} {{id: ${edge_param}}}]->(parent)"));
        }

        for (direction, relation, other_path) in groups.entries() {
            let other = identity::group_id(other_path)?;
            relations::push_optional_link(&mut t, "v", direction, relation, &other)?;
        }

        ConnectionScope::run(&self.engine, "groups.create", t).await?;

        tracing::debug!(%vertex_id, "groups.create: exit");
        Ok(vertex_id)
    }

    pub async fn update(&self, group: &Node) -> Result<(), GraphError> {
        let vertex_id = identity::group_id(&group.id)?;
        relations::update_vertex(&self.engine, &vertex_id, &group.attributes).await
    }

    pub async fn delete(&self, group_path: &str) -> Result<(), GraphError> {
        let vertex_id = identity::group_id(group_path)?;
        relations::delete_vertex(&self.engine, &vertex_id).await
    }

    /// Add a `relationship` edge from one group to another.
    pub async fn attach_to_group(
        &self,
        source_path: &str,
        relationship: &str,
        target_path: &str,
    ) -> Result<(), GraphError> {
        let source = identity::group_id(source_path)?;
        let target = identity::group_id(target_path)?;
        relations::attach(&self.engine, &source, relationship, Direction::Out, &target).await
    }

    pub async fn detach_from_group(
        &self,
        source_path: &str,
        relationship: &str,
        target_path: &str,
    ) -> Result<(), GraphError> {
        let source = identity::group_id(source_path)?;
        let target = identity::group_id(target_path)?;
        relations::detach(&self.engine, &source, relationship, Direction::Out, &target).await
    }
}

fn related_branch(direction: Direction, group: &str) -> Result<String, GraphError> {
    let pattern = relations::edge_pattern(direction, "main", "e", None, "n", Some(group))?;
    Ok(format!(
        "  WITH main\n  MATCH {pattern} WHERE type(e) <> $parent\n  RETURN {{kind: 'related', owner: main.id, dir: '{}', e: {}, vProps: properties(n)}} AS result",
        direction.as_str(),
        relations::edge_projection("e")
    ))
}

pub(crate) fn get_traversal(group_paths: &[String], include_groups: bool) -> Result<Traversal, GraphError> {
    let ids = group_paths
        .iter()
        .map(|p| identity::group_id(p).map(Value::String))
        .collect::<Result<Vec<_>, _>>()?;

    let group = Category::Group.label();
    let mut t = Traversal::read("").param("ids", ids);
    t.push(format!("MATCH (main:{}) WHERE main.id IN $ids", quote_identifier(group)?));

    let vertex_row = "{kind: 'vertex', props: properties(main)}";
    if !include_groups {
        t.push(format!("RETURN {vertex_row} AS result"));
        return Ok(t);
    }

    t.bind("parent", PARENT);
    t.push("CALL {");
    t.push(format!("  WITH main\n  RETURN {vertex_row} AS result"));
    t.push("  UNION ALL");
    t.push(related_branch(Direction::Out, group)?);
    t.push("  UNION ALL");
    t.push(related_branch(Direction::In, group)?);
    t.push("}");
    t.push("RETURN result");
    Ok(t)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::TraversalKind;
    use crate::mock::RecordingEngine;
    use serde_json::json;

    fn dao() -> (GroupsDao<RecordingEngine>, RecordingEngine) {
        let engine = RecordingEngine::new();
        (GroupsDao::new(engine.clone()), engine)
    }

    #[test]
    fn test_get_traversal_tags_rows() {
        let t = get_traversal(&["/fleet".to_string()], true).unwrap();
        let text = t.text();
        assert_eq!(t.kind(), TraversalKind::Read);
        assert!(text.contains("CALL {"));
        assert!(text.contains("(main)-[e]->(n:`group`) WHERE type(e) <> $parent"));
        assert!(text.contains("(main)<-[e]-(n:`group`) WHERE type(e) <> $parent"));
        assert!(text.contains("kind: 'related', owner: main.id, dir: 'in'"));
        assert_eq!(t.param_value("parent"), Some(&json!("parent")));
        assert_eq!(t.param_value("ids"), Some(&json!(["group___/fleet"])));
    }

    #[test]
    fn test_get_traversal_without_related_groups() {
        let t = get_traversal(&["/fleet".to_string()], false).unwrap();
        assert!(!t.text().contains("CALL"));
        assert!(t.text().ends_with("RETURN {kind: 'vertex', props: properties(main)} AS result"));
    }

    #[tokio::test]
    async fn test_get_assembles_tagged_rows() {
        let (dao, engine) = dao();
        engine.respond(vec![
            json!({"kind": "vertex", "props": {"id": "group___/fleet", "label": "fleet::group", "name": "Fleet"}}),
            json!({"kind": "related", "owner": "group___/fleet", "dir": "in",
                   "e": {"id": "e1", "label": "manages", "inV": "group___/fleet", "outV": "group___/ops"},
                   "vProps": {"id": "group___/ops", "label": "team::group"}}),
        ]);

        let node = dao.get("/fleet", true).await.unwrap().expect("group exists");
        assert_eq!(node.id, "/fleet");
        assert_eq!(node.attributes["name"], json!("Fleet"));
        assert_eq!(node.linked(Direction::In, "manages")[0].id, "/ops");
        assert_eq!(engine.closed(), 1);
    }

    #[tokio::test]
    async fn test_get_missing_group_is_none() {
        let (dao, _) = dao();
        assert!(dao.get("/ghost", true).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_create_links_parent() {
        let (dao, engine) = dao();
        let group = Node::new("/fleet/east", "fleet", Category::Group).with_attribute(PARENT_PATH_PROPERTY, "/fleet");
        let mut related = DirectionalRelations::default();
        related.add(Direction::Out, "managed_by", "/ops");

        let id = dao.create(&group, &related).await.unwrap();
        assert_eq!(id, "group___/fleet/east");

        let t = engine.last();
        let text = t.text();
        assert!(text.starts_with("MATCH (parent:`group` {id: $vid0})"));
        assert!(text.contains("CREATE (v)-[:`parent` {id: $eid"));
        assert!(text.contains("]->(parent)"));
        assert!(text.contains("CREATE (v)-[:`managed_by`"));
        assert_eq!(t.param_value("vid0"), Some(&json!("group___/fleet")));
        let props = t.params().values().find(|v| v.get(GROUP_KEY_PROPERTY).is_some()).unwrap();
        assert_eq!(props[GROUP_KEY_PROPERTY], json!("/fleet/east"));
    }

    #[tokio::test]
    async fn test_create_root_has_no_parent() {
        let (dao, engine) = dao();
        let root = Node::new(ROOT_PATH, "root", Category::Group).with_attribute(PARENT_PATH_PROPERTY, "/");
        dao.create(&root, &DirectionalRelations::default()).await.unwrap();

        let text = engine.last().text().to_string();
        assert!(text.starts_with("CREATE (v:`root`:`group`"));
        assert!(!text.contains("`parent`"));
    }

    #[tokio::test]
    async fn test_list_parent_groups_nearest_first() {
        let (dao, engine) = dao();
        engine.respond(vec![
            json!({"id": "group___/fleet/east", "label": "fleet::group"}),
            json!({"id": "group___/fleet", "label": "fleet::group"}),
            json!({"id": "group___/", "label": "root::group"}),
        ]);

        let chain = dao.list_parent_groups("/fleet/east").await.unwrap();
        let paths: Vec<&str> = chain.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(paths, vec!["/fleet/east", "/fleet", "/"]);
        assert!(engine.last().text().contains("-[:`parent`*1..]->(a:`group`)"));
    }

    #[tokio::test]
    async fn test_detach_between_groups() {
        let (dao, engine) = dao();
        dao.detach_from_group("/fleet", "managed_by", "/ops").await.unwrap();
        let t = engine.last();
        assert_eq!(t.param_value("vid0"), Some(&json!("group___/fleet")));
        assert_eq!(t.param_value("vid1"), Some(&json!("group___/ops")));
        assert!(t.text().contains("WITH DISTINCT e"));
    }
}
