//! Device and component data access.
//!
//! Components live under their parent device's id and hang off it by a
//! `component_of` edge pointing at the device.

use serde_json::Value;

use assetgraph_core::identity;
use assetgraph_core::types::{Category, Direction, DirectionalRelations, Node, COMPONENT_OF};
use assetgraph_core::Attributes;

use crate::assembler::{self, NodeDto};
use crate::client::GraphError;
use crate::engine::{quote_identifier, ConnectionScope, GraphEngine, Traversal};
use crate::relations::{self, RelatedQuery};

/// Attribute holding a device's natural key.
pub const DEVICE_KEY_PROPERTY: &str = "deviceId";

/// Properties always projected when an attribute filter is applied.
const BASE_PROPERTIES: [&str; 4] = ["id", "label", "state", DEVICE_KEY_PROPERTY];

/// What a device read should expand.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GetOptions {
    /// Include components reached over `component_of`.
    pub expand_components: bool,
    /// Include groups and peer devices reached over any other relationship.
    pub include_groups: bool,
    /// Project only these attributes (plus the base properties) of the root.
    pub attributes: Option<Vec<String>>,
}

impl GetOptions {
    pub fn expanded() -> Self {
        Self {
            expand_components: true,
            include_groups: true,
            attributes: None,
        }
    }
}

/// Data access for devices and their components.
pub struct DevicesDao<E: GraphEngine> {
    engine: E,
    legacy_label_fallback: bool,
}

impl<E: GraphEngine> DevicesDao<E> {
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

    // ── Reads ─────────────────────────────────────────────────────

    /// A single device, `None` when it does not exist.
    pub async fn get(&self, device_id: &str, options: &GetOptions) -> Result<Option<Node>, GraphError> {
        let mut nodes = self.get_bulk(&[device_id.to_string()], options).await?;
        Ok(if nodes.is_empty() { None } else { Some(nodes.swap_remove(0)) })
    }

    /// Every device of `device_ids` that exists, in engine order.
    pub async fn get_bulk(&self, device_ids: &[String], options: &GetOptions) -> Result<Vec<Node>, GraphError> {
        tracing::debug!(?device_ids, ?options, "devices.get: in");

        let t = get_traversal(device_ids, options)?;
        let rows = ConnectionScope::run(&self.engine, "devices.get", t).await?;

        let nodes = rows
            .into_iter()
            .map(|row| {
                let dto: NodeDto = assembler::decode(row)?;
                assembler::assemble_projection(&dto)
            })
            .collect::<Result<Vec<_>, _>>()?;

        tracing::debug!(count = nodes.len(), "devices.get: exit");
        Ok(nodes)
    }

    pub async fn get_labels(&self, device_id: &str) -> Result<Option<Vec<String>>, GraphError> {
        let vertex_id = identity::device_id(device_id)?;
        relations::get_labels(&self.engine, &vertex_id, self.legacy_label_fallback).await
    }

    pub async fn get_component_labels(
        &self,
        device_id: &str,
        component_id: &str,
    ) -> Result<Option<Vec<String>>, GraphError> {
        let vertex_id = identity::component_id(device_id, component_id)?;
        relations::get_labels(&self.engine, &vertex_id, self.legacy_label_fallback).await
    }

    pub async fn list_related(&self, device_id: &str, query: &RelatedQuery) -> Result<Option<Node>, GraphError> {
        let vertex_id = identity::device_id(device_id)?;
        relations::list_related(&self.engine, &vertex_id, query).await
    }

    // ── Writes ────────────────────────────────────────────────────

    /// Create a device with its relationships and nested components in one
    /// traversal. Relationships to entities that do not exist are skipped.
    /// Returns the device's vertex id.
    pub async fn create(
        &self,
        device: &Node,
        groups: &DirectionalRelations,
        devices: &DirectionalRelations,
        components: &[Node],
    ) -> Result<String, GraphError> {
        tracing::debug!(device_id = %device.id, ?groups, ?devices, components = components.len(), "devices.create: in");

        let vertex_id = identity::device_id(&device.id)?;
        let mut t = Traversal::write("");
        relations::push_create_vertex(&mut t, "v", &vertex_id, device, Category::Device, DEVICE_KEY_PROPERTY)?;

        for (i, component) in components.iter().enumerate() {
            let var = format!("c{i}");
            let component_vid = identity::component_id(&device.id, &component.id)?;
            relations::push_create_vertex(
                &mut t,
                &var,
                &component_vid,
                component,
                Category::Component,
                DEVICE_KEY_PROPERTY,
            )?;
            push_component_edge(&mut t, &var, "v")?;
        }

        for (direction, relation, group_path) in groups.entries() {
            let other = identity::group_id(group_path)?;
            relations::push_optional_link(&mut t, "v", direction, relation, &other)?;
        }
        for (direction, relation, other_device) in devices.entries() {
            let other = identity::device_id(other_device)?;
            relations::push_optional_link(&mut t, "v", direction, relation, &other)?;
        }

        ConnectionScope::run(&self.engine, "devices.create", t).await?;

        tracing::debug!(%vertex_id, "devices.create: exit");
        Ok(vertex_id)
    }

    /// Add a component to an existing device. Nothing is created when the
    /// device does not exist. Returns the component's vertex id.
    pub async fn create_component(&self, device_id: &str, component: &Node) -> Result<String, GraphError> {
        tracing::debug!(device_id, component_id = %component.id, "devices.create_component: in");

        let device_vid = identity::device_id(device_id)?;
        let component_vid = identity::component_id(device_id, &component.id)?;

        let mut t = Traversal::write("");
        let device_pattern = relations::vertex_pattern(&mut t, "d", &device_vid)?;
        t.push(format!("MATCH {device_pattern}"));
        relations::push_create_vertex(
            &mut t,
            "c",
            &component_vid,
            component,
            Category::Component,
            DEVICE_KEY_PROPERTY,
        )?;
        push_component_edge(&mut t, "c", "d")?;

        ConnectionScope::run(&self.engine, "devices.create_component", t).await?;

        tracing::debug!(%component_vid, "devices.create_component: exit");
        Ok(component_vid)
    }

    pub async fn update(&self, device: &Node) -> Result<(), GraphError> {
        let vertex_id = identity::device_id(&device.id)?;
        relations::update_vertex(&self.engine, &vertex_id, &device.attributes).await
    }

    pub async fn update_component(
        &self,
        device_id: &str,
        component_id: &str,
        attributes: &Attributes,
    ) -> Result<(), GraphError> {
        let vertex_id = identity::component_id(device_id, component_id)?;
        relations::update_vertex(&self.engine, &vertex_id, attributes).await
    }

    /// Remove a device and its components.
    pub async fn delete(&self, device_id: &str) -> Result<(), GraphError> {
        tracing::debug!(device_id, "devices.delete: in");

        let vertex_id = identity::device_id(device_id)?;
        let mut t = Traversal::write("");
        let root = relations::vertex_pattern(&mut t, "v", &vertex_id)?;
        let component_of = quote_identifier(COMPONENT_OF)?;
        t.push(format!("MATCH {root}"));
        t.push(format!("OPTIONAL MATCH (c:`component`)-[:{component_of}]->(v)"));
        t.push("DETACH DELETE c, v");

        ConnectionScope::run(&self.engine, "devices.delete", t).await?;
        tracing::debug!(device_id, "devices.delete: exit");
        Ok(())
    }

    pub async fn delete_component(&self, device_id: &str, component_id: &str) -> Result<(), GraphError> {
        let vertex_id = identity::component_id(device_id, component_id)?;
        relations::delete_vertex(&self.engine, &vertex_id).await
    }

    // ── Relationships ─────────────────────────────────────────────

    pub async fn attach_to_group(
        &self,
        device_id: &str,
        relationship: &str,
        direction: Direction,
        group_path: &str,
    ) -> Result<(), GraphError> {
        let device = identity::device_id(device_id)?;
        let group = identity::group_id(group_path)?;
        relations::attach(&self.engine, &device, relationship, direction, &group).await
    }

    pub async fn detach_from_group(
        &self,
        device_id: &str,
        relationship: &str,
        direction: Direction,
        group_path: &str,
    ) -> Result<(), GraphError> {
        let device = identity::device_id(device_id)?;
        let group = identity::group_id(group_path)?;
        relations::detach(&self.engine, &device, relationship, direction, &group).await
    }

    pub async fn attach_to_device(
        &self,
        device_id: &str,
        relationship: &str,
        direction: Direction,
        other_device_id: &str,
    ) -> Result<(), GraphError> {
        let device = identity::device_id(device_id)?;
        let other = identity::device_id(other_device_id)?;
        relations::attach(&self.engine, &device, relationship, direction, &other).await
    }

    pub async fn detach_from_device(
        &self,
        device_id: &str,
        relationship: &str,
        direction: Direction,
        other_device_id: &str,
    ) -> Result<(), GraphError> {
        let device = identity::device_id(device_id)?;
        let other = identity::device_id(other_device_id)?;
        relations::detach(&self.engine, &device, relationship, direction, &other).await
    }
}

fn push_component_edge(t: &mut Traversal, component_var: &str, device_var: &str) -> Result<(), GraphError> {
    let rel = quote_identifier(COMPONENT_OF)?;
    let edge_param = t.bind_next("eid", uuid::Uuid::new_v4().to_string());
    t.push(format!(
        "CREATE ({component_var})-[:{rel} {{id: ${edge_param}}}]->({device_var})"
    ));
    Ok(())
}

/// Root projection, optionally narrowed to the requested attributes.
fn object_projection(options: &GetOptions) -> Result<String, GraphError> {
    let Some(attributes) = &options.attributes else {
        return Ok("properties(v)".to_string());
    };
    let mut keys: Vec<&str> = BASE_PROPERTIES.to_vec();
    for a in attributes {
        if !keys.contains(&a.as_str()) {
            keys.push(a);
        }
    }
    let fields = keys
        .iter()
        .map(|k| quote_identifier(k).map(|q| format!(".{q}")))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(format!("v {{{}}}", fields.join(", ")))
}

pub(crate) fn get_traversal(device_ids: &[String], options: &GetOptions) -> Result<Traversal, GraphError> {
    let ids = device_ids
        .iter()
        .map(|d| identity::device_id(d).map(Value::String))
        .collect::<Result<Vec<_>, _>>()?;

    let mut t = Traversal::read("").param("ids", ids);
    let device = quote_identifier(Category::Device.label())?;
    let object = object_projection(options)?;
    t.push(format!("MATCH (v:{device}) WHERE v.id IN $ids"));

    if !options.expand_components && !options.include_groups {
        t.push(format!("RETURN {{object: {object}}} AS result"));
        return Ok(t);
    }

    let predicate = match (options.expand_components, options.include_groups) {
        (true, true) => String::new(),
        (true, false) => {
            t.bind("component_of", COMPONENT_OF);
            " WHERE type(e) = $component_of".to_string()
        }
        _ => {
            t.bind("component_of", COMPONENT_OF);
            " WHERE type(e) <> $component_of".to_string()
        }
    };

    t.push("RETURN {");
    t.push(format!("  object: {object},"));
    t.push(format!(
        "  pathsIn: [(v)<-[e]-(n){predicate} | {}],",
        relations::path_projection("e", "n")
    ));
    t.push(format!(
        "  pathsOut: [(v)-[e]->(n){predicate} | {}],",
        relations::path_projection("e", "n")
    ));
    t.push(format!("  Es: [(v)-[e]-(n){predicate} | {}],", relations::edge_projection("e")));
    t.push(format!("  Vs: [(v)-[e]-(n){predicate} | properties(n)]"));
    t.push("} AS result");
    Ok(t)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::TraversalKind;
    use crate::mock::RecordingEngine;
    use serde_json::json;

    fn dao() -> (DevicesDao<RecordingEngine>, RecordingEngine) {
        let engine = RecordingEngine::new();
        (DevicesDao::new(engine.clone()), engine)
    }

    fn vehicle() -> Node {
        Node::new("vin-001", "vehicle", Category::Device)
            .with_attribute("state", "active")
            .with_attribute("model", "T1")
    }

    #[test]
    fn test_get_traversal_without_expansion_projects_properties_only() {
        let t = get_traversal(&["vin-001".to_string()], &GetOptions::default()).unwrap();
        assert_eq!(t.kind(), TraversalKind::Read);
        assert!(t.text().contains("RETURN {object: properties(v)} AS result"));
        assert!(!t.text().contains("pathsIn"));
        assert_eq!(t.param_value("ids"), Some(&json!(["device___vin-001"])));
    }

    #[test]
    fn test_get_traversal_relationship_gating() {
        let ids = ["vin-001".to_string()];

        let all = get_traversal(&ids, &GetOptions::expanded()).unwrap();
        assert!(!all.text().contains("WHERE type(e)"));

        let components = GetOptions {
            expand_components: true,
            ..GetOptions::default()
        };
        let t = get_traversal(&ids, &components).unwrap();
        assert!(t.text().contains("(v)<-[e]-(n) WHERE type(e) = $component_of"));

        let groups = GetOptions {
            include_groups: true,
            ..GetOptions::default()
        };
        let t = get_traversal(&ids, &groups).unwrap();
        assert!(t.text().contains("(v)-[e]-(n) WHERE type(e) <> $component_of"));
        assert_eq!(t.param_value("component_of"), Some(&json!("component_of")));
    }

    #[test]
    fn test_attribute_filter_projection() {
        let options = GetOptions {
            attributes: Some(vec!["model".to_string(), "state".to_string()]),
            ..GetOptions::default()
        };
        let t = get_traversal(&["vin-001".to_string()], &options).unwrap();
        assert!(t
            .text()
            .contains("object: v {.`id`, .`label`, .`state`, .`deviceId`, .`model`}"));
    }

    #[test]
    fn test_get_rejects_malformed_key() {
        let err = get_traversal(&["a___b".to_string()], &GetOptions::default()).unwrap_err();
        assert!(matches!(err, GraphError::Domain(_)));
    }

    #[tokio::test]
    async fn test_get_assembles_device_with_components() {
        let (dao, engine) = dao();
        engine.respond(vec![json!({
            "object": {"id": "device___vin-001", "label": "vehicle::device", "deviceId": "vin-001"},
            "pathsIn": [{"edge": "e1", "vertex": "device___vin-001___ecu-1"}],
            "pathsOut": [],
            "Es": [{"id": "e1", "label": "component_of", "inV": "device___vin-001", "outV": "device___vin-001___ecu-1"}],
            "Vs": [{"id": "device___vin-001___ecu-1", "label": "ecu::component", "deviceId": "ecu-1"}]
        })]);

        let node = dao
            .get("vin-001", &GetOptions { expand_components: true, ..GetOptions::default() })
            .await
            .unwrap()
            .expect("device exists");

        assert_eq!(node.id, "vin-001");
        let components = node.linked(Direction::In, COMPONENT_OF);
        assert_eq!(components.len(), 1);
        assert_eq!(components[0].category, Category::Component);
        assert_eq!(engine.closed(), 1);
    }

    #[tokio::test]
    async fn test_get_missing_device_is_none() {
        let (dao, engine) = dao();
        assert!(dao.get("ghost", &GetOptions::default()).await.unwrap().is_none());
        assert_eq!(engine.opened(), 1);
        assert_eq!(engine.closed(), 1);
    }

    #[tokio::test]
    async fn test_engine_failure_propagates_and_releases() {
        let (dao, engine) = dao();
        engine.fail("connection reset");
        let err = dao.get("vin-001", &GetOptions::default()).await.unwrap_err();
        assert!(matches!(err, GraphError::Engine(_)));
        assert_eq!(engine.closed(), 1);
    }

    #[tokio::test]
    async fn test_create_builds_single_traversal() {
        let (dao, engine) = dao();

        let mut groups = DirectionalRelations::default();
        groups.add(Direction::Out, "installed_in", "/fleet/east");
        let mut devices = DirectionalRelations::default();
        devices.add(Direction::In, "paired_with", "vin-002");
        let components = vec![Node::new("ecu-1", "ecu", Category::Component).with_attribute("serial", "S1")];

        let id = dao.create(&vehicle(), &groups, &devices, &components).await.unwrap();
        assert_eq!(id, "device___vin-001");

        let submitted = engine.submitted();
        assert_eq!(submitted.len(), 1);
        let t = &submitted[0];
        let text = t.text();
        assert_eq!(t.kind(), TraversalKind::Write);
        assert!(text.starts_with("CREATE (v:`vehicle`:`device` {id: $id0, label: $label1})"));
        assert!(text.contains("CREATE (c0:`ecu`:`component`"));
        assert!(text.contains("CREATE (c0)-[:`component_of` {id: $eid"));
        assert!(text.contains("OPTIONAL MATCH (o"));
        assert!(text.contains("CREATE (v)-[:`installed_in`"));
        assert!(text.contains("]->(v))"));

        assert_eq!(t.param_value("label1"), Some(&json!("vehicle::device")));
        let props = t.param_value("props2").unwrap();
        assert_eq!(props["deviceId"], json!("vin-001"));
        assert_eq!(props["model"], json!("T1"));
        assert!(t.params().values().any(|v| v == &json!("device___vin-001___ecu-1")));
        assert!(t.params().values().any(|v| v == &json!("group___/fleet/east")));
        assert!(t.params().values().any(|v| v == &json!("device___vin-002")));
    }

    #[tokio::test]
    async fn test_create_component_matches_parent() {
        let (dao, engine) = dao();
        let component = Node::new("ecu-2", "ecu", Category::Component);

        let id = dao.create_component("vin-001", &component).await.unwrap();
        assert_eq!(id, "device___vin-001___ecu-2");

        let text = engine.last().text().to_string();
        assert!(text.starts_with("MATCH (d:`device` {id: $vid0})"));
        assert!(text.contains("CREATE (c)-[:`component_of`"));
        assert!(text.contains("]->(d)"));
    }

    #[tokio::test]
    async fn test_update_component_targets_nested_id() {
        let (dao, engine) = dao();
        let mut attrs = Attributes::new();
        attrs.insert("firmware".into(), json!("2.1"));
        dao.update_component("vin-001", "ecu-1", &attrs).await.unwrap();

        let t = engine.last();
        assert!(t.text().contains("MATCH (v:`component` {id: $vid0})"));
        assert_eq!(t.param_value("vid0"), Some(&json!("device___vin-001___ecu-1")));
    }

    #[tokio::test]
    async fn test_delete_removes_components() {
        let (dao, engine) = dao();
        dao.delete("vin-001").await.unwrap();
        let text = engine.last().text().to_string();
        assert!(text.contains("OPTIONAL MATCH (c:`component`)-[:`component_of`]->(v)"));
        assert!(text.ends_with("DETACH DELETE c, v"));
    }

    #[tokio::test]
    async fn test_attach_to_group_out() {
        let (dao, engine) = dao();
        dao.attach_to_group("vin-001", "installed_in", Direction::Out, "/fleet")
            .await
            .unwrap();
        let t = engine.last();
        assert_eq!(t.param_value("vid0"), Some(&json!("device___vin-001")));
        assert_eq!(t.param_value("vid1"), Some(&json!("group___/fleet")));
    }

    #[tokio::test]
    async fn test_get_labels_of_legacy_device() {
        let (dao, engine) = dao();
        engine.respond(vec![json!({"labels": ["vehicle::device"], "chain": null})]);
        assert_eq!(
            dao.get_labels("vin-001").await.unwrap(),
            Some(vec!["vehicle".to_string(), "device".to_string()])
        );

        let strict = DevicesDao::new(engine.clone()).with_legacy_label_fallback(false);
        engine.respond(vec![json!({"labels": ["vehicle::device"], "chain": null})]);
        assert!(strict.get_labels("vin-001").await.unwrap_err().is_invalid_labels());
    }
}
