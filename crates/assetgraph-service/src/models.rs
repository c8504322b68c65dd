//! Resource models exchanged with callers, and their mapping to `Node`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use assetgraph_core::types::{Category, Direction, DirectionalRelations, Node, COMPONENT_OF};
use assetgraph_core::Attributes;
use assetgraph_graph::devices::DEVICE_KEY_PROPERTY;
use assetgraph_graph::groups::{GROUP_KEY_PROPERTY, PARENT_PATH_PROPERTY, ROOT_PATH};

const DESCRIPTION: &str = "description";
const STATE: &str = "state";
const NAME: &str = "name";

/// A device, or a component of one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceItem {
    pub device_id: String,
    pub template_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Attributes::is_empty")]
    pub attributes: Attributes,
    #[serde(default, skip_serializing_if = "DirectionalRelations::is_empty")]
    pub groups: DirectionalRelations,
    #[serde(default, skip_serializing_if = "DirectionalRelations::is_empty")]
    pub devices: DirectionalRelations,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub components: Vec<DeviceItem>,
}

impl DeviceItem {
    pub fn new(device_id: impl Into<String>, template_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            template_id: template_id.into(),
            ..Self::default()
        }
    }

    pub fn to_node(&self, category: Category) -> Node {
        let mut node = Node::new(self.device_id.as_str(), self.template_id.as_str(), category);
        node.attributes = self.attributes.clone();
        put_optional(&mut node.attributes, DESCRIPTION, &self.description);
        put_optional(&mut node.attributes, STATE, &self.state);
        node
    }

    pub fn from_node(node: &Node) -> Self {
        let mut attributes = node.attributes.clone();
        attributes.remove(DEVICE_KEY_PROPERTY);
        let description = take_string(&mut attributes, DESCRIPTION);
        let state = take_string(&mut attributes, STATE);

        let components = node
            .linked(Direction::In, COMPONENT_OF)
            .iter()
            .filter(|c| c.category == Category::Component)
            .map(DeviceItem::from_node)
            .collect();

        Self {
            device_id: node.id.clone(),
            template_id: node.template().unwrap_or_default().to_string(),
            description,
            state,
            attributes,
            groups: linked_keys(node, Category::Group),
            devices: linked_keys(node, Category::Device),
            components,
        }
    }
}

/// A group in the hierarchy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupItem {
    #[serde(default)]
    pub group_path: String,
    pub template_id: String,
    #[serde(default)]
    pub parent_path: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Attributes::is_empty")]
    pub attributes: Attributes,
    #[serde(default, skip_serializing_if = "DirectionalRelations::is_empty")]
    pub groups: DirectionalRelations,
}

impl GroupItem {
    pub fn new(parent_path: impl Into<String>, name: impl Into<String>, template_id: impl Into<String>) -> Self {
        Self {
            parent_path: parent_path.into(),
            name: name.into(),
            template_id: template_id.into(),
            ..Self::default()
        }
    }

    /// The group's path, derived from its parent and name when not given.
    pub fn path(&self) -> String {
        if !self.group_path.is_empty() {
            return self.group_path.clone();
        }
        let name = self.name.to_lowercase();
        if self.parent_path.is_empty() || self.parent_path == ROOT_PATH {
            format!("{ROOT_PATH}{name}")
        } else {
            format!("{}/{name}", self.parent_path)
        }
    }

    pub fn to_node(&self) -> Node {
        let mut node = Node::new(self.path(), self.template_id.as_str(), Category::Group);
        node.attributes = self.attributes.clone();
        if !self.name.is_empty() {
            node.attributes.insert(NAME.to_string(), Value::String(self.name.clone()));
        }
        if !self.parent_path.is_empty() {
            node.attributes
                .insert(PARENT_PATH_PROPERTY.to_string(), Value::String(self.parent_path.clone()));
        }
        put_optional(&mut node.attributes, DESCRIPTION, &self.description);
        node
    }

    pub fn from_node(node: &Node) -> Self {
        let mut attributes = node.attributes.clone();
        attributes.remove(GROUP_KEY_PROPERTY);
        let name = take_string(&mut attributes, NAME).unwrap_or_default();
        let parent_path = take_string(&mut attributes, PARENT_PATH_PROPERTY).unwrap_or_default();
        let description = take_string(&mut attributes, DESCRIPTION);

        Self {
            group_path: node.id.clone(),
            template_id: node.template().unwrap_or_default().to_string(),
            parent_path,
            name,
            description,
            attributes,
            groups: linked_keys(node, Category::Group),
        }
    }
}

fn put_optional(attributes: &mut Attributes, key: &str, value: &Option<String>) {
    if let Some(v) = value {
        attributes.insert(key.to_string(), Value::String(v.clone()));
    }
}

fn take_string(attributes: &mut Attributes, key: &str) -> Option<String> {
    match attributes.remove(key) {
        Some(Value::String(s)) => Some(s),
        Some(other) if !other.is_null() => Some(other.to_string()),
        _ => None,
    }
}

/// Natural keys of linked nodes of one category, by direction and relation.
fn linked_keys(node: &Node, category: Category) -> DirectionalRelations {
    let mut relations = DirectionalRelations::default();
    for (direction, by_relation) in &node.links {
        for (relation, others) in by_relation {
            for other in others.iter().filter(|o| o.category == category) {
                relations.add(*direction, relation.as_str(), other.id.as_str());
            }
        }
    }
    relations
}

/// Every linked node of one category, across directions and relations.
pub(crate) fn linked_nodes(node: &Node, category: Category) -> impl Iterator<Item = &Node> {
    node.links
        .values()
        .flat_map(|by_relation| by_relation.values())
        .flatten()
        .filter(move |n| n.category == category)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_device_item_to_node() {
        let mut item = DeviceItem::new("vin-001", "vehicle");
        item.state = Some("active".to_string());
        item.attributes.insert("model".into(), json!("T1"));

        let node = item.to_node(Category::Device);
        assert_eq!(node.types, vec!["vehicle", "device"]);
        assert_eq!(node.attributes["state"], json!("active"));
        assert_eq!(node.attributes["model"], json!("T1"));
        assert!(!node.attributes.contains_key("description"));
    }

    #[test]
    fn test_device_item_from_node_splits_links() {
        let mut node = Node::new("vin-001", "vehicle", Category::Device)
            .with_attribute("deviceId", "vin-001")
            .with_attribute("state", "active")
            .with_attribute("model", "T1");
        node.add_link(Direction::Out, "installed_in", Node::new("/fleet", "fleet", Category::Group));
        node.add_link(Direction::In, "paired_with", Node::new("vin-002", "vehicle", Category::Device));
        node.add_link(Direction::In, COMPONENT_OF, Node::new("ecu-1", "ecu", Category::Component));

        let item = DeviceItem::from_node(&node);
        assert_eq!(item.template_id, "vehicle");
        assert_eq!(item.state.as_deref(), Some("active"));
        assert!(!item.attributes.contains_key("deviceId"));
        assert_eq!(item.groups.outgoing["installed_in"], vec!["/fleet"]);
        assert_eq!(item.devices.incoming["paired_with"], vec!["vin-002"]);
        assert!(!item.devices.incoming.contains_key(COMPONENT_OF));
        assert_eq!(item.components.len(), 1);
        assert_eq!(item.components[0].device_id, "ecu-1");
    }

    #[test]
    fn test_group_path_derivation() {
        assert_eq!(GroupItem::new("/", "Fleet", "fleet").path(), "/fleet");
        assert_eq!(GroupItem::new("/fleet", "East", "fleet").path(), "/fleet/east");
        let mut explicit = GroupItem::new("/fleet", "East", "fleet");
        explicit.group_path = "/custom".to_string();
        assert_eq!(explicit.path(), "/custom");
    }

    #[test]
    fn test_group_item_round_trip_through_node() {
        let mut item = GroupItem::new("/fleet", "East", "fleet");
        item.description = Some("east coast".to_string());
        let node = item.to_node();
        assert_eq!(node.id, "/fleet/east");
        assert_eq!(node.attributes["parentPath"], json!("/fleet"));

        let back = GroupItem::from_node(&node);
        assert_eq!(back.group_path, "/fleet/east");
        assert_eq!(back.name, "East");
        assert_eq!(back.parent_path, "/fleet");
        assert_eq!(back.description.as_deref(), Some("east coast"));
        assert!(back.attributes.is_empty());
    }

    #[test]
    fn test_device_item_json_shape() {
        let item: DeviceItem = serde_json::from_value(json!({
            "deviceId": "vin-001",
            "templateId": "vehicle",
            "groups": {"out": {"installed_in": ["/fleet"]}}
        }))
        .unwrap();
        assert_eq!(item.groups.outgoing["installed_in"], vec!["/fleet"]);
        let out = serde_json::to_value(&item).unwrap();
        assert!(out.get("components").is_none());
        assert_eq!(out["templateId"], "vehicle");
    }
}
