//! Device operations over resource models.

use assetgraph_core::identity;
use assetgraph_core::types::{Category, Direction};
use assetgraph_core::Attributes;
use assetgraph_graph::{DevicesDao, GetOptions, GraphEngine, RelatedQuery};

use crate::error::{Result, ServiceError};
use crate::models::{linked_nodes, DeviceItem, GroupItem};

pub struct DevicesService<E: GraphEngine> {
    dao: DevicesDao<E>,
}

impl<E: GraphEngine> DevicesService<E> {
    pub fn new(dao: DevicesDao<E>) -> Self {
        Self { dao }
    }

    pub async fn get(&self, device_id: &str, options: &GetOptions) -> Result<Option<DeviceItem>> {
        identity::validate_key(device_id)?;
        let node = self.dao.get(device_id, options).await?;
        Ok(node.as_ref().map(DeviceItem::from_node))
    }

    pub async fn get_bulk(&self, device_ids: &[String], options: &GetOptions) -> Result<Vec<DeviceItem>> {
        for id in device_ids {
            identity::validate_key(id)?;
        }
        let nodes = self.dao.get_bulk(device_ids, options).await?;
        Ok(nodes.iter().map(DeviceItem::from_node).collect())
    }

    /// Create a device with its relationships and components. Returns the
    /// device id.
    pub async fn create(&self, item: &DeviceItem) -> Result<String> {
        tracing::debug!(device_id = %item.device_id, "DevicesService.create: in");
        validate_item(item)?;
        for component in &item.components {
            validate_item(component)?;
            identity::component_id(&item.device_id, &component.device_id)?;
        }

        let node = item.to_node(Category::Device);
        let components: Vec<_> = item
            .components
            .iter()
            .map(|c| c.to_node(Category::Component))
            .collect();
        self.dao
            .create(&node, &item.groups, &item.devices, &components)
            .await?;

        tracing::debug!(device_id = %item.device_id, "DevicesService.create: exit");
        Ok(item.device_id.clone())
    }

    /// Apply the item's attributes to an existing device. Null attribute
    /// values remove the attribute.
    pub async fn update(&self, item: &DeviceItem) -> Result<()> {
        identity::validate_key(&item.device_id)?;
        if self.dao.get_labels(&item.device_id).await?.is_none() {
            return Err(ServiceError::NotFound(format!("device {}", item.device_id)));
        }
        self.dao.update(&item.to_node(Category::Device)).await?;
        Ok(())
    }

    pub async fn delete(&self, device_id: &str) -> Result<()> {
        identity::validate_key(device_id)?;
        self.dao.delete(device_id).await?;
        Ok(())
    }

    // ── Components ────────────────────────────────────────────────

    pub async fn create_component(&self, device_id: &str, component: &DeviceItem) -> Result<String> {
        validate_item(component)?;
        identity::component_id(device_id, &component.device_id)?;
        if self.dao.get_labels(device_id).await?.is_none() {
            return Err(ServiceError::NotFound(format!("device {device_id}")));
        }
        self.dao
            .create_component(device_id, &component.to_node(Category::Component))
            .await?;
        Ok(component.device_id.clone())
    }

    pub async fn update_component(&self, device_id: &str, component: &DeviceItem) -> Result<()> {
        identity::component_id(device_id, &component.device_id)?;
        if self
            .dao
            .get_component_labels(device_id, &component.device_id)
            .await?
            .is_none()
        {
            return Err(ServiceError::NotFound(format!(
                "component {} of device {device_id}",
                component.device_id
            )));
        }
        let attributes: Attributes = component.to_node(Category::Component).attributes;
        self.dao
            .update_component(device_id, &component.device_id, &attributes)
            .await?;
        Ok(())
    }

    pub async fn delete_component(&self, device_id: &str, component_id: &str) -> Result<()> {
        identity::component_id(device_id, component_id)?;
        self.dao.delete_component(device_id, component_id).await?;
        Ok(())
    }

    // ── Relationships ─────────────────────────────────────────────

    pub async fn attach_to_group(
        &self,
        device_id: &str,
        relationship: &str,
        direction: Direction,
        group_path: &str,
    ) -> Result<()> {
        validate_relationship(relationship)?;
        self.dao
            .attach_to_group(device_id, relationship, direction, group_path)
            .await?;
        Ok(())
    }

    pub async fn detach_from_group(
        &self,
        device_id: &str,
        relationship: &str,
        direction: Direction,
        group_path: &str,
    ) -> Result<()> {
        validate_relationship(relationship)?;
        self.dao
            .detach_from_group(device_id, relationship, direction, group_path)
            .await?;
        Ok(())
    }

    pub async fn attach_to_device(
        &self,
        device_id: &str,
        relationship: &str,
        direction: Direction,
        other_device_id: &str,
    ) -> Result<()> {
        validate_relationship(relationship)?;
        self.dao
            .attach_to_device(device_id, relationship, direction, other_device_id)
            .await?;
        Ok(())
    }

    pub async fn detach_from_device(
        &self,
        device_id: &str,
        relationship: &str,
        direction: Direction,
        other_device_id: &str,
    ) -> Result<()> {
        validate_relationship(relationship)?;
        self.dao
            .detach_from_device(device_id, relationship, direction, other_device_id)
            .await?;
        Ok(())
    }

    /// Groups related to a device, `None` when the device does not exist.
    pub async fn list_related_groups(&self, device_id: &str, query: &RelatedQuery) -> Result<Option<Vec<GroupItem>>> {
        identity::validate_key(device_id)?;
        let Some(node) = self.dao.list_related(device_id, query).await? else {
            return Ok(None);
        };
        Ok(Some(linked_nodes(&node, Category::Group).map(GroupItem::from_node).collect()))
    }

    /// Devices related to a device, `None` when the device does not exist.
    pub async fn list_related_devices(&self, device_id: &str, query: &RelatedQuery) -> Result<Option<Vec<DeviceItem>>> {
        identity::validate_key(device_id)?;
        let Some(node) = self.dao.list_related(device_id, query).await? else {
            return Ok(None);
        };
        Ok(Some(linked_nodes(&node, Category::Device).map(DeviceItem::from_node).collect()))
    }
}

fn validate_item(item: &DeviceItem) -> Result<()> {
    identity::validate_key(&item.device_id)?;
    if item.template_id.is_empty() {
        return Err(ServiceError::InvalidInput(format!(
            "device {} has no template",
            item.device_id
        )));
    }
    Ok(())
}

pub(crate) fn validate_relationship(relationship: &str) -> Result<()> {
    if relationship.is_empty() {
        return Err(ServiceError::InvalidInput("relationship must not be empty".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assetgraph_graph::mock::RecordingEngine;
    use serde_json::json;

    fn service() -> (DevicesService<RecordingEngine>, RecordingEngine) {
        let engine = RecordingEngine::new();
        (DevicesService::new(DevicesDao::new(engine.clone())), engine)
    }

    #[tokio::test]
    async fn test_create_rejects_bad_keys_before_touching_graph() {
        let (service, engine) = service();

        let err = service.create(&DeviceItem::new("a___b", "vehicle")).await.unwrap_err();
        assert!(matches!(err, ServiceError::Domain(_)));

        let err = service.create(&DeviceItem::new("vin-001", "")).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput(_)));

        let mut item = DeviceItem::new("vin-001", "vehicle");
        item.components.push(DeviceItem::new("", "ecu"));
        assert!(service.create(&item).await.is_err());

        assert_eq!(engine.opened(), 0);
    }

    #[tokio::test]
    async fn test_components_need_a_parent_key_that_decodes_back() {
        let (service, engine) = service();

        let mut item = DeviceItem::new("a_", "vehicle");
        item.components.push(DeviceItem::new("b", "ecu"));
        let err = service.create(&item).await.unwrap_err();
        assert!(matches!(err, ServiceError::Domain(_)));

        let err = service
            .create_component("a_", &DeviceItem::new("b", "ecu"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Domain(_)));
        assert!(service.delete_component("a_", "b").await.is_err());

        assert_eq!(engine.opened(), 0);
    }

    #[tokio::test]
    async fn test_create_returns_device_id() {
        let (service, engine) = service();
        let mut item = DeviceItem::new("vin-001", "vehicle");
        item.components.push(DeviceItem::new("ecu-1", "ecu"));

        assert_eq!(service.create(&item).await.unwrap(), "vin-001");
        assert!(engine.last().text().contains("CREATE (c0:`ecu`:`component`"));
    }

    #[tokio::test]
    async fn test_update_missing_device_is_not_found() {
        let (service, engine) = service();
        let err = service.update(&DeviceItem::new("ghost", "vehicle")).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
        assert_eq!(engine.submitted().len(), 1);
    }

    #[tokio::test]
    async fn test_update_existing_device() {
        let (service, engine) = service();
        engine.respond(vec![json!({"labels": ["vehicle", "device"], "chain": "vehicle::device"})]);

        let mut item = DeviceItem::new("vin-001", "vehicle");
        item.state = Some("retired".to_string());
        service.update(&item).await.unwrap();

        let t = engine.last();
        assert!(t.text().contains("SET v.`state` = $p1"));
        assert_eq!(engine.closed(), 2);
    }

    #[tokio::test]
    async fn test_get_maps_to_item() {
        let (service, engine) = service();
        engine.respond(vec![json!({
            "object": {"id": "device___vin-001", "label": "vehicle::device", "deviceId": "vin-001", "state": "active"},
            "pathsOut": [{"edge": "e1", "vertex": "group___/fleet"}],
            "Es": [{"id": "e1", "label": "installed_in", "inV": "group___/fleet", "outV": "device___vin-001"}],
            "Vs": [{"id": "group___/fleet", "label": "fleet::group"}]
        })]);

        let item = service
            .get("vin-001", &GetOptions::expanded())
            .await
            .unwrap()
            .expect("device exists");
        assert_eq!(item.template_id, "vehicle");
        assert_eq!(item.state.as_deref(), Some("active"));
        assert_eq!(item.groups.outgoing["installed_in"], vec!["/fleet"]);
    }

    #[tokio::test]
    async fn test_list_related_groups() {
        let (service, engine) = service();
        engine.respond(vec![json!({
            "object": {"id": "device___vin-001", "label": "vehicle::device"},
            "Es": [
                {"id": "e1", "label": "installed_in", "inV": "group___/fleet", "outV": "device___vin-001"},
                {"id": "e2", "label": "paired_with", "inV": "device___vin-002", "outV": "device___vin-001"}
            ],
            "Vs": [
                {"id": "group___/fleet", "label": "fleet::group", "name": "Fleet"},
                {"id": "device___vin-002", "label": "vehicle::device"}
            ],
            "pathsOut": [
                {"edge": "e1", "vertex": "group___/fleet"},
                {"edge": "e2", "vertex": "device___vin-002"}
            ]
        })]);

        let query = RelatedQuery::new("*", Direction::Out);
        let groups = service
            .list_related_groups("vin-001", &query)
            .await
            .unwrap()
            .expect("device exists");
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].group_path, "/fleet");
        assert_eq!(groups[0].name, "Fleet");
    }

    #[tokio::test]
    async fn test_attach_requires_relationship() {
        let (service, engine) = service();
        let err = service
            .attach_to_group("vin-001", "", Direction::Out, "/fleet")
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput(_)));
        assert_eq!(engine.opened(), 0);
    }
}
