//! Group operations over resource models.

use assetgraph_core::identity;
use assetgraph_core::types::Category;
use assetgraph_graph::{GraphEngine, GroupsDao, RelatedQuery};

use crate::devices::validate_relationship;
use crate::error::{Result, ServiceError};
use crate::models::{linked_nodes, DeviceItem, GroupItem};

pub struct GroupsService<E: GraphEngine> {
    dao: GroupsDao<E>,
}

impl<E: GraphEngine> GroupsService<E> {
    pub fn new(dao: GroupsDao<E>) -> Self {
        Self { dao }
    }

    pub async fn get(&self, group_path: &str) -> Result<Option<GroupItem>> {
        identity::validate_key(group_path)?;
        let node = self.dao.get(group_path, true).await?;
        Ok(node.as_ref().map(GroupItem::from_node))
    }

    pub async fn get_bulk(&self, group_paths: &[String]) -> Result<Vec<GroupItem>> {
        for path in group_paths {
            identity::validate_key(path)?;
        }
        let nodes = self.dao.get_bulk(group_paths, true).await?;
        Ok(nodes.iter().map(GroupItem::from_node).collect())
    }

    /// Create a group beneath its parent. Returns the group path.
    pub async fn create(&self, item: &GroupItem) -> Result<String> {
        let path = item.path();
        tracing::debug!(group_path = %path, "GroupsService.create: in");

        identity::validate_key(&path)?;
        if item.template_id.is_empty() {
            return Err(ServiceError::InvalidInput(format!("group {path} has no template")));
        }
        if !item.parent_path.is_empty() && self.dao.get_labels(&item.parent_path).await?.is_none() {
            return Err(ServiceError::NotFound(format!("parent group {}", item.parent_path)));
        }

        self.dao.create(&item.to_node(), &item.groups).await?;

        tracing::debug!(group_path = %path, "GroupsService.create: exit");
        Ok(path)
    }

    pub async fn update(&self, item: &GroupItem) -> Result<()> {
        let path = item.path();
        identity::validate_key(&path)?;
        if self.dao.get_labels(&path).await?.is_none() {
            return Err(ServiceError::NotFound(format!("group {path}")));
        }
        self.dao.update(&item.to_node()).await?;
        Ok(())
    }

    pub async fn delete(&self, group_path: &str) -> Result<()> {
        identity::validate_key(group_path)?;
        self.dao.delete(group_path).await?;
        Ok(())
    }

    pub async fn attach_to_group(&self, source_path: &str, relationship: &str, target_path: &str) -> Result<()> {
        validate_relationship(relationship)?;
        self.dao.attach_to_group(source_path, relationship, target_path).await?;
        Ok(())
    }

    pub async fn detach_from_group(&self, source_path: &str, relationship: &str, target_path: &str) -> Result<()> {
        validate_relationship(relationship)?;
        self.dao.detach_from_group(source_path, relationship, target_path).await?;
        Ok(())
    }

    /// The group and its ancestors, nearest first.
    pub async fn list_parent_groups(&self, group_path: &str) -> Result<Vec<GroupItem>> {
        identity::validate_key(group_path)?;
        let nodes = self.dao.list_parent_groups(group_path).await?;
        Ok(nodes.iter().map(GroupItem::from_node).collect())
    }

    pub async fn list_related_groups(&self, group_path: &str, query: &RelatedQuery) -> Result<Option<Vec<GroupItem>>> {
        identity::validate_key(group_path)?;
        let Some(node) = self.dao.list_related(group_path, query).await? else {
            return Ok(None);
        };
        Ok(Some(linked_nodes(&node, Category::Group).map(GroupItem::from_node).collect()))
    }

    pub async fn list_related_devices(&self, group_path: &str, query: &RelatedQuery) -> Result<Option<Vec<DeviceItem>>> {
        identity::validate_key(group_path)?;
        let Some(node) = self.dao.list_related(group_path, query).await? else {
            return Ok(None);
        };
        Ok(Some(linked_nodes(&node, Category::Device).map(DeviceItem::from_node).collect()))
    }
}
