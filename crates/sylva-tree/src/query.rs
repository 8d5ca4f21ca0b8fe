//! Read-only query interface over a model tree.

use sylva_types::{NodeId, NodeReference};

use crate::error::{TreeError, TreeResult};
use crate::field::FieldKind;
use crate::tree::Tree;

/// What external consumers need to walk a model.
///
/// Object safe, so adapters can hold a `&dyn ModelQuery`.
pub trait ModelQuery {
    fn resolve_root(&self) -> NodeId;

    fn get_property(&self, node: NodeId, role: &str) -> TreeResult<Option<String>>;

    /// Children of `node` in `role`, in order.
    fn get_children(&self, node: NodeId, role: &str) -> TreeResult<Vec<NodeId>>;

    fn get_reference_target(&self, node: NodeId, role: &str) -> TreeResult<Option<NodeReference>>;

    fn get_concept(&self, node: NodeId) -> TreeResult<Option<String>>;

    /// Parent id and containment role; `None` for the root.
    fn get_parent(&self, node: NodeId) -> TreeResult<Option<(NodeId, String)>>;

    /// Children across all roles, roles in name order.
    fn get_all_children(&self, node: NodeId) -> TreeResult<Vec<NodeId>>;

    /// Role names of `node` that hold a value of `kind`.
    fn get_roles(&self, node: NodeId, kind: FieldKind) -> TreeResult<Vec<String>>;

    fn contains_node(&self, node: NodeId) -> TreeResult<bool>;
}

impl ModelQuery for Tree {
    fn resolve_root(&self) -> NodeId {
        NodeId::ROOT
    }

    fn get_property(&self, node: NodeId, role: &str) -> TreeResult<Option<String>> {
        Ok(self.node(node)?.properties.remove(role))
    }

    fn get_children(&self, node: NodeId, role: &str) -> TreeResult<Vec<NodeId>> {
        Ok(self
            .child_entries(node, role)?
            .into_iter()
            .map(|e| e.key.id)
            .collect())
    }

    fn get_reference_target(&self, node: NodeId, role: &str) -> TreeResult<Option<NodeReference>> {
        Ok(self.node(node)?.references.remove(role))
    }

    fn get_concept(&self, node: NodeId) -> TreeResult<Option<String>> {
        Ok(self.node(node)?.concept)
    }

    fn get_parent(&self, node: NodeId) -> TreeResult<Option<(NodeId, String)>> {
        if !self.contains(node)? {
            return Err(TreeError::NodeNotFound(node));
        }
        Ok(self.parent_link(node)?.map(|link| (link.parent, link.role)))
    }

    fn get_all_children(&self, node: NodeId) -> TreeResult<Vec<NodeId>> {
        let record = self.node(node)?;
        let mut ids = Vec::new();
        for list in record.children.values() {
            ids.extend(list.entries(&**self.store())?.into_iter().map(|e| e.key.id));
        }
        Ok(ids)
    }

    fn get_roles(&self, node: NodeId, kind: FieldKind) -> TreeResult<Vec<String>> {
        let record = self.node(node)?;
        let roles = match kind {
            FieldKind::Property => record.properties.into_keys().collect(),
            FieldKind::Child => record.children.into_keys().collect(),
            FieldKind::Reference => record.references.into_keys().collect(),
        };
        Ok(roles)
    }

    fn contains_node(&self, node: NodeId) -> TreeResult<bool> {
        self.contains(node)
    }
}
