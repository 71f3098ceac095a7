use crate::binding::{DomState, ScriptError};
use crate::foundation::{CommandType, NativeString, NativeValue, TargetId};

use super::node::NodeType;

const INSERT_POSITION: &str = "beforeend";

impl DomState {
    /// Append `child` as the last child of `parent`, moving it out of its
    /// current parent first.
    pub fn append_child(&mut self, parent: TargetId, child: TargetId) -> Result<(), ScriptError> {
        let parent_node = self.instance(parent)?;
        if !parent_node.accepts_children() {
            return Err(ScriptError::HierarchyRequest(format!(
                "{} cannot have children",
                parent_node.node_name()
            )));
        }
        let child_node = self.instance(child)?;
        if child_node.node().node_type == NodeType::Document {
            return Err(ScriptError::HierarchyRequest(
                "a document cannot be inserted".into(),
            ));
        }
        let old_parent = child_node.node().parent;

        let mut cursor = Some(parent);
        while let Some(current) = cursor {
            if current == child {
                return Err(ScriptError::HierarchyRequest(
                    "the new child is an ancestor of the parent".into(),
                ));
            }
            cursor = self.instance(current)?.node().parent;
        }

        if let Some(old_parent) = old_parent {
            self.detach(old_parent, child)?;
        }
        self.instance_mut(parent)?.node_mut().children.push(child);
        self.instance_mut(child)?.node_mut().parent = Some(parent);
        self.commands_mut().append(
            parent,
            CommandType::InsertAdjacentNode,
            vec![
                NativeString::from(INSERT_POSITION),
                NativeString::from(child.to_string()),
            ],
            None,
        )?;
        Ok(())
    }

    /// Remove `child` from `parent`. A node script no longer references is
    /// disposed along with its unreferenced descendants.
    pub fn remove_child(&mut self, parent: TargetId, child: TargetId) -> Result<(), ScriptError> {
        if self.instance(child)?.node().parent != Some(parent) {
            return Err(ScriptError::NotFound(format!(
                "node {child} is not a child of node {parent}"
            )));
        }
        self.detach(parent, child)?;
        if !self.is_held(child) {
            self.dispose(child);
        }
        Ok(())
    }

    /// Replace every child of `parent` with a single text node, or with
    /// nothing when `text` is empty.
    pub fn replace_children_with_text(
        &mut self,
        parent: TargetId,
        text: NativeString,
    ) -> Result<(), ScriptError> {
        let children = self.instance(parent)?.node().children.clone();
        for child in children {
            self.remove_child(parent, child)?;
        }
        if !text.is_empty() {
            let node = self.create_native("TextNode", &[NativeValue::String(text)])?;
            self.append_child(parent, node)?;
        }
        Ok(())
    }

    fn detach(&mut self, parent: TargetId, child: TargetId) -> Result<(), ScriptError> {
        self.instance_mut(parent)?
            .node_mut()
            .children
            .retain(|existing| *existing != child);
        self.instance_mut(child)?.node_mut().parent = None;
        self.commands_mut()
            .append(child, CommandType::RemoveNode, Vec::new(), None)?;
        Ok(())
    }
}
