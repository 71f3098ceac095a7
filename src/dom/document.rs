use crate::foundation::TargetId;

use super::node::{NativeNode, NodeData, NodeType};

/// Root of one surface's tree. Created with the surface and never released
/// by script.
pub struct Document {
    node: NodeData,
}

impl Document {
    pub fn new(target: TargetId) -> Self {
        Self {
            node: NodeData::new(target, NodeType::Document),
        }
    }
}

impl NativeNode for Document {
    fn node(&self) -> &NodeData {
        &self.node
    }

    fn node_mut(&mut self) -> &mut NodeData {
        &mut self.node
    }

    fn node_name(&self) -> &str {
        "#document"
    }

    fn accepts_children(&self) -> bool {
        true
    }
}
