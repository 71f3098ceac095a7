use crate::binding::{Atom, BindingScope, ScriptError, ScriptHeap};
use crate::foundation::{CommandType, NativeString, NativeValue};

use super::node::{string_arg, NativeNode, NodeData, NodeType, SetOutcome};

pub const PROPERTY_NAMES: &[&str] = &["data", "length", "nodeName", "textContent"];

const NODE_NAME: &str = "#comment";

/// Comment node. Its data is fixed at construction.
pub struct CommentNode {
    node: NodeData,
    data: Atom,
}

pub fn construct(
    scope: &mut BindingScope<'_>,
    args: &[NativeValue],
) -> Result<Box<dyn NativeNode>, ScriptError> {
    let value = string_arg(args, 0);
    let data = scope.heap.intern(&value);
    if let Err(err) = scope.enqueue_creation(CommandType::CreateComment, vec![value]) {
        scope.heap.release(data);
        return Err(err);
    }
    Ok(Box::new(CommentNode {
        node: NodeData::new(scope.target, NodeType::Comment),
        data,
    }))
}

impl CommentNode {
    pub fn data(&self, heap: &dyn ScriptHeap) -> NativeString {
        heap.resolve(self.data).cloned().unwrap_or_default()
    }
}

impl NativeNode for CommentNode {
    fn node(&self) -> &NodeData {
        &self.node
    }

    fn node_mut(&mut self) -> &mut NodeData {
        &mut self.node
    }

    fn node_name(&self) -> &str {
        NODE_NAME
    }

    fn get_property(&self, name: &str, heap: &dyn ScriptHeap) -> Option<NativeValue> {
        match name {
            "data" | "textContent" => Some(NativeValue::String(self.data(heap))),
            // UTF-16 code units, so a surrogate pair counts as two.
            "length" => Some(NativeValue::Int64(self.data(heap).len() as i64)),
            "nodeName" => Some(NativeValue::string(NODE_NAME)),
            _ => None,
        }
    }

    fn set_property(
        &mut self,
        name: &str,
        _value: &NativeValue,
        _scope: &mut BindingScope<'_>,
    ) -> Result<SetOutcome, ScriptError> {
        if PROPERTY_NAMES.contains(&name) {
            return Ok(SetOutcome::ReadOnly);
        }
        Ok(SetOutcome::Continue)
    }

    fn release(&mut self, heap: &mut dyn ScriptHeap) {
        heap.release(self.data);
    }
}
