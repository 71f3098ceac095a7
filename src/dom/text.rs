use crate::binding::{Atom, BindingScope, ScriptError, ScriptHeap};
use crate::foundation::{CommandType, NativeString, NativeValue};

use super::node::{string_arg, NativeNode, NodeData, NodeType, SetOutcome};

pub const PROPERTY_NAMES: &[&str] = &["data", "textContent", "nodeName"];

const NODE_NAME: &str = "#text";

/// Text node. Its character data lives in the engine's string heap and is
/// held through one retained atom.
pub struct TextNode {
    node: NodeData,
    data: Atom,
}

/// `new TextNode(data)`: the creation command carries the initial value and
/// is queued before anything else addressed to the new target.
pub fn construct(
    scope: &mut BindingScope<'_>,
    args: &[NativeValue],
) -> Result<Box<dyn NativeNode>, ScriptError> {
    let value = string_arg(args, 0);
    let data = scope.heap.intern(&value);
    if let Err(err) = scope.enqueue_creation(CommandType::CreateTextNode, vec![value]) {
        scope.heap.release(data);
        return Err(err);
    }
    Ok(Box::new(TextNode {
        node: NodeData::new(scope.target, NodeType::Text),
        data,
    }))
}

impl TextNode {
    pub fn data(&self, heap: &dyn ScriptHeap) -> NativeString {
        heap.resolve(self.data).cloned().unwrap_or_default()
    }
}

impl NativeNode for TextNode {
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
            "nodeName" => Some(NativeValue::string(NODE_NAME)),
            _ => None,
        }
    }

    fn set_property(
        &mut self,
        name: &str,
        value: &NativeValue,
        scope: &mut BindingScope<'_>,
    ) -> Result<SetOutcome, ScriptError> {
        match name {
            "data" | "textContent" => {
                let value = value.to_native_string();
                let next = scope.heap.intern(&value);
                scope.heap.release(self.data);
                self.data = next;
                scope.enqueue(
                    CommandType::SetProperty,
                    vec![NativeString::from("data"), value],
                )?;
                Ok(SetOutcome::Continue)
            }
            "nodeName" => Ok(SetOutcome::ReadOnly),
            _ => Ok(SetOutcome::Continue),
        }
    }

    fn text_fragment(&self, heap: &dyn ScriptHeap) -> Option<NativeString> {
        Some(self.data(heap))
    }

    fn release(&mut self, heap: &mut dyn ScriptHeap) {
        heap.release(self.data);
    }
}
