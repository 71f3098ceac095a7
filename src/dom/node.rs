use std::collections::HashMap;

use crate::binding::{BindingScope, ScriptError, ScriptHeap};
use crate::css::CssStyleDeclaration;
use crate::foundation::{NativeString, NativeValue, TargetId};

/// Names every node answers through the generic handler.
pub const BASE_PROPERTY_NAMES: &[&str] = &[
    "nodeName",
    "nodeType",
    "textContent",
    "parentNode",
    "firstChild",
    "lastChild",
];

pub const BASE_METHOD_NAMES: &[&str] = &["appendChild", "removeChild", "hasChildNodes"];

/// Base names script cannot assign.
pub(crate) const READ_ONLY_BASE_NAMES: &[&str] =
    &["nodeName", "nodeType", "parentNode", "firstChild", "lastChild"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeType {
    Element = 1,
    Text = 3,
    Comment = 8,
    Document = 9,
}

/// State shared by every node kind: identity, tree links and the generic
/// property store the base handler writes to.
#[derive(Debug)]
pub struct NodeData {
    pub target: TargetId,
    pub node_type: NodeType,
    pub parent: Option<TargetId>,
    pub children: Vec<TargetId>,
    expandos: HashMap<String, NativeValue>,
    expando_order: Vec<String>,
}

impl NodeData {
    pub fn new(target: TargetId, node_type: NodeType) -> Self {
        Self {
            target,
            node_type,
            parent: None,
            children: Vec::new(),
            expandos: HashMap::new(),
            expando_order: Vec::new(),
        }
    }

    pub fn expando(&self, name: &str) -> Option<&NativeValue> {
        self.expandos.get(name)
    }

    pub fn set_expando(&mut self, name: &str, value: NativeValue) {
        if self.expandos.insert(name.to_string(), value).is_none() {
            self.expando_order.push(name.to_string());
        }
    }

    pub fn remove_expando(&mut self, name: &str) -> Option<NativeValue> {
        let removed = self.expandos.remove(name)?;
        self.expando_order.retain(|existing| existing != name);
        Some(removed)
    }

    /// Generic property names in the order they were first set.
    pub fn expando_names(&self) -> impl Iterator<Item = &str> {
        self.expando_order.iter().map(String::as_str)
    }
}

/// What the leaf setter wants the generic path to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOutcome {
    /// Run the inherited handler as well.
    Continue,
    /// The leaf consumed the assignment; the inherited handler is skipped.
    Done,
    /// The property is read-only: the assignment is ignored.
    ReadOnly,
}

/// Native shadow instance paired with one script wrapper.
///
/// Each hook is the leaf layer of the property dispatch; returning `None` (or
/// [`SetOutcome::Continue`]) hands control to the generic node handler in
/// [`crate::binding::DomState`].
pub trait NativeNode {
    fn node(&self) -> &NodeData;
    fn node_mut(&mut self) -> &mut NodeData;

    /// Fixed per type, except for elements where it is the tag name.
    fn node_name(&self) -> &str;

    fn get_property(&self, _name: &str, _heap: &dyn ScriptHeap) -> Option<NativeValue> {
        None
    }

    fn set_property(
        &mut self,
        _name: &str,
        _value: &NativeValue,
        _scope: &mut BindingScope<'_>,
    ) -> Result<SetOutcome, ScriptError> {
        Ok(SetOutcome::Continue)
    }

    /// Called before a generic property is deleted.
    fn delete_property(
        &mut self,
        _name: &str,
        _scope: &mut BindingScope<'_>,
    ) -> Result<(), ScriptError> {
        Ok(())
    }

    fn call_method(
        &mut self,
        _name: &str,
        _args: &[NativeValue],
        _scope: &mut BindingScope<'_>,
    ) -> Option<Result<Option<NativeValue>, ScriptError>> {
        None
    }

    /// Fragment this node contributes when an ancestor's text content is
    /// collected.
    fn text_fragment(&self, _heap: &dyn ScriptHeap) -> Option<NativeString> {
        None
    }

    /// Drop every interned string this instance holds.
    fn release(&mut self, _heap: &mut dyn ScriptHeap) {}

    fn style(&self) -> Option<&CssStyleDeclaration> {
        None
    }

    fn style_mut(&mut self) -> Option<&mut CssStyleDeclaration> {
        None
    }

    fn accepts_children(&self) -> bool {
        false
    }
}

/// String form of a call argument; missing or null is empty.
pub(crate) fn string_arg(args: &[NativeValue], index: usize) -> NativeString {
    args.get(index)
        .map(NativeValue::to_native_string)
        .unwrap_or_default()
}
