use std::collections::HashMap;

use super::engine::ScriptError;
use super::heap::ScriptHeap;
use super::host_class::{ClassId, ClassRegistry};
use crate::css::CssStyleDeclaration;
use crate::dom::node::READ_ONLY_BASE_NAMES;
use crate::dom::{Document, NativeNode, NodeType, SetOutcome};
use crate::foundation::{
    AuxHandle, CommandBuffer, CommandType, NativeString, NativeValue, SurfaceId, TargetId,
};

/// What a leaf handler may touch while it runs: the string heap and the
/// command log, addressed to one target.
pub struct BindingScope<'a> {
    pub surface: SurfaceId,
    pub target: TargetId,
    pub heap: &'a mut dyn ScriptHeap,
    pub commands: &'a mut CommandBuffer,
}

impl BindingScope<'_> {
    pub fn enqueue(&mut self, kind: CommandType, args: Vec<NativeString>) -> Result<(), ScriptError> {
        self.commands.append(self.target, kind, args, None)?;
        Ok(())
    }

    /// Queue a creation command carrying the back-reference to this target.
    pub fn enqueue_creation(
        &mut self,
        kind: CommandType,
        args: Vec<NativeString>,
    ) -> Result<(), ScriptError> {
        let aux = AuxHandle {
            surface: self.surface,
            target: self.target,
        };
        self.commands.append(self.target, kind, args, Some(aux))?;
        Ok(())
    }
}

struct ScriptWrapper {
    class: ClassId,
    instance: Box<dyn NativeNode>,
    /// A script wrapper references this node. Unheld nodes live only while
    /// attached to the tree.
    script_held: bool,
}

/// DOM state of one surface: the wrapper table, the string heap of its
/// engine and the command log.
///
/// Every engine backend routes its property traps here, so the dispatch is
/// written once: the leaf node's handler runs first and the generic node
/// handler runs after it.
pub struct DomState {
    surface: SurfaceId,
    heap: Box<dyn ScriptHeap>,
    classes: ClassRegistry,
    wrappers: HashMap<TargetId, ScriptWrapper>,
    commands: CommandBuffer,
    next_target: u64,
    document: TargetId,
}

impl DomState {
    pub fn new(
        surface: SurfaceId,
        heap: Box<dyn ScriptHeap>,
        command_capacity: usize,
    ) -> Result<Self, ScriptError> {
        let classes = ClassRegistry::dom();
        let class = classes
            .for_node_type(NodeType::Document)
            .ok_or_else(|| ScriptError::Engine("document class is not registered".into()))?;
        let mut state = Self {
            surface,
            heap,
            classes,
            wrappers: HashMap::new(),
            commands: CommandBuffer::with_capacity(command_capacity),
            next_target: 1,
            document: TargetId(0),
        };
        let document = state.allocate_target();
        state.commands.append(
            document,
            CommandType::CreateDocument,
            Vec::new(),
            Some(AuxHandle {
                surface,
                target: document,
            }),
        )?;
        state.wrappers.insert(
            document,
            ScriptWrapper {
                class,
                instance: Box::new(Document::new(document)),
                script_held: true,
            },
        );
        state.document = document;
        Ok(state)
    }

    pub fn surface(&self) -> SurfaceId {
        self.surface
    }

    pub fn document(&self) -> TargetId {
        self.document
    }

    pub fn classes(&self) -> &ClassRegistry {
        &self.classes
    }

    pub fn heap(&self) -> &dyn ScriptHeap {
        self.heap.as_ref()
    }

    pub fn commands(&self) -> &CommandBuffer {
        &self.commands
    }

    pub fn commands_mut(&mut self) -> &mut CommandBuffer {
        &mut self.commands
    }

    pub fn node(&self, target: TargetId) -> Option<&dyn NativeNode> {
        self.wrappers.get(&target).map(|wrapper| wrapper.instance.as_ref())
    }

    pub fn is_live(&self, target: TargetId) -> bool {
        self.wrappers.contains_key(&target)
    }

    pub fn is_held(&self, target: TargetId) -> bool {
        self.wrappers
            .get(&target)
            .is_some_and(|wrapper| wrapper.script_held)
    }

    pub fn live_nodes(&self) -> usize {
        self.wrappers.len()
    }

    /// Script construction: build the native instance for a new wrapper.
    pub fn construct(
        &mut self,
        class: &str,
        args: &[NativeValue],
    ) -> Result<TargetId, ScriptError> {
        self.create(class, args, true)
    }

    /// Host-side construction (markup, text replacement). The node is not
    /// referenced by script until a wrapper adopts it.
    pub fn create_native(
        &mut self,
        class: &str,
        args: &[NativeValue],
    ) -> Result<TargetId, ScriptError> {
        self.create(class, args, false)
    }

    fn create(
        &mut self,
        class: &str,
        args: &[NativeValue],
        script_held: bool,
    ) -> Result<TargetId, ScriptError> {
        let class_id = self
            .classes
            .lookup(class)
            .ok_or_else(|| ScriptError::type_error(format!("{class} is not a constructor")))?;
        let constructor = self
            .classes
            .get(class_id)
            .constructor_fn()
            .ok_or_else(|| ScriptError::type_error("Illegal constructor"))?;
        let target = self.allocate_target();
        let mut scope = BindingScope {
            surface: self.surface,
            target,
            heap: self.heap.as_mut(),
            commands: &mut self.commands,
        };
        let instance = constructor(&mut scope, args)?;
        self.wrappers.insert(
            target,
            ScriptWrapper {
                class: class_id,
                instance,
                script_held,
            },
        );
        Ok(target)
    }

    pub fn class_of(&self, target: TargetId) -> Result<&'static str, ScriptError> {
        let wrapper = self.wrapper(target)?;
        Ok(self.classes.get(wrapper.class).name())
    }

    pub fn get_property(
        &self,
        target: TargetId,
        name: &str,
    ) -> Result<Option<NativeValue>, ScriptError> {
        let instance = self.instance(target)?;
        if let Some(value) = instance.get_property(name, self.heap.as_ref()) {
            return Ok(Some(value));
        }
        let node = instance.node();
        let value = match name {
            "nodeName" => NativeValue::string(instance.node_name()),
            "nodeType" => NativeValue::Int64(node.node_type as i64),
            "textContent" => self.text_content(target)?,
            "parentNode" => node_ref(node.parent),
            "firstChild" => node_ref(node.children.first().copied()),
            "lastChild" => node_ref(node.children.last().copied()),
            _ => return Ok(node.expando(name).cloned()),
        };
        Ok(Some(value))
    }

    /// Leaf setter first; unless it consumed the assignment the generic
    /// handler runs too, so a leaf side effect and the generic state update
    /// both happen.
    pub fn set_property(
        &mut self,
        target: TargetId,
        name: &str,
        value: &NativeValue,
    ) -> Result<(), ScriptError> {
        let surface = self.surface;
        let wrapper = self
            .wrappers
            .get_mut(&target)
            .ok_or(ScriptError::StaleWrapper(target))?;
        let mut scope = BindingScope {
            surface,
            target,
            heap: self.heap.as_mut(),
            commands: &mut self.commands,
        };
        match wrapper.instance.set_property(name, value, &mut scope)? {
            SetOutcome::Done | SetOutcome::ReadOnly => return Ok(()),
            SetOutcome::Continue => {}
        }
        if READ_ONLY_BASE_NAMES.contains(&name) {
            return Ok(());
        }
        if name == "textContent" {
            let container = wrapper.instance.accepts_children()
                && wrapper.instance.node().node_type != NodeType::Document;
            if container {
                return self.replace_children_with_text(target, value.to_native_string());
            }
            return Ok(());
        }
        wrapper.instance.node_mut().set_expando(name, value.clone());
        Ok(())
    }

    /// Returns false for declared properties, which cannot be deleted.
    pub fn delete_property(&mut self, target: TargetId, name: &str) -> Result<bool, ScriptError> {
        let class = self.wrapper(target)?.class;
        if self.classes.get(class).property_names().contains(&name) {
            return Ok(false);
        }
        let surface = self.surface;
        let wrapper = self
            .wrappers
            .get_mut(&target)
            .ok_or(ScriptError::StaleWrapper(target))?;
        let mut scope = BindingScope {
            surface,
            target,
            heap: self.heap.as_mut(),
            commands: &mut self.commands,
        };
        wrapper.instance.delete_property(name, &mut scope)?;
        wrapper.instance.node_mut().remove_expando(name);
        Ok(true)
    }

    /// Declared names of the node's class (leaf first, then inherited)
    /// followed by the generic properties script has set.
    pub fn property_names(&self, target: TargetId) -> Result<Vec<String>, ScriptError> {
        let wrapper = self.wrapper(target)?;
        let mut names: Vec<String> = self
            .classes
            .get(wrapper.class)
            .property_names()
            .iter()
            .map(|name| name.to_string())
            .collect();
        for name in wrapper.instance.node().expando_names() {
            if !names.iter().any(|existing| existing == name) {
                names.push(name.to_string());
            }
        }
        Ok(names)
    }

    pub fn call_method(
        &mut self,
        target: TargetId,
        name: &str,
        args: &[NativeValue],
    ) -> Result<Option<NativeValue>, ScriptError> {
        {
            let surface = self.surface;
            let wrapper = self
                .wrappers
                .get_mut(&target)
                .ok_or(ScriptError::StaleWrapper(target))?;
            let mut scope = BindingScope {
                surface,
                target,
                heap: self.heap.as_mut(),
                commands: &mut self.commands,
            };
            if let Some(result) = wrapper.instance.call_method(name, args, &mut scope) {
                return result;
            }
        }
        match name {
            "appendChild" => {
                let child = node_arg(args, name)?;
                self.append_child(target, child)?;
                Ok(Some(NativeValue::Node(child)))
            }
            "removeChild" => {
                let child = node_arg(args, name)?;
                self.remove_child(target, child)?;
                Ok(Some(NativeValue::Node(child)))
            }
            "hasChildNodes" => Ok(Some(NativeValue::Bool(
                !self.instance(target)?.node().children.is_empty(),
            ))),
            other => Err(ScriptError::type_error(format!("{other} is not a function"))),
        }
    }

    pub fn style(&self, target: TargetId) -> Option<&CssStyleDeclaration> {
        self.wrappers.get(&target)?.instance.style()
    }

    /// Run one style declaration operation on the element `target`.
    pub fn invoke_style(
        &mut self,
        target: TargetId,
        op: &str,
        args: &[NativeValue],
    ) -> Result<NativeValue, ScriptError> {
        let wrapper = self
            .wrappers
            .get_mut(&target)
            .ok_or(ScriptError::StaleWrapper(target))?;
        let style = wrapper
            .instance
            .style_mut()
            .ok_or_else(|| ScriptError::type_error("node has no style declaration"))?;
        style.invoke(op, args, &mut self.commands)
    }

    /// Aggregate text: a character data node answers its own data, a
    /// container concatenates the fragments of its descendants and the
    /// document answers null.
    pub fn text_content(&self, target: TargetId) -> Result<NativeValue, ScriptError> {
        let instance = self.instance(target)?;
        if instance.node().node_type == NodeType::Document {
            return Ok(NativeValue::Null);
        }
        if let Some(fragment) = instance.text_fragment(self.heap.as_ref()) {
            return Ok(NativeValue::String(fragment));
        }
        if !instance.accepts_children() {
            return Ok(NativeValue::Null);
        }
        let mut units = Vec::new();
        self.collect_text(target, &mut units);
        Ok(NativeValue::String(NativeString::from(units)))
    }

    fn collect_text(&self, target: TargetId, units: &mut Vec<u16>) {
        let Some(wrapper) = self.wrappers.get(&target) else {
            return;
        };
        for child in &wrapper.instance.node().children {
            let Some(node) = self.wrappers.get(child) else {
                continue;
            };
            if let Some(fragment) = node.instance.text_fragment(self.heap.as_ref()) {
                units.extend_from_slice(fragment.as_utf16());
            } else if node.instance.accepts_children() {
                self.collect_text(*child, units);
            }
        }
    }

    /// A script wrapper was created for an existing node.
    pub fn adopt(&mut self, target: TargetId) -> Result<(), ScriptError> {
        let wrapper = self
            .wrappers
            .get_mut(&target)
            .ok_or(ScriptError::StaleWrapper(target))?;
        wrapper.script_held = true;
        Ok(())
    }

    /// Script released its wrapper. A detached node is disposed now; an
    /// attached one stays alive until it is removed from the tree.
    pub fn finalize(&mut self, target: TargetId) {
        if target == self.document {
            return;
        }
        let Some(wrapper) = self.wrappers.get_mut(&target) else {
            return;
        };
        if wrapper.instance.node().parent.is_some() {
            wrapper.script_held = false;
            return;
        }
        self.dispose(target);
    }

    /// Release the node's strings, tell the host, and take every unheld
    /// descendant down with it.
    pub(crate) fn dispose(&mut self, target: TargetId) {
        let Some(mut wrapper) = self.wrappers.remove(&target) else {
            return;
        };
        wrapper.instance.release(self.heap.as_mut());
        if let Err(err) =
            self.commands
                .append(target, CommandType::DisposeEventTarget, Vec::new(), None)
        {
            tracing::warn!(target: "bridge", node = %target, error = %err, "failed to queue disposal");
        }
        let children = std::mem::take(&mut wrapper.instance.node_mut().children);
        for child in children {
            let held = match self.wrappers.get_mut(&child) {
                Some(node) => {
                    node.instance.node_mut().parent = None;
                    node.script_held
                }
                None => continue,
            };
            if !held {
                self.dispose(child);
            }
        }
        tracing::trace!(target: "bridge", node = %target, "node disposed");
    }

    pub(crate) fn instance(&self, target: TargetId) -> Result<&dyn NativeNode, ScriptError> {
        Ok(self.wrapper(target)?.instance.as_ref())
    }

    pub(crate) fn instance_mut(
        &mut self,
        target: TargetId,
    ) -> Result<&mut (dyn NativeNode + 'static), ScriptError> {
        let wrapper = self
            .wrappers
            .get_mut(&target)
            .ok_or(ScriptError::StaleWrapper(target))?;
        Ok(wrapper.instance.as_mut())
    }

    fn wrapper(&self, target: TargetId) -> Result<&ScriptWrapper, ScriptError> {
        self.wrappers
            .get(&target)
            .ok_or(ScriptError::StaleWrapper(target))
    }

    fn allocate_target(&mut self) -> TargetId {
        let target = TargetId(self.next_target);
        self.next_target += 1;
        target
    }
}

impl Drop for DomState {
    fn drop(&mut self) {
        for wrapper in self.wrappers.values_mut() {
            wrapper.instance.release(self.heap.as_mut());
        }
    }
}

fn node_ref(target: Option<TargetId>) -> NativeValue {
    target.map(NativeValue::Node).unwrap_or(NativeValue::Null)
}

fn node_arg(args: &[NativeValue], method: &str) -> Result<TargetId, ScriptError> {
    args.first().and_then(NativeValue::as_node).ok_or_else(|| {
        ScriptError::type_error(format!(
            "Failed to execute '{method}' on 'Node': parameter 1 is not of type 'Node'"
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::{AtomTable, StringArena};

    fn state() -> DomState {
        DomState::new(SurfaceId(1), Box::new(AtomTable::new()), 16).unwrap()
    }

    fn text(value: &str) -> Vec<NativeValue> {
        vec![NativeValue::from(value)]
    }

    #[test]
    fn document_is_created_first() {
        let state = state();
        let first = &state.commands().data()[0];
        assert_eq!(first.kind, CommandType::CreateDocument);
        assert_eq!(first.target, state.document());
        assert_eq!(
            state.get_property(state.document(), "nodeName").unwrap(),
            Some(NativeValue::from("#document"))
        );
    }

    #[test]
    fn leaf_names_shadow_generic_ones() {
        let mut state = state();
        let node = state.construct("TextNode", &text("hi")).unwrap();
        assert_eq!(
            state.get_property(node, "nodeName").unwrap(),
            Some(NativeValue::from("#text"))
        );
        assert_eq!(
            state.get_property(node, "nodeType").unwrap(),
            Some(NativeValue::Int64(3))
        );
        assert_eq!(state.get_property(node, "missing").unwrap(), None);
    }

    #[test]
    fn text_data_set_runs_leaf_and_generic_paths() {
        let mut state = state();
        let node = state.construct("TextNode", &text("a")).unwrap();
        state
            .set_property(node, "data", &NativeValue::from("b"))
            .unwrap();

        let last = state.commands().data().last().unwrap();
        assert_eq!(last.kind, CommandType::SetProperty);
        assert_eq!(last.args, vec![NativeString::from("data"), NativeString::from("b")]);
        let names = state.property_names(node).unwrap();
        assert_eq!(names.iter().filter(|name| *name == "data").count(), 1);
    }

    #[test]
    fn expandos_are_enumerated_after_declared_names() {
        let mut state = state();
        let node = state.construct("CommentNode", &text("c")).unwrap();
        state
            .set_property(node, "custom", &NativeValue::Bool(true))
            .unwrap();
        let names = state.property_names(node).unwrap();
        assert_eq!(names.first().map(String::as_str), Some("data"));
        assert_eq!(names.last().map(String::as_str), Some("custom"));
        assert!(state.delete_property(node, "custom").unwrap());
        assert!(!state.delete_property(node, "length").unwrap());
        assert_eq!(state.get_property(node, "custom").unwrap(), None);
    }

    #[test]
    fn comment_data_is_read_only() {
        let mut state = state();
        let node = state.construct("CommentNode", &text("keep")).unwrap();
        let before = state.commands().size();
        state
            .set_property(node, "data", &NativeValue::from("changed"))
            .unwrap();
        assert_eq!(state.commands().size(), before);
        assert_eq!(
            state.get_property(node, "data").unwrap(),
            Some(NativeValue::from("keep"))
        );
    }

    #[test]
    fn abstract_classes_cannot_be_constructed() {
        let mut state = state();
        assert!(matches!(
            state.construct("Node", &[]),
            Err(ScriptError::TypeError(_))
        ));
        assert!(matches!(
            state.construct("Element", &[]),
            Err(ScriptError::TypeError(_))
        ));
        assert!(matches!(
            state.construct("Nope", &[]),
            Err(ScriptError::TypeError(_))
        ));
    }

    #[test]
    fn finalizing_a_detached_node_releases_its_strings() {
        let mut state = DomState::new(SurfaceId(2), Box::new(StringArena::new()), 0).unwrap();
        let node = state.construct("TextNode", &text("temp")).unwrap();
        assert_eq!(state.heap().live_strings(), 1);
        assert_eq!(state.live_nodes(), 2);

        state.finalize(node);
        assert!(!state.is_live(node));
        assert_eq!(state.live_nodes(), 1);
        assert_eq!(state.heap().live_strings(), 0);
        assert_eq!(
            state.commands().data().last().map(|command| command.kind),
            Some(CommandType::DisposeEventTarget)
        );
        assert_eq!(
            state.get_property(node, "data"),
            Err(ScriptError::StaleWrapper(node))
        );
    }

    #[test]
    fn target_ids_are_not_reused() {
        let mut state = state();
        let first = state.construct("TextNode", &text("x")).unwrap();
        state.finalize(first);
        let second = state.construct("TextNode", &text("x")).unwrap();
        assert!(second > first);
    }
}
