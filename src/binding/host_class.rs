use super::engine::ScriptError;
use super::state::BindingScope;
use crate::dom::{self, NativeNode, NodeType};
use crate::foundation::NativeValue;

/// Builds the native instance for a freshly constructed script wrapper.
pub type Constructor =
    fn(&mut BindingScope<'_>, &[NativeValue]) -> Result<Box<dyn NativeNode>, ScriptError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClassId(usize);

/// What an engine needs to know to register a class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassDescriptor {
    pub name: &'static str,
    pub parent: Option<&'static str>,
    pub constructible: bool,
    /// Methods declared on this class; inherited ones come from the parent.
    pub methods: &'static [&'static str],
}

/// Host class descriptor: one per node type per engine instance.
pub struct HostClass {
    name: &'static str,
    parent: Option<&'static str>,
    node_type: Option<NodeType>,
    constructor: Option<Constructor>,
    own_names: &'static [&'static str],
    methods: &'static [&'static str],
    property_names: Vec<&'static str>,
}

impl HostClass {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            parent: None,
            node_type: None,
            constructor: None,
            own_names: &[],
            methods: &[],
            property_names: Vec::new(),
        }
    }

    pub fn extends(mut self, parent: &'static str) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn node_type(mut self, node_type: NodeType) -> Self {
        self.node_type = Some(node_type);
        self
    }

    pub fn constructor(mut self, constructor: Constructor) -> Self {
        self.constructor = Some(constructor);
        self
    }

    pub fn properties(mut self, names: &'static [&'static str]) -> Self {
        self.own_names = names;
        self
    }

    pub fn methods(mut self, names: &'static [&'static str]) -> Self {
        self.methods = names;
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn parent(&self) -> Option<&'static str> {
        self.parent
    }

    pub fn constructor_fn(&self) -> Option<Constructor> {
        self.constructor
    }

    pub fn node_kind(&self) -> Option<NodeType> {
        self.node_type
    }

    /// Declared names of this class followed by every inherited name.
    pub fn property_names(&self) -> &[&'static str] {
        &self.property_names
    }

    pub fn descriptor(&self) -> ClassDescriptor {
        ClassDescriptor {
            name: self.name,
            parent: self.parent,
            constructible: self.constructor.is_some(),
            methods: self.methods,
        }
    }
}

/// Per-engine-instance class table. Owned by the surface's DOM state, so it
/// is torn down with that surface and never shared between engines.
#[derive(Default)]
pub struct ClassRegistry {
    classes: Vec<HostClass>,
}

impl ClassRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the DOM classes this bridge exposes.
    pub fn dom() -> Self {
        let mut registry = Self::new();
        registry.register(
            HostClass::new("Node")
                .properties(dom::node::BASE_PROPERTY_NAMES)
                .methods(dom::node::BASE_METHOD_NAMES),
        );
        registry.register(
            HostClass::new("Element")
                .extends("Node")
                .node_type(NodeType::Element)
                .constructor(dom::element::construct)
                .properties(dom::element::PROPERTY_NAMES)
                .methods(dom::element::METHOD_NAMES),
        );
        registry.register(
            HostClass::new("Document")
                .extends("Node")
                .node_type(NodeType::Document),
        );
        registry.register(
            HostClass::new("TextNode")
                .extends("Node")
                .node_type(NodeType::Text)
                .constructor(dom::text::construct)
                .properties(dom::text::PROPERTY_NAMES),
        );
        registry.register(
            HostClass::new("CommentNode")
                .extends("Node")
                .node_type(NodeType::Comment)
                .constructor(dom::comment::construct)
                .properties(dom::comment::PROPERTY_NAMES),
        );
        registry
    }

    /// Register a class. Its parent, when named, must already be registered;
    /// the merged name table is computed here once.
    pub fn register(&mut self, mut class: HostClass) -> ClassId {
        let mut names: Vec<&'static str> = class.own_names.to_vec();
        if let Some(parent) = class.parent.and_then(|name| self.lookup(name)) {
            for name in self.get(parent).property_names() {
                if !names.contains(name) {
                    names.push(name);
                }
            }
        } else if let Some(parent) = class.parent {
            tracing::warn!(target: "bridge", class = class.name, parent, "parent class is not registered");
        }
        class.property_names = names;
        self.classes.push(class);
        ClassId(self.classes.len() - 1)
    }

    pub fn lookup(&self, name: &str) -> Option<ClassId> {
        self.classes
            .iter()
            .position(|class| class.name == name)
            .map(ClassId)
    }

    pub fn get(&self, id: ClassId) -> &HostClass {
        &self.classes[id.0]
    }

    /// The most derived class registered for a node type.
    pub fn for_node_type(&self, node_type: NodeType) -> Option<ClassId> {
        self.classes
            .iter()
            .rposition(|class| class.node_type == Some(node_type))
            .map(ClassId)
    }

    pub fn descriptors(&self) -> Vec<ClassDescriptor> {
        self.classes.iter().map(HostClass::descriptor).collect()
    }
}
