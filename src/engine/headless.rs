use std::cell::RefCell;
use std::rc::Rc;

use crate::binding::{ClassDescriptor, DomState, ScriptEngine, ScriptError, ScriptHeap, StringArena};
use crate::foundation::{NativeString, NativeValue, TargetId};

/// Binding target without an interpreter.
///
/// Hosts that drive the DOM natively use it through
/// [`crate::surface::Surface::with_dom`]: the binding is installed exactly as
/// for QuickJS, but script evaluation and module events are refused, so the
/// host sees `false` instead of a script that silently never ran.
#[derive(Default)]
pub struct HeadlessEngine {
    state: Option<Rc<RefCell<DomState>>>,
    defined: usize,
}

impl HeadlessEngine {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ScriptEngine for HeadlessEngine {
    fn name(&self) -> &'static str {
        "headless"
    }

    fn new_heap(&self) -> Box<dyn ScriptHeap> {
        Box::new(StringArena::new())
    }

    fn bind(&mut self, state: Rc<RefCell<DomState>>) -> Result<(), ScriptError> {
        self.state = Some(state);
        Ok(())
    }

    fn define_class(&mut self, class: &ClassDescriptor) -> Result<(), ScriptError> {
        if self.state.is_none() {
            return Err(ScriptError::Engine("define_class before bind".into()));
        }
        tracing::trace!(target: "bridge", class = class.name, "headless class bound");
        self.defined += 1;
        Ok(())
    }

    fn expose_document(&mut self, document: TargetId) -> Result<(), ScriptError> {
        tracing::debug!(target: "bridge", %document, classes = self.defined, "headless binding ready");
        Ok(())
    }

    fn evaluate_script(
        &mut self,
        source: &NativeString,
        url: &str,
        _start_line: i32,
    ) -> Result<(), ScriptError> {
        tracing::debug!(target: "bridge", url, len = source.len(), "headless engine refused script");
        Err(ScriptError::Unsupported("script evaluation"))
    }

    fn invoke_module_event(
        &mut self,
        module: &NativeString,
        event_type: &str,
        _event: Option<TargetId>,
        _extra: &NativeValue,
    ) -> Result<NativeValue, ScriptError> {
        tracing::debug!(target: "bridge", %module, event_type, "headless engine refused module event");
        Err(ScriptError::Unsupported("module events"))
    }
}
