use std::cell::RefCell;
use std::rc::Rc;

use thiserror::Error;

use super::heap::ScriptHeap;
use super::host_class::ClassDescriptor;
use super::state::DomState;
use crate::foundation::{CommandError, NativeString, NativeValue, TargetId};

/// Errors raised to script through the engine's own exception channel.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ScriptError {
    #[error("TypeError: {0}")]
    TypeError(String),
    #[error("HierarchyRequestError: {0}")]
    HierarchyRequest(String),
    #[error("NotFoundError: {0}")]
    NotFound(String),
    #[error("target {0} has been released")]
    StaleWrapper(TargetId),
    #[error("{message}")]
    Exception { message: String },
    #[error("{0} is not supported by this engine")]
    Unsupported(&'static str),
    #[error("engine failure: {0}")]
    Engine(String),
}

impl ScriptError {
    pub fn type_error(message: impl Into<String>) -> Self {
        Self::TypeError(message.into())
    }

    /// Name of the script-side error this is raised as.
    pub fn js_name(&self) -> &'static str {
        match self {
            Self::TypeError(_) => "TypeError",
            Self::HierarchyRequest(_) => "HierarchyRequestError",
            Self::NotFound(_) => "NotFoundError",
            Self::StaleWrapper(_) => "InvalidStateError",
            Self::Unsupported(_) => "NotSupportedError",
            Self::Exception { .. } | Self::Engine(_) => "Error",
        }
    }

    /// Message without the error name prefix.
    pub fn detail(&self) -> String {
        match self {
            Self::TypeError(message) | Self::HierarchyRequest(message) | Self::NotFound(message) => {
                message.clone()
            }
            other => other.to_string(),
        }
    }
}

impl From<CommandError> for ScriptError {
    fn from(err: CommandError) -> Self {
        Self::Engine(err.to_string())
    }
}

impl From<serde_json::Error> for ScriptError {
    fn from(err: serde_json::Error) -> Self {
        Self::TypeError(format!("value could not be marshaled: {err}"))
    }
}

/// Adapter a scripting-engine backend implements.
///
/// The DOM/CSS binding lives in [`DomState`] and is written once; a backend
/// only supplies its string heap, registers the host classes the binding
/// describes, and routes property traps from script objects back into the
/// shared state.
pub trait ScriptEngine {
    fn name(&self) -> &'static str;

    /// String heap the binding interns into.
    fn new_heap(&self) -> Box<dyn ScriptHeap>;

    /// Bind the engine to the surface's DOM state. Called once, before any
    /// class is defined.
    fn bind(&mut self, state: Rc<RefCell<DomState>>) -> Result<(), ScriptError>;

    /// Register one host class (constructor plus property traps).
    fn define_class(&mut self, class: &ClassDescriptor) -> Result<(), ScriptError>;

    /// Publish the document root to script.
    fn expose_document(&mut self, document: TargetId) -> Result<(), ScriptError>;

    fn evaluate_script(
        &mut self,
        source: &NativeString,
        url: &str,
        start_line: i32,
    ) -> Result<(), ScriptError>;

    fn evaluate_byte_code(&mut self, _bytes: &[u8]) -> Result<(), ScriptError> {
        Err(ScriptError::Unsupported("byte code evaluation"))
    }

    fn invoke_module_event(
        &mut self,
        module: &NativeString,
        event_type: &str,
        event: Option<TargetId>,
        extra: &NativeValue,
    ) -> Result<NativeValue, ScriptError>;
}

/// Install the binding into an engine: bind, define every host class in
/// registration order (bases first), then expose the document.
pub fn install(
    engine: &mut dyn ScriptEngine,
    state: &Rc<RefCell<DomState>>,
) -> Result<(), ScriptError> {
    engine.bind(Rc::clone(state))?;
    let (classes, document) = {
        let state = state.borrow();
        (state.classes().descriptors(), state.document())
    };
    for class in &classes {
        engine.define_class(class)?;
    }
    engine.expose_document(document)?;
    tracing::debug!(
        target: "bridge",
        engine = engine.name(),
        classes = classes.len(),
        "binding installed"
    );
    Ok(())
}
