use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use crate::binding::{self, DomState, ScriptEngine, ScriptError};
use crate::config::BridgeConfig;
use crate::context::HostCallbacks;
use crate::engine;
use crate::foundation::{Command, NativeString, NativeValue, SurfaceId, TargetId};
use crate::markup;
use crate::plugin::{PluginCode, PluginRegistry};

/// One scripting context, its DOM document and its command buffer.
///
/// A surface is pinned to the thread that created it; [`crate::context::Context`]
/// enforces that before handing one out.
pub struct Surface {
    id: SurfaceId,
    state: Rc<RefCell<DomState>>,
    engine: Box<dyn ScriptEngine>,
    callbacks: Arc<HostCallbacks>,
}

impl Surface {
    /// Build the engine selected by `config` and install the DOM binding
    /// into it.
    pub fn new(
        id: SurfaceId,
        config: &BridgeConfig,
        callbacks: Arc<HostCallbacks>,
    ) -> Result<Self, ScriptError> {
        let engine = engine::create(
            config.engine,
            id,
            Arc::clone(&callbacks),
            config.max_pending_jobs,
        )?;
        Self::with_engine(id, engine, config.command_buffer_capacity, callbacks)
    }

    pub fn with_engine(
        id: SurfaceId,
        mut engine: Box<dyn ScriptEngine>,
        command_capacity: usize,
        callbacks: Arc<HostCallbacks>,
    ) -> Result<Self, ScriptError> {
        let state = DomState::new(id, engine.new_heap(), command_capacity)?;
        let state = Rc::new(RefCell::new(state));
        binding::install(engine.as_mut(), &state)?;
        tracing::info!(target: "surface", surface = %id, engine = engine.name(), "surface created");
        Ok(Self {
            id,
            state,
            engine,
            callbacks,
        })
    }

    pub fn id(&self) -> SurfaceId {
        self.id
    }

    pub fn engine_name(&self) -> &'static str {
        self.engine.name()
    }

    /// Evaluate every registered plugin in name order. Failures are reported
    /// and do not stop the remaining plugins.
    pub fn load_plugins(&mut self, plugins: &PluginRegistry) {
        for (name, code) in plugins.snapshot() {
            let result = match &code {
                PluginCode::Source(source) => {
                    self.engine
                        .evaluate_script(source, &format!("plugin://{name}"), 1)
                }
                PluginCode::ByteCode(bytes) => self.engine.evaluate_byte_code(bytes),
            };
            match result {
                Ok(()) => tracing::debug!(target: "surface", surface = %self.id, plugin = %name, "plugin loaded"),
                Err(err) => {
                    tracing::warn!(target: "surface", surface = %self.id, plugin = %name, error = %err, "plugin failed to load");
                    self.callbacks.js_error(self.id, &err.to_string());
                }
            }
        }
    }

    /// Returns `false` when the script threw; the error went to the host.
    pub fn evaluate_script(&mut self, source: &NativeString, url: &str, start_line: i32) -> bool {
        let result = self.engine.evaluate_script(source, url, start_line);
        self.report(result).is_some()
    }

    pub fn evaluate_byte_code(&mut self, bytes: &[u8]) -> bool {
        let result = self.engine.evaluate_byte_code(bytes);
        self.report(result).is_some()
    }

    pub fn parse_markup(&mut self, markup: &str) -> bool {
        let result = match self.state.try_borrow_mut() {
            Ok(mut state) => markup::parse_into(&mut state, markup),
            Err(_) => Err(ScriptError::Engine("DOM state is already in use".into())),
        };
        self.report(result).is_some()
    }

    /// Dispatch a host event to script module listeners. Errors yield `Null`.
    pub fn invoke_module_event(
        &mut self,
        module: &NativeString,
        event_type: &str,
        event: Option<TargetId>,
        extra: &NativeValue,
    ) -> NativeValue {
        let result = self
            .engine
            .invoke_module_event(module, event_type, event, extra);
        self.report(result).unwrap_or_default()
    }

    /// Native access to the DOM, for hosts that mutate it without script.
    pub fn with_dom<T>(&self, f: impl FnOnce(&mut DomState) -> T) -> T {
        f(&mut self.state.borrow_mut())
    }

    pub fn command_count(&self) -> usize {
        self.state.borrow().commands().size()
    }

    /// Zero-copy read of the pending commands. The buffer cannot change
    /// while `f` runs.
    pub fn with_commands<T>(&self, f: impl FnOnce(&[Command]) -> T) -> T {
        f(self.state.borrow().commands().data())
    }

    pub fn clear_commands(&mut self) {
        let mut state = self.state.borrow_mut();
        let dropped = state.commands().size();
        state.commands_mut().clear();
        tracing::trace!(target: "surface", surface = %self.id, dropped, "commands cleared");
    }

    pub fn take_commands(&mut self) -> Vec<Command> {
        self.state.borrow_mut().commands_mut().take()
    }

    pub fn encode_commands(&self) -> Vec<u8> {
        self.state.borrow().commands().encode()
    }

    fn report<T>(&self, result: Result<T, ScriptError>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(err) => {
                tracing::error!(target: "surface", surface = %self.id, error = %err, "script error");
                self.callbacks.js_error(self.id, &err.to_string());
                None
            }
        }
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        tracing::info!(target: "surface", surface = %self.id, "surface disposed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use crate::engine::HeadlessEngine;
    use crate::foundation::CommandType;

    fn headless(id: i32, callbacks: HostCallbacks) -> Surface {
        Surface::with_engine(
            SurfaceId(id),
            Box::new(HeadlessEngine::new()),
            16,
            Arc::new(callbacks),
        )
        .unwrap()
    }

    #[test]
    fn starts_with_the_document_creation() {
        let surface = headless(1, HostCallbacks::new());
        assert_eq!(surface.command_count(), 1);
        surface.with_commands(|commands| {
            assert_eq!(commands[0].kind, CommandType::CreateDocument);
            assert!(commands[0].aux.is_some());
        });
    }

    #[test]
    fn byte_code_failure_reaches_the_host() {
        let errors = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&errors);
        let mut surface = headless(
            2,
            HostCallbacks::new().on_js_error(move |surface, message| {
                sink.lock().unwrap().push((surface, message.to_string()));
            }),
        );
        assert!(!surface.evaluate_byte_code(&[0, 1, 2]));
        let errors = errors.lock().unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].0, SurfaceId(2));
        assert!(errors[0].1.contains("byte code"));
    }

    #[test]
    fn failing_plugin_does_not_stop_the_rest() {
        let registry = PluginRegistry::new();
        registry.register_byte_code("a", &[1, 2, 3]).unwrap();
        registry.register_source("b", NativeString::from("ok")).unwrap();
        let failures = Arc::new(Mutex::new(0usize));
        let sink = Arc::clone(&failures);
        let mut surface = headless(
            3,
            HostCallbacks::new().on_js_error(move |_, _| *sink.lock().unwrap() += 1),
        );
        surface.load_plugins(&registry);
        // The headless engine refuses both, so the second was still attempted.
        assert_eq!(*failures.lock().unwrap(), 2);
        assert_eq!(surface.engine_name(), "headless");
    }

    #[test]
    fn headless_refuses_scripts_and_module_events() {
        let errors = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&errors);
        let mut surface = headless(
            5,
            HostCallbacks::new().on_js_error(move |_, message| sink.lock().unwrap().push(message.to_string())),
        );
        assert!(!surface.evaluate_script(&NativeString::from("1 + 1"), "noop.js", 1));
        let reply = surface.invoke_module_event(
            &NativeString::from("m"),
            "tick",
            None,
            &NativeValue::Null,
        );
        assert_eq!(reply, NativeValue::Null);
        let errors = errors.lock().unwrap();
        assert_eq!(errors.len(), 2);
        assert!(errors[0].contains("script evaluation"), "{}", errors[0]);
        assert!(errors[1].contains("module events"), "{}", errors[1]);
    }

    #[test]
    fn take_drains_and_clear_is_idempotent() {
        let mut surface = headless(4, HostCallbacks::new());
        assert!(surface.parse_markup("<p>x</p>"));
        assert!(surface.command_count() > 1);
        let drained = surface.take_commands();
        assert_eq!(drained[0].kind, CommandType::CreateDocument);
        assert!(surface.take_commands().is_empty());
        surface.clear_commands();
        assert_eq!(surface.command_count(), 0);
    }
}
