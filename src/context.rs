use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::thread::{self, ThreadId};

use thiserror::Error;
use tracing::Level;

use crate::binding::ScriptError;
use crate::config::{BridgeConfig, ViolationPolicy};
use crate::foundation::{NativeValue, SurfaceId};
use crate::plugin::PluginRegistry;
use crate::surface::Surface;

pub type JsErrorCallback = Arc<dyn Fn(SurfaceId, &str) + Send + Sync>;
pub type JsLogCallback = Arc<dyn Fn(SurfaceId, Level, &str) + Send + Sync>;
pub type ModuleCallback =
    Arc<dyn Fn(SurfaceId, &str, &str, &NativeValue) -> NativeValue + Send + Sync>;

/// Host callback table shared by every surface of a context.
#[derive(Clone, Default)]
pub struct HostCallbacks {
    on_js_error: Option<JsErrorCallback>,
    on_js_log: Option<JsLogCallback>,
    invoke_module: Option<ModuleCallback>,
}

impl HostCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_js_error(mut self, callback: impl Fn(SurfaceId, &str) + Send + Sync + 'static) -> Self {
        self.on_js_error = Some(Arc::new(callback));
        self
    }

    pub fn on_js_log(
        mut self,
        callback: impl Fn(SurfaceId, Level, &str) + Send + Sync + 'static,
    ) -> Self {
        self.on_js_log = Some(Arc::new(callback));
        self
    }

    pub fn on_invoke_module(
        mut self,
        callback: impl Fn(SurfaceId, &str, &str, &NativeValue) -> NativeValue + Send + Sync + 'static,
    ) -> Self {
        self.invoke_module = Some(Arc::new(callback));
        self
    }

    pub fn js_error(&self, surface: SurfaceId, message: &str) {
        if let Some(callback) = &self.on_js_error {
            callback(surface, message);
        }
    }

    pub fn log(&self, surface: SurfaceId, level: Level, message: &str) {
        if let Some(callback) = &self.on_js_log {
            callback(surface, level, message);
        }
    }

    /// Script-to-host module call; `Null` when the host registered no handler.
    pub fn invoke_module(
        &self,
        surface: SurfaceId,
        module: &str,
        method: &str,
        params: &NativeValue,
    ) -> NativeValue {
        match &self.invoke_module {
            Some(callback) => callback(surface, module, method, params),
            None => {
                tracing::debug!(target: "context", %surface, module, method, "no module handler registered");
                NativeValue::Null
            }
        }
    }
}

impl fmt::Debug for HostCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostCallbacks")
            .field("on_js_error", &self.on_js_error.is_some())
            .field("on_js_log", &self.on_js_log.is_some())
            .field("invoke_module", &self.invoke_module.is_some())
            .finish()
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum BridgeError {
    #[error("bridge context is not initialized")]
    NotInitialized,
    #[error("context can only be initialized from the controller thread")]
    NotController,
    #[error("surface {0} entered from a thread other than its owner")]
    WrongThread(SurfaceId),
    #[error("surface {0} handle is stale (disposed or from a retired context)")]
    StaleHandle(SurfaceId),
    #[error("surface {0} already exists")]
    DuplicateSurface(SurfaceId),
    #[error("surface {0} is already in use")]
    SurfaceBusy(SurfaceId),
    #[error("plugin {0} registered after the first surface was created")]
    PluginRegistrySealed(String),
    #[error("surface start-up failed: {0}")]
    Engine(#[from] ScriptError),
}

impl BridgeError {
    /// Caller misuse that breaks a bridge invariant.
    pub fn is_violation(&self) -> bool {
        matches!(
            self,
            Self::WrongThread(_)
                | Self::StaleHandle(_)
                | Self::DuplicateSurface(_)
                | Self::NotController
                | Self::SurfaceBusy(_)
        )
    }
}

/// Log an invariant violation and apply `policy` to it.
pub(crate) fn violation(policy: ViolationPolicy, err: BridgeError) -> BridgeError {
    tracing::error!(target: "context", error = %err, "bridge invariant violated");
    if policy == ViolationPolicy::Abort {
        std::process::abort();
    }
    err
}

/// Copyable reference to one surface, valid on its owning thread until the
/// surface is disposed or its context retired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SurfaceHandle {
    context: u64,
    surface: SurfaceId,
    generation: u64,
}

impl SurfaceHandle {
    pub fn surface(&self) -> SurfaceId {
        self.surface
    }
}

struct SurfaceEntry {
    owner: ThreadId,
    generation: u64,
}

type SurfaceTable = Mutex<HashMap<SurfaceId, SurfaceEntry>>;

struct LocalSurface {
    id: SurfaceId,
    alive: Arc<AtomicBool>,
    generation: u64,
    registry: Weak<SurfaceTable>,
    surface: Rc<RefCell<Surface>>,
}

impl Drop for LocalSurface {
    fn drop(&mut self) {
        let Some(registry) = self.registry.upgrade() else {
            return;
        };
        let mut surfaces = registry.lock().unwrap_or_else(PoisonError::into_inner);
        if surfaces
            .get(&self.id)
            .is_some_and(|entry| entry.generation == self.generation)
        {
            surfaces.remove(&self.id);
        }
    }
}

thread_local! {
    /// Surfaces owned by this thread, keyed by context and surface id. A
    /// surface's engine is not `Send`, so it never leaves this table's thread.
    static LOCAL_SURFACES: RefCell<HashMap<(u64, SurfaceId), LocalSurface>> =
        RefCell::new(HashMap::new());
}

/// Drop this thread's surfaces whose context has been retired.
fn purge_dead_surfaces() {
    let dead: Vec<LocalSurface> = LOCAL_SURFACES
        .try_with(|table| {
            let mut table = table.borrow_mut();
            let keys: Vec<(u64, SurfaceId)> = table
                .iter()
                .filter(|(_, local)| !local.alive.load(Ordering::Acquire))
                .map(|(key, _)| *key)
                .collect();
            keys.iter().filter_map(|key| table.remove(key)).collect()
        })
        .unwrap_or_default();
    if !dead.is_empty() {
        tracing::info!(target: "context", count = dead.len(), "disposing surfaces of a retired context");
    }
}

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Controller state: the host callback table and the registry of live
/// surfaces.
///
/// The context itself is `Sync`; each surface lives in its owning thread's
/// local table and is only reachable from there.
pub struct Context {
    id: u64,
    config: BridgeConfig,
    callbacks: Arc<HostCallbacks>,
    plugins: Arc<PluginRegistry>,
    surfaces: Arc<SurfaceTable>,
    alive: Arc<AtomicBool>,
    next_generation: AtomicU64,
}

impl Context {
    /// Context with its own empty plugin registry.
    pub fn new(config: BridgeConfig, callbacks: HostCallbacks) -> Self {
        Self::with_plugins(config, callbacks, Arc::new(PluginRegistry::new()))
    }

    pub fn with_plugins(
        config: BridgeConfig,
        callbacks: HostCallbacks,
        plugins: Arc<PluginRegistry>,
    ) -> Self {
        let id = NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed);
        tracing::info!(target: "context", context = id, engine = ?config.engine, "context initialized");
        Self {
            id,
            config,
            callbacks: Arc::new(callbacks),
            plugins,
            surfaces: Arc::new(Mutex::new(HashMap::new())),
            alive: Arc::new(AtomicBool::new(true)),
            next_generation: AtomicU64::new(1),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn plugins(&self) -> &PluginRegistry {
        &self.plugins
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Live surfaces across all threads.
    pub fn surface_count(&self) -> usize {
        self.lock_surfaces().len()
    }

    /// Create a surface bound to the calling thread. Duplicate ids are
    /// rejected.
    pub fn create_surface(&self, id: SurfaceId) -> Result<SurfaceHandle, BridgeError> {
        purge_dead_surfaces();
        if !self.is_alive() {
            return Err(self.violation(BridgeError::StaleHandle(id)));
        }
        if self.lock_surfaces().contains_key(&id) {
            return Err(self.violation(BridgeError::DuplicateSurface(id)));
        }

        self.plugins.seal();
        let mut surface = Surface::new(id, &self.config, Arc::clone(&self.callbacks))?;
        surface.load_plugins(&self.plugins);

        let owner = thread::current().id();
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        {
            let mut surfaces = self.lock_surfaces();
            if surfaces.contains_key(&id) {
                drop(surfaces);
                return Err(self.violation(BridgeError::DuplicateSurface(id)));
            }
            surfaces.insert(id, SurfaceEntry { owner, generation });
        }
        let local = LocalSurface {
            id,
            alive: Arc::clone(&self.alive),
            generation,
            registry: Arc::downgrade(&self.surfaces),
            surface: Rc::new(RefCell::new(surface)),
        };
        let replaced = LOCAL_SURFACES.with(|table| table.borrow_mut().insert((self.id, id), local));
        drop(replaced);

        tracing::debug!(target: "context", context = self.id, surface = %id, ?owner, "surface registered");
        Ok(SurfaceHandle {
            context: self.id,
            surface: id,
            generation,
        })
    }

    /// Run `f` on the surface after the affinity check. Nothing is touched
    /// when the check fails.
    pub fn with_surface<T>(
        &self,
        handle: SurfaceHandle,
        f: impl FnOnce(&mut Surface) -> T,
    ) -> Result<T, BridgeError> {
        let surface = self.check_handle(handle)?;
        let mut surface = surface
            .try_borrow_mut()
            .map_err(|_| self.violation(BridgeError::SurfaceBusy(handle.surface)))?;
        Ok(f(&mut surface))
    }

    /// Release the surface's engine, DOM and command buffer. A second call
    /// with the same handle reports a stale handle.
    pub fn dispose_surface(&self, handle: SurfaceHandle) -> Result<(), BridgeError> {
        let surface = self.check_handle(handle)?;
        if surface.try_borrow_mut().is_err() {
            return Err(self.violation(BridgeError::SurfaceBusy(handle.surface)));
        }
        drop(surface);
        let removed = LOCAL_SURFACES.with(|table| table.borrow_mut().remove(&(self.id, handle.surface)));
        drop(removed);
        tracing::debug!(target: "context", context = self.id, surface = %handle.surface, "surface disposed");
        Ok(())
    }

    /// Mark the context dead. Surfaces on the calling thread are dropped now;
    /// those on other threads when their thread next enters the bridge or
    /// exits. Every handle of this context becomes stale.
    pub fn retire(&self) {
        if !self.alive.swap(false, Ordering::AcqRel) {
            return;
        }
        let remaining = {
            let mut surfaces = self.lock_surfaces();
            let remaining = surfaces.len();
            surfaces.clear();
            remaining
        };
        purge_dead_surfaces();
        tracing::info!(target: "context", context = self.id, surfaces = remaining, "context retired");
    }

    fn check_handle(&self, handle: SurfaceHandle) -> Result<Rc<RefCell<Surface>>, BridgeError> {
        purge_dead_surfaces();
        let id = handle.surface;
        if handle.context != self.id || !self.is_alive() {
            return Err(self.violation(BridgeError::StaleHandle(id)));
        }
        let owner = self
            .lock_surfaces()
            .get(&id)
            .filter(|entry| entry.generation == handle.generation)
            .map(|entry| entry.owner);
        let Some(owner) = owner else {
            return Err(self.violation(BridgeError::StaleHandle(id)));
        };
        if owner != thread::current().id() {
            return Err(self.violation(BridgeError::WrongThread(id)));
        }
        LOCAL_SURFACES
            .with(|table| {
                table
                    .borrow()
                    .get(&(self.id, id))
                    .filter(|local| local.generation == handle.generation)
                    .map(|local| Rc::clone(&local.surface))
            })
            .ok_or_else(|| self.violation(BridgeError::StaleHandle(id)))
    }

    fn violation(&self, err: BridgeError) -> BridgeError {
        violation(self.config.violation_policy, err)
    }

    fn lock_surfaces(&self) -> std::sync::MutexGuard<'_, HashMap<SurfaceId, SurfaceEntry>> {
        self.surfaces.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        self.retire();
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("id", &self.id)
            .field("alive", &self.is_alive())
            .field("surfaces", &self.surface_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineKind;

    fn context() -> Context {
        Context::new(
            BridgeConfig::default()
                .with_engine(EngineKind::Headless)
                .with_violation_policy(ViolationPolicy::Report),
            HostCallbacks::new(),
        )
    }

    #[test]
    fn duplicate_surface_id_is_rejected() {
        let context = context();
        context.create_surface(SurfaceId(1)).unwrap();
        let err = context.create_surface(SurfaceId(1)).unwrap_err();
        assert_eq!(err, BridgeError::DuplicateSurface(SurfaceId(1)));
        assert!(err.is_violation());
        assert_eq!(context.surface_count(), 1);
    }

    #[test]
    fn disposed_handle_is_stale() {
        let context = context();
        let handle = context.create_surface(SurfaceId(2)).unwrap();
        context.dispose_surface(handle).unwrap();
        assert_eq!(context.surface_count(), 0);
        assert_eq!(
            context.dispose_surface(handle).unwrap_err(),
            BridgeError::StaleHandle(SurfaceId(2))
        );
        // The id is free again, and the old handle stays stale.
        let fresh = context.create_surface(SurfaceId(2)).unwrap();
        assert_ne!(fresh, handle);
        assert!(context.with_surface(handle, |_| ()).is_err());
    }

    #[test]
    fn retire_sweeps_surfaces() {
        let context = context();
        let handle = context.create_surface(SurfaceId(3)).unwrap();
        context.retire();
        assert_eq!(context.surface_count(), 0);
        assert_eq!(
            context.with_surface(handle, |_| ()).unwrap_err(),
            BridgeError::StaleHandle(SurfaceId(3))
        );
    }

    #[test]
    fn creation_seals_plugins() {
        let context = context();
        context.create_surface(SurfaceId(4)).unwrap();
        assert!(context.plugins().is_sealed());
    }

    #[test]
    fn module_calls_without_handler_return_null() {
        let callbacks = HostCallbacks::new();
        assert_eq!(
            callbacks.invoke_module(SurfaceId(1), "m", "x", &NativeValue::Null),
            NativeValue::Null
        );
    }
}
