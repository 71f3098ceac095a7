//! Process-wide host boundary.
//!
//! The host initializes one [`Context`] from its controller thread, then
//! creates and drives surfaces through the functions here. Every function
//! taking a [`SurfaceHandle`] runs the thread-affinity check first.

use std::sync::{Arc, OnceLock, PoisonError, RwLock};
use std::thread::{self, ThreadId};

use crate::config::BridgeConfig;
use crate::context::{self, BridgeError, Context, HostCallbacks, SurfaceHandle};
use crate::foundation::{Command, NativeString, NativeValue, SurfaceId, TargetId};
use crate::info::{self, RuntimeInfo};
use crate::plugin;
use crate::surface::Surface;

static CONTEXT: RwLock<Option<Arc<Context>>> = RwLock::new(None);
static CONTROLLER: OnceLock<ThreadId> = OnceLock::new();

/// Create the process-wide context, or replace it on hot restart. The first
/// caller becomes the controller thread; later calls must come from it.
pub fn init_context(config: BridgeConfig, callbacks: HostCallbacks) -> Result<(), BridgeError> {
    let current = thread::current().id();
    if *CONTROLLER.get_or_init(|| current) != current {
        return Err(context::violation(
            config.violation_policy,
            BridgeError::NotController,
        ));
    }
    let fresh = Arc::new(Context::with_plugins(config, callbacks, plugin::global()));
    let previous = CONTEXT
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .replace(fresh);
    if let Some(previous) = previous {
        tracing::info!(target: "context", context = previous.id(), "hot restart, retiring previous context");
        previous.retire();
    }
    Ok(())
}

/// The live context.
pub fn context() -> Result<Arc<Context>, BridgeError> {
    CONTEXT
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .as_ref()
        .map(Arc::clone)
        .ok_or(BridgeError::NotInitialized)
}

fn with_surface<T>(
    handle: SurfaceHandle,
    f: impl FnOnce(&mut Surface) -> T,
) -> Result<T, BridgeError> {
    context()?.with_surface(handle, f)
}

pub fn create_surface(id: SurfaceId) -> Result<SurfaceHandle, BridgeError> {
    context()?.create_surface(id)
}

pub fn dispose_surface(handle: SurfaceHandle) -> Result<(), BridgeError> {
    context()?.dispose_surface(handle)
}

/// `source` is copied before evaluation; `None` evaluates an empty script.
pub fn evaluate_script(
    handle: SurfaceHandle,
    source: Option<&[u16]>,
    url: &str,
    start_line: i32,
) -> Result<bool, BridgeError> {
    let source = NativeString::from_raw(source);
    with_surface(handle, |surface| {
        surface.evaluate_script(&source, url, start_line)
    })
}

pub fn evaluate_byte_code(handle: SurfaceHandle, bytes: &[u8]) -> Result<bool, BridgeError> {
    with_surface(handle, |surface| surface.evaluate_byte_code(bytes))
}

pub fn parse_markup(handle: SurfaceHandle, markup: &[u8]) -> Result<bool, BridgeError> {
    let markup = String::from_utf8_lossy(markup);
    with_surface(handle, |surface| surface.parse_markup(&markup))
}

pub fn invoke_module_event(
    handle: SurfaceHandle,
    module: Option<&[u16]>,
    event_type: &str,
    event: Option<TargetId>,
    extra: &NativeValue,
) -> Result<NativeValue, BridgeError> {
    let module = NativeString::from_raw(module);
    with_surface(handle, |surface| {
        surface.invoke_module_event(&module, event_type, event, extra)
    })
}

/// Read the pending commands without copying them. Follow with
/// [`clear_command_items`].
pub fn with_command_items<T>(
    handle: SurfaceHandle,
    f: impl FnOnce(&[Command]) -> T,
) -> Result<T, BridgeError> {
    with_surface(handle, |surface| surface.with_commands(f))
}

pub fn command_item_size(handle: SurfaceHandle) -> Result<usize, BridgeError> {
    with_surface(handle, |surface| surface.command_count())
}

pub fn clear_command_items(handle: SurfaceHandle) -> Result<(), BridgeError> {
    with_surface(handle, Surface::clear_commands)
}

pub fn take_command_items(handle: SurfaceHandle) -> Result<Vec<Command>, BridgeError> {
    with_surface(handle, Surface::take_commands)
}

/// Pending commands in the binary wire format.
pub fn encode_command_items(handle: SurfaceHandle) -> Result<Vec<u8>, BridgeError> {
    with_surface(handle, |surface| surface.encode_commands())
}

/// Run a host task against the surface on its own thread.
pub fn dispatch_ui_task<T>(
    handle: SurfaceHandle,
    task: impl FnOnce(&mut Surface) -> T,
) -> Result<T, BridgeError> {
    with_surface(handle, |surface| {
        tracing::trace!(target: "surface", surface = %surface.id(), "ui task");
        task(surface)
    })
}

pub fn register_plugin_byte_code(name: &str, bytes: &[u8]) -> Result<(), BridgeError> {
    plugin::global().register_byte_code(name, bytes)
}

pub fn register_plugin_source(name: &str, source: Option<&[u16]>) -> Result<(), BridgeError> {
    plugin::global().register_source(name, NativeString::from_raw(source))
}

pub fn runtime_info() -> &'static RuntimeInfo {
    info::runtime_info()
}

pub fn profile_mode_enabled() -> bool {
    cfg!(feature = "profile")
}
