//! Command bridge between an embedded script engine and a host renderer.
//!
//! Script running in a [`Surface`] mutates a DOM whose nodes are paired with
//! native shadow instances; every structural or style mutation is appended
//! to the surface's command buffer, which the host drains on its own
//! schedule.

pub mod api;
pub mod binding;
pub mod config;
pub mod context;
pub mod css;
pub mod dom;
pub mod engine;
pub mod foundation;
pub mod info;
pub mod markup;
pub mod plugin;
pub mod surface;

pub use binding::{DomState, ScriptEngine, ScriptError};
pub use config::{BridgeConfig, ConfigError, ViolationPolicy};
pub use context::{BridgeError, Context, HostCallbacks, SurfaceHandle};
pub use engine::EngineKind;
pub use foundation::{
    decode_commands, Command, CommandBuffer, CommandType, NativeString, NativeValue, SurfaceId,
    TargetId,
};
pub use info::{runtime_info, RuntimeInfo};
pub use surface::Surface;
