//! Value types that cross the host boundary and the per-surface command log.

pub mod command;
pub mod command_buffer;
pub mod native_string;
pub mod native_value;

pub use command::{AuxHandle, Command, CommandType, SurfaceId, TargetId};
pub use command_buffer::{decode_commands, CommandBuffer, CommandError, WireError};
pub use native_string::NativeString;
pub use native_value::NativeValue;
