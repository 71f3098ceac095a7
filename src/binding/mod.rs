//! Script object binding: host class descriptors, the engine adapter trait
//! and the DOM state every backend dispatches into.

pub mod engine;
pub mod heap;
pub mod host_class;
pub mod state;

pub use engine::{install, ScriptEngine, ScriptError};
pub use heap::{Atom, AtomTable, ScriptHeap, StringArena};
pub use host_class::{ClassDescriptor, ClassId, ClassRegistry, HostClass};
pub use state::{BindingScope, DomState};
