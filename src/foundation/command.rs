use std::fmt;

use serde::{Deserialize, Serialize};

use super::native_string::NativeString;

/// Host-assigned surface identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SurfaceId(pub i32);

impl fmt::Display for SurfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Surface-local node address used in the command stream. Allocated
/// monotonically and never reused while the surface lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TargetId(pub u64);

impl TargetId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque back-reference to the native event target, handed to the host on
/// creation commands so it can address events to that node later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AuxHandle {
    pub surface: SurfaceId,
    pub target: TargetId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CommandType {
    CreateElement,
    CreateTextNode,
    CreateComment,
    CreateDocument,
    DisposeEventTarget,
    InsertAdjacentNode,
    RemoveNode,
    SetStyle,
    SetProperty,
    RemoveProperty,
    SetAttribute,
    RemoveAttribute,
}

impl CommandType {
    const ALL: [CommandType; 12] = [
        CommandType::CreateElement,
        CommandType::CreateTextNode,
        CommandType::CreateComment,
        CommandType::CreateDocument,
        CommandType::DisposeEventTarget,
        CommandType::InsertAdjacentNode,
        CommandType::RemoveNode,
        CommandType::SetStyle,
        CommandType::SetProperty,
        CommandType::RemoveProperty,
        CommandType::SetAttribute,
        CommandType::RemoveAttribute,
    ];

    /// Creation-class commands are the only ones that may carry an [`AuxHandle`].
    pub fn is_creation(self) -> bool {
        matches!(
            self,
            CommandType::CreateElement
                | CommandType::CreateTextNode
                | CommandType::CreateComment
                | CommandType::CreateDocument
        )
    }

    pub fn code(self) -> u32 {
        self as u32
    }

    pub fn from_code(code: u32) -> Option<Self> {
        Self::ALL.get(code as usize).copied()
    }
}

/// One queued mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub target: TargetId,
    pub kind: CommandType,
    pub args: Vec<NativeString>,
    pub aux: Option<AuxHandle>,
}

impl Command {
    pub fn arg(&self, index: usize) -> Option<&NativeString> {
        self.args.get(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        for kind in CommandType::ALL {
            assert_eq!(CommandType::from_code(kind.code()), Some(kind));
        }
        assert_eq!(CommandType::from_code(99), None);
    }
}
