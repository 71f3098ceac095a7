use thiserror::Error;

use super::command::{AuxHandle, Command, CommandType, SurfaceId, TargetId};
use super::native_string::NativeString;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("{0:?} is not a creation command and cannot carry an aux handle")]
    AuxOnNonCreation(CommandType),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WireError {
    #[error("command stream truncated at byte {0}")]
    Truncated(usize),
    #[error("unknown command type code {0}")]
    UnknownType(u32),
}

/// Append-only, per-surface log of mutation commands.
///
/// There is exactly one producer (the surface thread), so entries are kept in
/// call order and never coalesced. The host reads the whole log through
/// [`CommandBuffer::data`] and then calls [`CommandBuffer::clear`]; nothing
/// bounds the growth between drains.
#[derive(Debug, Default)]
pub struct CommandBuffer {
    entries: Vec<Command>,
}

impl CommandBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
        }
    }

    /// Append one command. The buffer takes ownership of `args`, which the
    /// caller has already copied out of any script-owned storage.
    pub fn append(
        &mut self,
        target: TargetId,
        kind: CommandType,
        args: Vec<NativeString>,
        aux: Option<AuxHandle>,
    ) -> Result<(), CommandError> {
        if aux.is_some() && !kind.is_creation() {
            return Err(CommandError::AuxOnNonCreation(kind));
        }
        tracing::trace!(target: "bridge", node = %target, ?kind, argc = args.len(), "queue command");
        self.entries.push(Command {
            target,
            kind,
            args,
            aux,
        });
        Ok(())
    }

    pub fn size(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Zero-copy view for the host. The borrow keeps the buffer from being
    /// appended to or reallocated until the read is done.
    pub fn data(&self) -> &[Command] {
        &self.entries
    }

    /// Free every entry payload and reset to empty.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Read and clear in one step.
    pub fn take(&mut self) -> Vec<Command> {
        std::mem::take(&mut self.entries)
    }

    /// Serialize the pending commands into the binary wire format:
    ///
    /// ```text
    /// u32 count
    /// per command:
    ///   u64 target | u32 type | u32 argc
    ///   argc x (u32 len | len x u16)
    ///   u8 has_aux [| i32 surface | u64 target]
    /// ```
    ///
    /// All integers are little endian.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(4 + self.entries.len() * 32);
        out.extend_from_slice(&(self.entries.len() as u32).to_le_bytes());
        for command in &self.entries {
            out.extend_from_slice(&command.target.get().to_le_bytes());
            out.extend_from_slice(&command.kind.code().to_le_bytes());
            out.extend_from_slice(&(command.args.len() as u32).to_le_bytes());
            for arg in &command.args {
                out.extend_from_slice(&(arg.len() as u32).to_le_bytes());
                for unit in arg.as_utf16() {
                    out.extend_from_slice(&unit.to_le_bytes());
                }
            }
            match command.aux {
                Some(aux) => {
                    out.push(1);
                    out.extend_from_slice(&aux.surface.0.to_le_bytes());
                    out.extend_from_slice(&aux.target.get().to_le_bytes());
                }
                None => out.push(0),
            }
        }
        out
    }
}

/// Decode a stream produced by [`CommandBuffer::encode`].
pub fn decode_commands(bytes: &[u8]) -> Result<Vec<Command>, WireError> {
    let mut reader = WireReader { bytes, offset: 0 };
    let count = reader.u32()?;
    let mut commands = Vec::with_capacity(count.min(4096) as usize);
    for _ in 0..count {
        let target = TargetId(reader.u64()?);
        let code = reader.u32()?;
        let kind = CommandType::from_code(code).ok_or(WireError::UnknownType(code))?;
        let argc = reader.u32()?;
        let mut args = Vec::with_capacity(argc.min(64) as usize);
        for _ in 0..argc {
            let len = reader.u32()? as usize;
            let mut units = Vec::with_capacity(len.min(4096));
            for _ in 0..len {
                units.push(reader.u16()?);
            }
            args.push(NativeString::from(units));
        }
        let aux = match reader.u8()? {
            0 => None,
            _ => Some(AuxHandle {
                surface: SurfaceId(reader.i32()?),
                target: TargetId(reader.u64()?),
            }),
        };
        commands.push(Command {
            target,
            kind,
            args,
            aux,
        });
    }
    Ok(commands)
}

struct WireReader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl WireReader<'_> {
    fn take<const N: usize>(&mut self) -> Result<[u8; N], WireError> {
        let end = self.offset + N;
        let slice = self
            .bytes
            .get(self.offset..end)
            .ok_or(WireError::Truncated(self.offset))?;
        self.offset = end;
        let mut buf = [0u8; N];
        buf.copy_from_slice(slice);
        Ok(buf)
    }

    fn u8(&mut self) -> Result<u8, WireError> {
        Ok(self.take::<1>()?[0])
    }

    fn u16(&mut self) -> Result<u16, WireError> {
        Ok(u16::from_le_bytes(self.take()?))
    }

    fn u32(&mut self) -> Result<u32, WireError> {
        Ok(u32::from_le_bytes(self.take()?))
    }

    fn i32(&mut self) -> Result<i32, WireError> {
        Ok(i32::from_le_bytes(self.take()?))
    }

    fn u64(&mut self) -> Result<u64, WireError> {
        Ok(u64::from_le_bytes(self.take()?))
    }
}
