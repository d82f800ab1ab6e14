//! Static table of known mailbox commands.
//!
//! Command ids are ABI: their numeric values and order match the kernel's
//! `CXL_MEM_COMMAND_ID_*` enumeration and never change. Adding a command means appending a
//! row here and bumping [`CommandId::Max`].

use bitflags::bitflags;
use cxl_uapi::{
    CXL_MEM_COMMAND_FLAG_KERNEL, CXL_MEM_COMMAND_FLAG_MUTEX, CXL_MEM_COMMAND_ID_GET_LOG,
    CXL_MEM_COMMAND_ID_GET_SUPPORTED_LOGS, CXL_MEM_COMMAND_ID_IDENTIFY,
    CXL_MEM_COMMAND_ID_INVALID, CXL_MEM_COMMAND_ID_MAX, CXL_MEM_COMMAND_ID_RAW,
    CXL_VARIABLE_PAYLOAD,
};

use crate::error::{CxlError, Result};

bitflags! {
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct CommandFlags: u32 {
        /// Reserved for exclusive kernel use.
        const KERNEL_ONLY = CXL_MEM_COMMAND_FLAG_KERNEL;
        /// Needs external serialisation against other MUTEX commands on the same device.
        const REQUIRES_MUTEX = CXL_MEM_COMMAND_FLAG_MUTEX;
    }
}

#[repr(u32)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum CommandId {
    Invalid = CXL_MEM_COMMAND_ID_INVALID,
    Identify = CXL_MEM_COMMAND_ID_IDENTIFY,
    Raw = CXL_MEM_COMMAND_ID_RAW,
    GetSupportedLogs = CXL_MEM_COMMAND_ID_GET_SUPPORTED_LOGS,
    GetLog = CXL_MEM_COMMAND_ID_GET_LOG,
    /// End of the catalog; never dispatchable.
    Max = CXL_MEM_COMMAND_ID_MAX,
}

impl CommandId {
    pub fn from_u32(id: u32) -> Option<Self> {
        Some(match id {
            CXL_MEM_COMMAND_ID_INVALID => CommandId::Invalid,
            CXL_MEM_COMMAND_ID_IDENTIFY => CommandId::Identify,
            CXL_MEM_COMMAND_ID_RAW => CommandId::Raw,
            CXL_MEM_COMMAND_ID_GET_SUPPORTED_LOGS => CommandId::GetSupportedLogs,
            CXL_MEM_COMMAND_ID_GET_LOG => CommandId::GetLog,
            CXL_MEM_COMMAND_ID_MAX => CommandId::Max,
            _ => return None,
        })
    }

    pub const fn as_u32(self) -> u32 {
        self as u32
    }

    /// Whether a request may ever carry this id.
    pub const fn is_dispatchable(id: u32) -> bool {
        id != CXL_MEM_COMMAND_ID_INVALID && id != CXL_MEM_COMMAND_ID_MAX
    }
}

impl From<CommandId> for u32 {
    fn from(id: CommandId) -> u32 {
        id.as_u32()
    }
}

/// Expected payload length for one direction of a command.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum PayloadSize {
    Fixed(u32),
    Variable,
}

impl PayloadSize {
    /// Decodes the wire value (`-1` is variable; anything below is malformed).
    pub fn from_wire(v: i32) -> Option<Self> {
        match v {
            CXL_VARIABLE_PAYLOAD => Some(PayloadSize::Variable),
            n if n >= 0 => Some(PayloadSize::Fixed(n as u32)),
            _ => None,
        }
    }

    pub fn to_wire(self) -> i32 {
        match self {
            PayloadSize::Fixed(n) => i32::try_from(n).unwrap_or(i32::MAX),
            PayloadSize::Variable => CXL_VARIABLE_PAYLOAD,
        }
    }

    pub fn fixed(self) -> Option<u32> {
        match self {
            PayloadSize::Fixed(n) => Some(n),
            PayloadSize::Variable => None,
        }
    }

    pub fn is_variable(self) -> bool {
        matches!(self, PayloadSize::Variable)
    }
}

/// Metadata for one command: how to call it and what sizes the device expects.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct CommandDescriptor {
    pub id: u32,
    pub name: &'static str,
    pub flags: CommandFlags,
    pub size_in: PayloadSize,
    pub size_out: PayloadSize,
}

impl CommandDescriptor {
    const fn new(
        id: CommandId,
        name: &'static str,
        size_in: PayloadSize,
        size_out: PayloadSize,
    ) -> Self {
        Self {
            id: id.as_u32(),
            name,
            flags: CommandFlags::empty(),
            size_in,
            size_out,
        }
    }

    pub fn command_id(&self) -> Option<CommandId> {
        CommandId::from_u32(self.id)
    }

    pub fn requires_mutex(&self) -> bool {
        self.flags.contains(CommandFlags::REQUIRES_MUTEX)
    }

    pub fn kernel_only(&self) -> bool {
        self.flags.contains(CommandFlags::KERNEL_ONLY)
    }
}

/// Display name for ids the catalog does not know (newer kernels may report them).
pub const UNKNOWN_COMMAND_NAME: &str = "Unknown Command";

/// Size of the Identify Memory Device output payload.
pub const IDENTIFY_OUTPUT_SIZE: u32 = 0x43;
/// Size of the Get Log input payload (UUID, offset, length).
pub const GET_LOG_INPUT_SIZE: u32 = 0x18;

static CATALOG: [CommandDescriptor; CXL_MEM_COMMAND_ID_MAX as usize] = [
    CommandDescriptor::new(
        CommandId::Invalid,
        "Invalid Command",
        PayloadSize::Fixed(0),
        PayloadSize::Fixed(0),
    ),
    CommandDescriptor::new(
        CommandId::Identify,
        "Identify Command",
        PayloadSize::Fixed(0),
        PayloadSize::Fixed(IDENTIFY_OUTPUT_SIZE),
    ),
    CommandDescriptor::new(
        CommandId::Raw,
        "Raw device command",
        PayloadSize::Variable,
        PayloadSize::Variable,
    ),
    CommandDescriptor::new(
        CommandId::GetSupportedLogs,
        "Get Supported Logs",
        PayloadSize::Fixed(0),
        PayloadSize::Variable,
    ),
    CommandDescriptor::new(
        CommandId::GetLog,
        "Get Log",
        PayloadSize::Fixed(GET_LOG_INPUT_SIZE),
        PayloadSize::Variable,
    ),
];

/// All catalog entries in id order (the `Max` sentinel is not an entry).
pub fn catalog() -> &'static [CommandDescriptor] {
    &CATALOG
}

pub fn lookup(id: u32) -> Result<&'static CommandDescriptor> {
    CATALOG
        .get(id as usize)
        .ok_or(CxlError::NotFound { id })
}

/// Catalog name for `id`, or [`UNKNOWN_COMMAND_NAME`].
pub fn command_name(id: u32) -> &'static str {
    lookup(id).map(|d| d.name).unwrap_or(UNKNOWN_COMMAND_NAME)
}
