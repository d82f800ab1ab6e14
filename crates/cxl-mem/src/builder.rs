//! Building and validating outbound commands.
//!
//! Every check happens here, before anything touches the transport. A successful build
//! yields an immutable request: [`CatalogCommand`] for ids validated against a
//! [`SupportedCommandSet`], or [`RawCommand`] for vendor opcodes. The two are distinct types
//! and nothing converts one into the other.

use cxl_uapi::{
    CxlSendCommand, CXL_MEM_COMMAND_FLAG_MASK, CXL_MEM_COMMAND_ID_RAW, CXL_VARIABLE_PAYLOAD,
};

use crate::catalog::{CommandDescriptor, CommandFlags, CommandId, PayloadSize};
use crate::error::{PayloadDirection, ValidationError};
use crate::query::SupportedCommandSet;

/// Largest mailbox payload the driver accepts in either direction (1 MiB).
pub const MAX_PAYLOAD_BYTES: usize = 1 << 20;

/// Accumulates the pieces of one command before validation.
#[derive(Debug, Clone)]
pub struct CommandBuilder {
    id: u32,
    flags: u32,
    raw_opcode: Option<u16>,
    payload_in: Vec<u8>,
    size_in_variable: bool,
    out_capacity: usize,
}

impl CommandBuilder {
    pub fn new(id: impl Into<u32>) -> Self {
        Self {
            id: id.into(),
            flags: 0,
            raw_opcode: None,
            payload_in: Vec::new(),
            size_in_variable: false,
            out_capacity: 0,
        }
    }

    /// Starts a raw passthrough command for a vendor `opcode`.
    ///
    /// Raw commands skip every catalog size check: the caller alone is responsible for the
    /// payload layout the device expects.
    pub fn raw(opcode: u16) -> Self {
        Self::new(CommandId::Raw).raw_opcode(opcode)
    }

    /// Request flag bits. Only bits 0 and 1 are defined; anything else is rejected.
    pub fn flags(mut self, bits: u32) -> Self {
        self.flags = bits;
        self
    }

    pub fn raw_opcode(mut self, opcode: u16) -> Self {
        self.raw_opcode = Some(opcode);
        self
    }

    pub fn payload_in(mut self, payload: impl Into<Vec<u8>>) -> Self {
        self.payload_in = payload.into();
        self
    }

    /// Sends `size_in` as -1 so the device decides the input length.
    ///
    /// Only accepted for commands whose input size is variable, and only with no input payload
    /// attached.
    pub fn size_in_variable(mut self) -> Self {
        self.size_in_variable = true;
        self
    }

    /// Bytes reserved for the device's output.
    pub fn out_capacity(mut self, capacity: usize) -> Self {
        self.out_capacity = capacity;
        self
    }

    /// Validates against the commands `supported` by the target device.
    ///
    /// Checks run in a fixed order: unknown id, size mismatch, short output buffer, reserved
    /// fields. Raw commands skip the first three and never consult `supported`.
    pub fn build(
        self,
        supported: &SupportedCommandSet,
    ) -> Result<CommandRequest, ValidationError> {
        if self.id == CXL_MEM_COMMAND_ID_RAW {
            return self.build_raw().map(CommandRequest::Raw);
        }

        let id = self.id;
        let descriptor = match supported.get(id) {
            Some(desc) if CommandId::is_dispatchable(id) => *desc,
            _ => return Err(ValidationError::UnknownCommand { id }),
        };

        if self.size_in_variable {
            check_variable_input(id, descriptor.size_in, self.payload_in.len())?;
        }
        check_fixed_sizes(&descriptor, self.payload_in.len(), self.out_capacity)?;
        check_payload_limits(id, self.payload_in.len(), self.out_capacity)?;
        let flags = check_flags(id, self.flags)?;
        if let Some(opcode) = self.raw_opcode {
            return Err(ValidationError::ReservedFieldNonzero {
                id,
                field: "rsvd",
                value: u32::from(opcode),
            });
        }

        Ok(CommandRequest::Catalog(CatalogCommand {
            descriptor,
            flags,
            payload_in: self.payload_in,
            size_in_variable: self.size_in_variable,
            out_capacity: self.out_capacity,
        }))
    }

    /// Builds a raw passthrough command. The id must be `RAW` and an opcode must be set.
    pub fn build_raw(self) -> Result<RawCommand, ValidationError> {
        let id = self.id;
        if id != CXL_MEM_COMMAND_ID_RAW {
            return Err(ValidationError::UnknownCommand { id });
        }
        let opcode = self.raw_opcode.ok_or(ValidationError::MissingRawOpcode)?;
        if self.size_in_variable {
            check_variable_input(id, PayloadSize::Variable, self.payload_in.len())?;
        }
        check_payload_limits(id, self.payload_in.len(), self.out_capacity)?;
        let flags = check_flags(id, self.flags)?;

        Ok(RawCommand {
            opcode,
            flags,
            payload_in: self.payload_in,
            size_in_variable: self.size_in_variable,
            out_capacity: self.out_capacity,
        })
    }
}

/// Shorthand for `CommandBuilder::new(id).payload_in(..).out_capacity(..).build(supported)`.
pub fn build(
    supported: &SupportedCommandSet,
    id: impl Into<u32>,
    payload_in: Option<Vec<u8>>,
    out_capacity: usize,
) -> Result<CommandRequest, ValidationError> {
    CommandBuilder::new(id)
        .payload_in(payload_in.unwrap_or_default())
        .out_capacity(out_capacity)
        .build(supported)
}

/// A device-decided input length needs a variable-size descriptor and an empty payload.
fn check_variable_input(
    id: u32,
    size_in: PayloadSize,
    len_in: usize,
) -> Result<(), ValidationError> {
    let expected = match size_in {
        PayloadSize::Fixed(expected) => expected,
        PayloadSize::Variable if len_in == 0 => return Ok(()),
        PayloadSize::Variable => 0,
    };
    Err(ValidationError::SizeMismatch {
        id,
        which: PayloadDirection::In,
        expected,
        actual: len_in,
    })
}

fn check_fixed_sizes(
    desc: &CommandDescriptor,
    len_in: usize,
    out_capacity: usize,
) -> Result<(), ValidationError> {
    if let PayloadSize::Fixed(expected) = desc.size_in {
        if len_in != expected as usize {
            return Err(ValidationError::SizeMismatch {
                id: desc.id,
                which: PayloadDirection::In,
                expected,
                actual: len_in,
            });
        }
    }
    if let PayloadSize::Fixed(required) = desc.size_out {
        let required_len = required as usize;
        if out_capacity < required_len {
            return Err(ValidationError::BufferTooSmall {
                id: desc.id,
                required,
                capacity: out_capacity,
            });
        }
        if out_capacity > required_len {
            return Err(ValidationError::SizeMismatch {
                id: desc.id,
                which: PayloadDirection::Out,
                expected: required,
                actual: out_capacity,
            });
        }
    }
    Ok(())
}

fn check_payload_limits(
    id: u32,
    len_in: usize,
    out_capacity: usize,
) -> Result<(), ValidationError> {
    for (which, len) in [
        (PayloadDirection::In, len_in),
        (PayloadDirection::Out, out_capacity),
    ] {
        if len > MAX_PAYLOAD_BYTES {
            return Err(ValidationError::PayloadTooLarge {
                id,
                which,
                len,
                max: MAX_PAYLOAD_BYTES,
            });
        }
    }
    Ok(())
}

fn check_flags(id: u32, bits: u32) -> Result<CommandFlags, ValidationError> {
    let reserved = bits & CXL_MEM_COMMAND_FLAG_MASK;
    if reserved != 0 {
        return Err(ValidationError::ReservedFieldNonzero {
            id,
            field: "flags",
            value: reserved,
        });
    }
    Ok(CommandFlags::from_bits_truncate(bits))
}

/// A request validated against the device's supported command set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogCommand {
    descriptor: CommandDescriptor,
    flags: CommandFlags,
    payload_in: Vec<u8>,
    size_in_variable: bool,
    out_capacity: usize,
}

impl CatalogCommand {
    pub fn id(&self) -> u32 {
        self.descriptor.id
    }

    /// The device-reported descriptor this request was validated against.
    pub fn descriptor(&self) -> &CommandDescriptor {
        &self.descriptor
    }

    pub fn flags(&self) -> CommandFlags {
        self.flags
    }

    pub fn payload_in(&self) -> &[u8] {
        &self.payload_in
    }

    pub fn out_capacity(&self) -> usize {
        self.out_capacity
    }
}

/// A vendor-opcode passthrough request. No catalog validation was applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawCommand {
    opcode: u16,
    flags: CommandFlags,
    payload_in: Vec<u8>,
    size_in_variable: bool,
    out_capacity: usize,
}

impl RawCommand {
    pub fn opcode(&self) -> u16 {
        self.opcode
    }

    pub fn flags(&self) -> CommandFlags {
        self.flags
    }

    pub fn payload_in(&self) -> &[u8] {
        &self.payload_in
    }

    pub fn out_capacity(&self) -> usize {
        self.out_capacity
    }
}

/// A built request, ready for [`crate::submit`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandRequest {
    Catalog(CatalogCommand),
    Raw(RawCommand),
}

impl CommandRequest {
    pub fn id(&self) -> u32 {
        match self {
            CommandRequest::Catalog(cmd) => cmd.id(),
            CommandRequest::Raw(_) => CXL_MEM_COMMAND_ID_RAW,
        }
    }

    pub fn is_raw(&self) -> bool {
        matches!(self, CommandRequest::Raw(_))
    }

    pub fn flags(&self) -> CommandFlags {
        match self {
            CommandRequest::Catalog(cmd) => cmd.flags,
            CommandRequest::Raw(cmd) => cmd.flags,
        }
    }

    pub fn payload_in(&self) -> &[u8] {
        match self {
            CommandRequest::Catalog(cmd) => &cmd.payload_in,
            CommandRequest::Raw(cmd) => &cmd.payload_in,
        }
    }

    pub fn out_capacity(&self) -> usize {
        match self {
            CommandRequest::Catalog(cmd) => cmd.out_capacity,
            CommandRequest::Raw(cmd) => cmd.out_capacity,
        }
    }

    /// The `size_in` value sent to the driver: the payload length, or -1 when the device
    /// decides.
    pub fn size_in(&self) -> i32 {
        let variable = match self {
            CommandRequest::Catalog(cmd) => cmd.size_in_variable,
            CommandRequest::Raw(cmd) => cmd.size_in_variable,
        };
        if variable {
            CXL_VARIABLE_PAYLOAD
        } else {
            // Bounded by MAX_PAYLOAD_BYTES at build time.
            self.payload_in().len() as i32
        }
    }

    /// Encodes the send structure. Payload address fields stay zero.
    pub(crate) fn to_wire(&self) -> CxlSendCommand {
        let mut cmd = CxlSendCommand {
            id: self.id(),
            flags: self.flags().bits(),
            size_in: self.size_in(),
            size_out: self.out_capacity() as i32,
            ..Default::default()
        };
        if let CommandRequest::Raw(raw) = self {
            cmd.set_raw(raw.opcode, 0);
        }
        cmd
    }
}

impl From<CatalogCommand> for CommandRequest {
    fn from(cmd: CatalogCommand) -> Self {
        CommandRequest::Catalog(cmd)
    }
}

impl From<RawCommand> for CommandRequest {
    fn from(cmd: RawCommand) -> Self {
        CommandRequest::Raw(cmd)
    }
}
