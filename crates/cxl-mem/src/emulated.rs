//! In-process memory device that answers both ioctls the way the kernel driver does.
//!
//! Used by the CLI when no hardware is present and by the test suites. Faults can be
//! injected to exercise the dispatcher's defensive paths.

use std::fmt;
use std::io;

use cxl_uapi::{
    CxlCommandInfo, CxlMemQueryCommands, CxlSendCommand, CXL_MEM_COMMAND_FLAG_MASK,
    CXL_MEM_QUERY_COMMANDS, CXL_MEM_SEND_COMMAND, CXL_VARIABLE_PAYLOAD,
};
use uuid::Uuid;

use crate::catalog::{catalog, CommandDescriptor, CommandId};
use crate::identify::IdentifyMemdev;
use crate::logs::{encode_supported_logs, GetLogInput, SupportedLog, CEL_UUID};
use crate::status::MboxStatus;
use crate::transport::{IoctlArg, Transport};

/// Handles a raw opcode: fills `payload_out` and returns `(retval, size_out)`.
pub type RawHandler = Box<dyn FnMut(u16, &[u8], &mut [u8]) -> (u32, usize) + Send>;

const IDENTIFY_OPCODE: u16 = 0x4000;
const GET_SUPPORTED_LOGS_OPCODE: u16 = 0x0400;
const GET_LOG_OPCODE: u16 = 0x0401;

/// Faults applied to every subsequent send until cleared.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Faults {
    /// Reported `size_out`, regardless of how much was written.
    pub size_out: Option<i32>,
    /// Fail the ioctl itself with this errno.
    pub errno: Option<i32>,
    /// Device return code to report instead of the real one.
    pub retval: Option<u32>,
}

/// A send command as the device received it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentCommand {
    pub command: CxlSendCommand,
    pub payload_in: Vec<u8>,
}

pub struct EmulatedMemdev {
    commands: Vec<CxlCommandInfo>,
    identify: IdentifyMemdev,
    logs: Vec<(Uuid, Vec<u8>)>,
    raw_handler: Option<RawHandler>,
    faults: Faults,
    sent: Vec<SentCommand>,
    queries: usize,
}

impl fmt::Debug for EmulatedMemdev {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmulatedMemdev")
            .field("commands", &self.commands.len())
            .field("identify", &self.identify)
            .field("logs", &self.logs.len())
            .field("raw_handler", &self.raw_handler.is_some())
            .field("faults", &self.faults)
            .finish()
    }
}

impl Default for EmulatedMemdev {
    fn default() -> Self {
        Self::new()
    }
}

impl EmulatedMemdev {
    /// A device exposing every dispatchable catalog command, a 1 GiB persistent
    /// capacity, and a Command Effects Log covering its opcodes.
    pub fn new() -> Self {
        let commands = catalog()
            .iter()
            .filter(|d| CommandId::is_dispatchable(d.id))
            .map(info_from_descriptor)
            .collect();
        Self {
            commands,
            identify: IdentifyMemdev {
                fw_revision: "EMU 1.0".to_string(),
                total_capacity: 1 << 30,
                persistent_only_capacity: 1 << 30,
                lsa_size: 128 * 1024,
                ..IdentifyMemdev::default()
            },
            logs: vec![(CEL_UUID, default_cel())],
            raw_handler: None,
            faults: Faults::default(),
            sent: Vec::new(),
            queries: 0,
        }
    }

    /// Replaces the advertised command list. Order is preserved in query replies.
    pub fn with_commands(mut self, commands: Vec<CxlCommandInfo>) -> Self {
        self.commands = commands;
        self
    }

    pub fn with_identify(mut self, identify: IdentifyMemdev) -> Self {
        self.identify = identify;
        self
    }

    /// Adds or replaces the log stored under `uuid`.
    pub fn with_log(mut self, uuid: Uuid, contents: Vec<u8>) -> Self {
        match self.logs.iter_mut().find(|(u, _)| *u == uuid) {
            Some(entry) => entry.1 = contents,
            None => self.logs.push((uuid, contents)),
        }
        self
    }

    pub fn with_raw_handler(
        mut self,
        handler: impl FnMut(u16, &[u8], &mut [u8]) -> (u32, usize) + Send + 'static,
    ) -> Self {
        self.raw_handler = Some(Box::new(handler));
        self
    }

    pub fn with_faults(mut self, faults: Faults) -> Self {
        self.faults = faults;
        self
    }

    pub fn set_faults(&mut self, faults: Faults) {
        self.faults = faults;
    }

    pub fn clear_faults(&mut self) {
        self.faults = Faults::default();
    }

    pub fn commands(&self) -> &[CxlCommandInfo] {
        &self.commands
    }

    pub fn identify(&self) -> &IdentifyMemdev {
        &self.identify
    }

    /// Every send command accepted by the ioctl layer, oldest first.
    pub fn sent(&self) -> &[SentCommand] {
        &self.sent
    }

    pub fn query_calls(&self) -> usize {
        self.queries
    }

    fn supported_logs(&self) -> Vec<SupportedLog> {
        self.logs
            .iter()
            .map(|(uuid, contents)| SupportedLog {
                uuid: *uuid,
                size: u32::try_from(contents.len()).unwrap_or(u32::MAX),
            })
            .collect()
    }

    fn handle_query(&mut self, buf: &mut [u8]) -> io::Result<()> {
        self.queries += 1;
        let header = CxlMemQueryCommands::read_header(buf).ok_or_else(efault)?;
        if header.rsvd != 0 {
            return Err(einval());
        }

        if header.n_commands > 0 {
            let n = (header.n_commands as usize).min(self.commands.len());
            for (index, info) in self.commands.iter().take(n).enumerate() {
                CxlMemQueryCommands::write_entry(buf, index, info).ok_or_else(efault)?;
            }
        }

        CxlMemQueryCommands {
            n_commands: u32::try_from(self.commands.len()).unwrap_or(u32::MAX),
            rsvd: 0,
        }
        .write_header(buf)
        .ok_or_else(efault)
    }

    fn handle_send(
        &mut self,
        wire: &mut [u8; CxlSendCommand::SIZE],
        payload_in: &[u8],
        payload_out: &mut [u8],
    ) -> io::Result<()> {
        let mut cmd = CxlSendCommand::from_bytes(wire);
        let info = self.validate_send(&cmd, payload_in, payload_out)?;

        self.sent.push(SentCommand {
            command: cmd,
            payload_in: payload_in.to_vec(),
        });

        if let Some(errno) = self.faults.errno {
            tracing::debug!(id = cmd.id, errno, "injected transport failure");
            return Err(io::Error::from_raw_os_error(errno));
        }

        let (retval, written) = self.execute(&cmd, info, payload_in, payload_out);
        cmd.retval = self.faults.retval.unwrap_or(retval);
        cmd.size_out = match self.faults.size_out {
            Some(size) => size,
            None => i32::try_from(written).unwrap_or(i32::MAX),
        };
        *wire = cmd.to_bytes();
        Ok(())
    }

    /// Checks the driver would make before the mailbox is touched.
    fn validate_send(
        &self,
        cmd: &CxlSendCommand,
        payload_in: &[u8],
        payload_out: &[u8],
    ) -> io::Result<CxlCommandInfo> {
        if !CommandId::is_dispatchable(cmd.id) {
            return Err(enotty());
        }
        let info = *self
            .commands
            .iter()
            .find(|c| c.id == cmd.id)
            .ok_or_else(enotty)?;

        if cmd.flags & CXL_MEM_COMMAND_FLAG_MASK != 0 {
            return Err(einval());
        }
        let reserved_ok = if cmd.id == CommandId::Raw.as_u32() {
            cmd.raw_rsvd() == 0
        } else {
            cmd.rsvd == 0
        };
        if !reserved_ok {
            return Err(einval());
        }

        // -1 lets the device decide, and only for a variable input with nothing attached.
        let size_in = match cmd.size_in {
            CXL_VARIABLE_PAYLOAD if info.size_in == CXL_VARIABLE_PAYLOAD => 0,
            n => usize::try_from(n).map_err(|_| einval())?,
        };
        let size_out = usize::try_from(cmd.size_out).map_err(|_| einval())?;
        if size_in != payload_in.len() || size_out != payload_out.len() {
            return Err(efault());
        }
        if let Ok(fixed) = usize::try_from(info.size_in) {
            if fixed != size_in {
                return Err(einval());
            }
        }
        if let Ok(fixed) = usize::try_from(info.size_out) {
            if size_out < fixed {
                return Err(io::Error::from_raw_os_error(libc::ENOMEM));
            }
        }
        Ok(info)
    }

    fn execute(
        &mut self,
        cmd: &CxlSendCommand,
        info: CxlCommandInfo,
        payload_in: &[u8],
        payload_out: &mut [u8],
    ) -> (u32, usize) {
        let id = CommandId::from_u32(cmd.id);
        tracing::trace!(id = cmd.id, size_in = payload_in.len(), "emulated mailbox command");
        match id {
            Some(CommandId::Identify) => copy_reply(&self.identify.to_bytes(), payload_out),
            Some(CommandId::GetSupportedLogs) => {
                copy_reply(&encode_supported_logs(&self.supported_logs()), payload_out)
            }
            Some(CommandId::GetLog) => self.get_log(payload_in, payload_out),
            Some(CommandId::Raw) => self.raw(cmd.raw_opcode(), payload_in, payload_out),
            _ => {
                tracing::debug!(id = info.id, "no emulation for advertised command");
                (MboxStatus::UNSUPPORTED, 0)
            }
        }
    }

    fn get_log(&self, payload_in: &[u8], payload_out: &mut [u8]) -> (u32, usize) {
        let Ok(input) = GetLogInput::parse(payload_in) else {
            return (MboxStatus::INVALID_INPUT, 0);
        };
        let Some((_, contents)) = self.logs.iter().find(|(uuid, _)| *uuid == input.uuid) else {
            return (MboxStatus::INVALID_INPUT, 0);
        };
        let start = input.offset as usize;
        let end = start.saturating_add(input.length as usize);
        if end > contents.len() {
            return (MboxStatus::INVALID_INPUT, 0);
        }
        copy_reply(&contents[start..end], payload_out)
    }

    fn raw(&mut self, opcode: u16, payload_in: &[u8], payload_out: &mut [u8]) -> (u32, usize) {
        if let Some(handler) = self.raw_handler.as_mut() {
            let (retval, written) = handler(opcode, payload_in, payload_out);
            return (retval, written.min(payload_out.len()));
        }
        match opcode {
            IDENTIFY_OPCODE => copy_reply(&self.identify.to_bytes(), payload_out),
            GET_SUPPORTED_LOGS_OPCODE => {
                copy_reply(&encode_supported_logs(&self.supported_logs()), payload_out)
            }
            GET_LOG_OPCODE => self.get_log(payload_in, payload_out),
            _ => (MboxStatus::UNSUPPORTED, 0),
        }
    }
}

impl Transport for EmulatedMemdev {
    fn ioctl(&mut self, request: u32, arg: IoctlArg<'_>) -> io::Result<()> {
        match (request, arg) {
            (CXL_MEM_QUERY_COMMANDS, IoctlArg::Query(buf)) => self.handle_query(buf),
            (
                CXL_MEM_SEND_COMMAND,
                IoctlArg::Send {
                    command,
                    payload_in,
                    payload_out,
                },
            ) => self.handle_send(command, payload_in, payload_out),
            _ => Err(enotty()),
        }
    }
}

fn info_from_descriptor(desc: &CommandDescriptor) -> CxlCommandInfo {
    CxlCommandInfo {
        id: desc.id,
        flags: desc.flags.bits(),
        size_in: desc.size_in.to_wire(),
        size_out: desc.size_out.to_wire(),
    }
}

/// Command Effects Log entries: `{ opcode: u16, effect: u16 }` for each emulated opcode.
fn default_cel() -> Vec<u8> {
    [GET_SUPPORTED_LOGS_OPCODE, GET_LOG_OPCODE, IDENTIFY_OPCODE]
        .iter()
        .flat_map(|op| {
            let mut entry = [0u8; 4];
            entry[..2].copy_from_slice(&op.to_le_bytes());
            entry
        })
        .collect()
}

/// Copies as much of `reply` as fits and reports success with the copied length.
fn copy_reply(reply: &[u8], payload_out: &mut [u8]) -> (u32, usize) {
    let n = reply.len().min(payload_out.len());
    payload_out[..n].copy_from_slice(&reply[..n]);
    (MboxStatus::SUCCESS, n)
}

fn einval() -> io::Error {
    io::Error::from_raw_os_error(libc::EINVAL)
}

fn enotty() -> io::Error {
    io::Error::from_raw_os_error(libc::ENOTTY)
}

fn efault() -> io::Error {
    io::Error::from_raw_os_error(libc::EFAULT)
}
