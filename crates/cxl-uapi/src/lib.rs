//! Userspace ABI for CXL memory device mailbox commands.
//!
//! Mirrors `include/uapi/linux/cxl_mem.h`: the query structure used to discover the live
//! command set and the send structure used to submit one command. The structs are
//! `#[repr(C)]` so their layout can be checked against the C definitions, and each one has
//! explicit `to_bytes`/`from_bytes` helpers so callers never reinterpret memory.
//!
//! All multi-byte fields are encoded little-endian (CXL hosts are little-endian).

#![no_std]
#![forbid(unsafe_code)]

use core::mem::size_of;

/// Ioctl "type" byte shared by all CXL memory device ioctls.
pub const CXL_MEM_IOCTL_TYPE: u8 = 0xCE;

const IOC_NRSHIFT: u32 = 0;
const IOC_TYPESHIFT: u32 = 8;
const IOC_SIZESHIFT: u32 = 16;
const IOC_DIRSHIFT: u32 = 30;

const IOC_WRITE: u32 = 1;
const IOC_READ: u32 = 2;

/// Linux asm-generic `_IOC` encoding.
pub const fn ioc(dir: u32, ty: u8, nr: u8, size: usize) -> u32 {
    (dir << IOC_DIRSHIFT)
        | ((ty as u32) << IOC_TYPESHIFT)
        | ((nr as u32) << IOC_NRSHIFT)
        | ((size as u32) << IOC_SIZESHIFT)
}

/// `_IOR(0xCE, 1, struct cxl_mem_query_commands)`
pub const CXL_MEM_QUERY_COMMANDS: u32 =
    ioc(IOC_READ, CXL_MEM_IOCTL_TYPE, 1, size_of::<CxlMemQueryCommands>());

/// `_IOWR(0xCE, 2, struct cxl_send_command)`
pub const CXL_MEM_SEND_COMMAND: u32 = ioc(
    IOC_READ | IOC_WRITE,
    CXL_MEM_IOCTL_TYPE,
    2,
    size_of::<CxlSendCommand>(),
);

pub const CXL_MEM_COMMAND_ID_INVALID: u32 = 0;
pub const CXL_MEM_COMMAND_ID_IDENTIFY: u32 = 1;
pub const CXL_MEM_COMMAND_ID_RAW: u32 = 2;
pub const CXL_MEM_COMMAND_ID_GET_SUPPORTED_LOGS: u32 = 3;
pub const CXL_MEM_COMMAND_ID_GET_LOG: u32 = 4;
pub const CXL_MEM_COMMAND_ID_MAX: u32 = 5;

pub const CXL_MEM_COMMAND_FLAG_NONE: u32 = 0;
pub const CXL_MEM_COMMAND_FLAG_KERNEL: u32 = 1 << 0;
pub const CXL_MEM_COMMAND_FLAG_MUTEX: u32 = 1 << 1;
/// Bits 2..=31 are reserved and must be zero.
pub const CXL_MEM_COMMAND_FLAG_MASK: u32 = !0b11;

/// `size_in`/`size_out` value meaning "variable length".
pub const CXL_VARIABLE_PAYLOAD: i32 = -1;

/// Command information returned from a query (`struct cxl_command_info`).
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct CxlCommandInfo {
    pub id: u32,
    pub flags: u32,
    pub size_in: i32,
    pub size_out: i32,
}

impl CxlCommandInfo {
    pub const SIZE: usize = size_of::<Self>();

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out[0..4].copy_from_slice(&self.id.to_le_bytes());
        out[4..8].copy_from_slice(&self.flags.to_le_bytes());
        out[8..12].copy_from_slice(&self.size_in.to_le_bytes());
        out[12..16].copy_from_slice(&self.size_out.to_le_bytes());
        out
    }

    pub fn from_bytes(bytes: &[u8; Self::SIZE]) -> Self {
        Self {
            id: read_u32(bytes, 0),
            flags: read_u32(bytes, 4),
            size_in: read_i32(bytes, 8),
            size_out: read_i32(bytes, 12),
        }
    }
}

/// Header of `struct cxl_mem_query_commands` (does not include the trailing
/// `commands[]` array).
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct CxlMemQueryCommands {
    /// In: number of entries allocated after the header (0 asks for the count only).
    /// Out: number of commands supported by the driver and hardware.
    pub n_commands: u32,
    pub rsvd: u32,
}

impl CxlMemQueryCommands {
    pub const SIZE: usize = size_of::<Self>();

    /// Bytes needed for a query buffer with room for `n_commands` entries.
    pub const fn buffer_len(n_commands: usize) -> usize {
        Self::SIZE + n_commands * CxlCommandInfo::SIZE
    }

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out[0..4].copy_from_slice(&self.n_commands.to_le_bytes());
        out[4..8].copy_from_slice(&self.rsvd.to_le_bytes());
        out
    }

    pub fn from_bytes(bytes: &[u8; Self::SIZE]) -> Self {
        Self {
            n_commands: read_u32(bytes, 0),
            rsvd: read_u32(bytes, 4),
        }
    }

    /// Reads the header from the front of a query buffer.
    pub fn read_header(buf: &[u8]) -> Option<Self> {
        let header: &[u8; Self::SIZE] = buf.get(..Self::SIZE)?.try_into().ok()?;
        Some(Self::from_bytes(header))
    }

    /// Writes the header to the front of a query buffer.
    pub fn write_header(&self, buf: &mut [u8]) -> Option<()> {
        buf.get_mut(..Self::SIZE)?.copy_from_slice(&self.to_bytes());
        Some(())
    }

    /// Reads entry `index` of the `commands[]` array that follows the header.
    pub fn read_entry(buf: &[u8], index: usize) -> Option<CxlCommandInfo> {
        let start = Self::SIZE.checked_add(index.checked_mul(CxlCommandInfo::SIZE)?)?;
        let end = start.checked_add(CxlCommandInfo::SIZE)?;
        let entry: &[u8; CxlCommandInfo::SIZE] = buf.get(start..end)?.try_into().ok()?;
        Some(CxlCommandInfo::from_bytes(entry))
    }

    /// Writes entry `index` of the `commands[]` array that follows the header.
    pub fn write_entry(buf: &mut [u8], index: usize, info: &CxlCommandInfo) -> Option<()> {
        let start = Self::SIZE.checked_add(index.checked_mul(CxlCommandInfo::SIZE)?)?;
        let end = start.checked_add(CxlCommandInfo::SIZE)?;
        buf.get_mut(start..end)?.copy_from_slice(&info.to_bytes());
        Some(())
    }
}

/// Send a command to a memory device (`struct cxl_send_command`).
///
/// The C definition overlays `raw.opcode`/`raw.rsvd` and a plain `rsvd` word at offset 8;
/// here that word is stored once as [`CxlSendCommand::rsvd`] and the raw view is exposed
/// through [`CxlSendCommand::raw_opcode`] and [`CxlSendCommand::raw_rsvd`].
///
/// `in_payload`/`out_payload` hold user addresses on a real kernel boundary. This crate
/// never fills them in.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct CxlSendCommand {
    pub id: u32,
    pub flags: u32,
    pub rsvd: u32,
    pub retval: u32,
    pub size_in: i32,
    pub in_payload: u64,
    pub size_out: i32,
    pub out_payload: u64,
}

impl CxlSendCommand {
    pub const SIZE: usize = size_of::<Self>();

    /// Returns `raw.opcode` (low half of the union word).
    pub fn raw_opcode(&self) -> u16 {
        (self.rsvd & 0xffff) as u16
    }

    /// Returns `raw.rsvd` (high half of the union word).
    pub fn raw_rsvd(&self) -> u16 {
        (self.rsvd >> 16) as u16
    }

    /// Stores `raw.opcode` and `raw.rsvd` into the union word.
    pub fn set_raw(&mut self, opcode: u16, rsvd: u16) {
        self.rsvd = u32::from(opcode) | (u32::from(rsvd) << 16);
    }

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out[0..4].copy_from_slice(&self.id.to_le_bytes());
        out[4..8].copy_from_slice(&self.flags.to_le_bytes());
        out[8..12].copy_from_slice(&self.rsvd.to_le_bytes());
        out[12..16].copy_from_slice(&self.retval.to_le_bytes());
        out[16..20].copy_from_slice(&self.size_in.to_le_bytes());
        out[24..32].copy_from_slice(&self.in_payload.to_le_bytes());
        out[32..36].copy_from_slice(&self.size_out.to_le_bytes());
        out[40..48].copy_from_slice(&self.out_payload.to_le_bytes());
        out
    }

    pub fn from_bytes(bytes: &[u8; Self::SIZE]) -> Self {
        Self {
            id: read_u32(bytes, 0),
            flags: read_u32(bytes, 4),
            rsvd: read_u32(bytes, 8),
            retval: read_u32(bytes, 12),
            size_in: read_i32(bytes, 16),
            in_payload: read_u64(bytes, 24),
            size_out: read_i32(bytes, 32),
            out_payload: read_u64(bytes, 40),
        }
    }
}

fn read_u32(bytes: &[u8], off: usize) -> u32 {
    u32::from_le_bytes([bytes[off], bytes[off + 1], bytes[off + 2], bytes[off + 3]])
}

fn read_i32(bytes: &[u8], off: usize) -> i32 {
    i32::from_le_bytes([bytes[off], bytes[off + 1], bytes[off + 2], bytes[off + 3]])
}

fn read_u64(bytes: &[u8], off: usize) -> u64 {
    u64::from_le_bytes([
        bytes[off],
        bytes[off + 1],
        bytes[off + 2],
        bytes[off + 3],
        bytes[off + 4],
        bytes[off + 5],
        bytes[off + 6],
        bytes[off + 7],
    ])
}

#[cfg(test)]
extern crate std;

#[cfg(test)]
mod tests {
    use super::*;
    use core::mem::offset_of;

    #[test]
    fn command_info_layout() {
        assert_eq!(size_of::<CxlCommandInfo>(), 16);
        assert_eq!(offset_of!(CxlCommandInfo, id), 0);
        assert_eq!(offset_of!(CxlCommandInfo, flags), 4);
        assert_eq!(offset_of!(CxlCommandInfo, size_in), 8);
        assert_eq!(offset_of!(CxlCommandInfo, size_out), 12);
    }

    #[test]
    fn query_header_layout() {
        assert_eq!(size_of::<CxlMemQueryCommands>(), 8);
        assert_eq!(offset_of!(CxlMemQueryCommands, n_commands), 0);
        assert_eq!(offset_of!(CxlMemQueryCommands, rsvd), 4);
        assert_eq!(CxlMemQueryCommands::buffer_len(3), 8 + 3 * 16);
    }

    #[test]
    fn send_command_layout() {
        assert_eq!(size_of::<CxlSendCommand>(), 48);
        assert_eq!(offset_of!(CxlSendCommand, id), 0);
        assert_eq!(offset_of!(CxlSendCommand, flags), 4);
        assert_eq!(offset_of!(CxlSendCommand, rsvd), 8);
        assert_eq!(offset_of!(CxlSendCommand, retval), 12);
        assert_eq!(offset_of!(CxlSendCommand, size_in), 16);
        assert_eq!(offset_of!(CxlSendCommand, in_payload), 24);
        assert_eq!(offset_of!(CxlSendCommand, size_out), 32);
        assert_eq!(offset_of!(CxlSendCommand, out_payload), 40);
    }

    #[test]
    fn ioctl_numbers_match_linux() {
        assert_eq!(CXL_MEM_QUERY_COMMANDS, 0x8008_ce01);
        assert_eq!(CXL_MEM_SEND_COMMAND, 0xc030_ce02);
    }

    #[test]
    fn raw_opcode_occupies_low_half_of_union_word() {
        let mut cmd = CxlSendCommand {
            id: CXL_MEM_COMMAND_ID_RAW,
            ..Default::default()
        };
        cmd.set_raw(0x1234, 0);
        let bytes = cmd.to_bytes();
        assert_eq!(&bytes[8..12], &[0x34, 0x12, 0x00, 0x00]);
        assert_eq!(cmd.raw_opcode(), 0x1234);
        assert_eq!(cmd.raw_rsvd(), 0);

        cmd.set_raw(0x4500, 0xbeef);
        assert_eq!(cmd.raw_rsvd(), 0xbeef);
        assert_eq!(CxlSendCommand::from_bytes(&cmd.to_bytes()), cmd);
    }

    #[test]
    fn negative_sizes_survive_encoding() {
        let info = CxlCommandInfo {
            id: CXL_MEM_COMMAND_ID_GET_LOG,
            flags: CXL_MEM_COMMAND_FLAG_MUTEX,
            size_in: 0x18,
            size_out: CXL_VARIABLE_PAYLOAD,
        };
        let bytes = info.to_bytes();
        assert_eq!(&bytes[12..16], &[0xff; 4]);
        assert_eq!(CxlCommandInfo::from_bytes(&bytes), info);
    }

    #[test]
    fn query_entries_are_bounds_checked() {
        let mut buf = [0u8; CxlMemQueryCommands::buffer_len(1)];
        let info = CxlCommandInfo {
            id: CXL_MEM_COMMAND_ID_IDENTIFY,
            flags: 0,
            size_in: 0,
            size_out: 0x43,
        };
        assert!(CxlMemQueryCommands::write_entry(&mut buf, 0, &info).is_some());
        assert!(CxlMemQueryCommands::write_entry(&mut buf, 1, &info).is_none());
        assert_eq!(CxlMemQueryCommands::read_entry(&buf, 0), Some(info));
        assert_eq!(CxlMemQueryCommands::read_entry(&buf, 1), None);
        assert_eq!(CxlMemQueryCommands::read_header(&buf[..4]), None);
    }
}
