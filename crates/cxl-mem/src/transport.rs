use std::io;

use cxl_uapi::CxlSendCommand;

/// Argument passed alongside an ioctl request code.
///
/// Payload buffers travel as slices instead of addresses: a transport that talks to a real
/// kernel is responsible for patching `in_payload`/`out_payload` in the send structure.
#[derive(Debug)]
pub enum IoctlArg<'a> {
    /// `CXL_MEM_QUERY_COMMANDS`: header followed by room for `n_commands` entries.
    Query(&'a mut [u8]),

    /// `CXL_MEM_SEND_COMMAND`.
    Send {
        command: &'a mut [u8; CxlSendCommand::SIZE],
        payload_in: &'a [u8],
        payload_out: &'a mut [u8],
    },
}

/// The ioctl-style channel to one memory device.
///
/// Implementations report driver-level failures as `io::Error` (typically carrying an
/// errno); those are surfaced to callers unchanged.
pub trait Transport {
    fn ioctl(&mut self, request: u32, arg: IoctlArg<'_>) -> io::Result<()>;
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn ioctl(&mut self, request: u32, arg: IoctlArg<'_>) -> io::Result<()> {
        (**self).ioctl(request, arg)
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn ioctl(&mut self, request: u32, arg: IoctlArg<'_>) -> io::Result<()> {
        (**self).ioctl(request, arg)
    }
}
