use cxl_uapi::{CxlSendCommand, CXL_MEM_SEND_COMMAND};

use crate::builder::CommandRequest;
use crate::error::{CxlError, Result};
use crate::status::MboxStatus;
use crate::transport::{IoctlArg, Transport};

/// Outcome of a command the device completed successfully.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    pub retval: u32,
    pub size_out: usize,
    pub payload_out: Vec<u8>,
}

impl CommandResult {
    pub fn status(&self) -> MboxStatus {
        MboxStatus::from_retval(self.retval)
    }

    pub fn into_payload(self) -> Vec<u8> {
        self.payload_out
    }
}

/// Sends `request` through `transport` exactly once.
///
/// The device-reported output size is trusted only up to the capacity the request
/// allocated. A nonzero device return code becomes [`CxlError::DeviceFailure`]; transport
/// errors are returned as-is. Nothing is retried.
pub fn submit<T: Transport + ?Sized>(
    transport: &mut T,
    request: impl Into<CommandRequest>,
) -> Result<CommandResult> {
    let request = request.into();
    let id = request.id();
    let capacity = request.out_capacity();

    if let CommandRequest::Raw(raw) = &request {
        tracing::warn!(
            size_in = raw.payload_in().len(),
            "sending raw mailbox command, opcode {:#06x}",
            raw.opcode()
        );
    }

    let mut wire = request.to_wire().to_bytes();
    let mut payload_out = vec![0u8; capacity];
    transport.ioctl(
        CXL_MEM_SEND_COMMAND,
        IoctlArg::Send {
            command: &mut wire,
            payload_in: request.payload_in(),
            payload_out: &mut payload_out,
        },
    )?;
    let reply = CxlSendCommand::from_bytes(&wire);

    let size_out = clamp_size_out(id, reply.size_out, capacity);
    tracing::debug!(id, retval = reply.retval, size_out, "mailbox command completed");

    if reply.retval != MboxStatus::SUCCESS {
        return Err(CxlError::device_failure(id, reply.retval));
    }

    payload_out.truncate(size_out);
    Ok(CommandResult {
        retval: reply.retval,
        size_out,
        payload_out,
    })
}

fn clamp_size_out(id: u32, reported: i32, capacity: usize) -> usize {
    let Ok(reported) = usize::try_from(reported) else {
        tracing::warn!(id, reported, "device reported a negative output size; using 0");
        return 0;
    };
    if reported > capacity {
        tracing::warn!(
            id,
            reported,
            capacity,
            "device reported more output than was allocated; clamping"
        );
        return capacity;
    }
    reported
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn clamp_never_exceeds_capacity() {
        assert_eq!(clamp_size_out(1, 16, 64), 16);
        assert_eq!(clamp_size_out(1, 64, 64), 64);
        assert_eq!(clamp_size_out(1, 4096, 64), 64);
        assert_eq!(clamp_size_out(1, -5, 64), 0);
    }

    struct Echo {
        sent: Vec<CxlSendCommand>,
        reply_size: i32,
        retval: u32,
    }

    impl Transport for Echo {
        fn ioctl(&mut self, request: u32, arg: IoctlArg<'_>) -> io::Result<()> {
            assert_eq!(request, CXL_MEM_SEND_COMMAND);
            let IoctlArg::Send {
                command,
                payload_in,
                payload_out,
            } = arg
            else {
                return Err(io::Error::from_raw_os_error(libc::ENOTTY));
            };
            let mut cmd = CxlSendCommand::from_bytes(command);
            self.sent.push(cmd);
            let n = payload_in.len().min(payload_out.len());
            payload_out[..n].copy_from_slice(&payload_in[..n]);
            cmd.retval = self.retval;
            cmd.size_out = self.reply_size;
            *command = cmd.to_bytes();
            Ok(())
        }
    }

    #[test]
    fn raw_opcode_is_forwarded_and_output_truncated() {
        let mut t = Echo {
            sent: Vec::new(),
            reply_size: 3,
            retval: 0,
        };
        let req = crate::CommandBuilder::raw(0xbeef)
            .payload_in(vec![1, 2, 3, 4])
            .out_capacity(8)
            .build_raw()
            .unwrap();
        let res = submit(&mut t, req).unwrap();
        assert_eq!(t.sent.len(), 1);
        assert_eq!(t.sent[0].raw_opcode(), 0xbeef);
        assert_eq!(t.sent[0].size_in, 4);
        assert_eq!(t.sent[0].size_out, 8);
        assert_eq!(t.sent[0].in_payload, 0);
        assert_eq!(res.size_out, 3);
        assert_eq!(res.payload_out, vec![1, 2, 3]);
    }

    #[test]
    fn device_status_is_preserved() {
        let mut t = Echo {
            sent: Vec::new(),
            reply_size: 0,
            retval: MboxStatus::UNSUPPORTED,
        };
        let req = crate::CommandBuilder::raw(0x0001).build_raw().unwrap();
        let err = submit(&mut t, req).unwrap_err();
        assert_eq!(err.device_retval(), Some(MboxStatus::UNSUPPORTED));
        assert!(matches!(
            err,
            CxlError::DeviceFailure {
                id: 2,
                status: MboxStatus::Unsupported,
                ..
            }
        ));
    }
}
