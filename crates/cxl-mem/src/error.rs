use std::io;

use thiserror::Error;

use crate::status::MboxStatus;

pub type Result<T> = std::result::Result<T, CxlError>;

/// Reasons a request is rejected before it reaches the transport.
///
/// These are always caller bugs: nothing has been sent to the device when one is returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("command id {id} is not supported by this device")]
    UnknownCommand { id: u32 },

    #[error("command id {id}: {which} payload is {actual} bytes, device expects exactly {expected}")]
    SizeMismatch {
        id: u32,
        which: PayloadDirection,
        expected: u32,
        actual: usize,
    },

    #[error("command id {id}: output buffer holds {capacity} bytes, device writes {required}")]
    BufferTooSmall {
        id: u32,
        required: u32,
        capacity: usize,
    },

    #[error("command id {id}: reserved field `{field}` is nonzero ({value:#x})")]
    ReservedFieldNonzero {
        id: u32,
        field: &'static str,
        value: u32,
    },

    #[error("raw command built without an opcode")]
    MissingRawOpcode,

    #[error("command id {id}: {which} payload of {len} bytes exceeds the {max} byte mailbox limit")]
    PayloadTooLarge {
        id: u32,
        which: PayloadDirection,
        len: usize,
        max: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadDirection {
    In,
    Out,
}

impl std::fmt::Display for PayloadDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PayloadDirection::In => f.write_str("input"),
            PayloadDirection::Out => f.write_str("output"),
        }
    }
}

/// Unified error type for catalog lookups, queries and command dispatch.
#[derive(Debug, Error)]
pub enum CxlError {
    #[error("command id {id} is not in the command catalog")]
    NotFound { id: u32 },

    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Failure reported by the transport itself. Passed through untouched.
    #[error("transport error: {0}")]
    Transport(#[from] io::Error),

    /// The round-trip succeeded but the device rejected the command.
    #[error("command id {id} failed on the device: {status} ({retval:#x})")]
    DeviceFailure {
        id: u32,
        retval: u32,
        status: MboxStatus,
    },

    /// The driver answered with bytes that do not decode.
    #[error("malformed response: {0}")]
    MalformedResponse(&'static str),
}

impl CxlError {
    pub fn device_failure(id: u32, retval: u32) -> Self {
        CxlError::DeviceFailure {
            id,
            retval,
            status: MboxStatus::from_retval(retval),
        }
    }

    /// Device status code for [`CxlError::DeviceFailure`].
    pub fn device_retval(&self) -> Option<u32> {
        match self {
            CxlError::DeviceFailure { retval, .. } => Some(*retval),
            _ => None,
        }
    }
}
