//! Mailbox return codes (CXL 2.0 §8.2.8.4.5.1).

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MboxStatus {
    Success,
    BackgroundCommandStarted,
    InvalidInput,
    Unsupported,
    InternalError,
    RetryRequired,
    Busy,
    MediaDisabled,
    FwTransferInProgress,
    FwTransferOutOfOrder,
    FwAuthenticationFailed,
    InvalidSlot,
    ActivationFailedRolledBack,
    ActivationFailedColdResetRequired,
    InvalidHandle,
    InvalidPhysicalAddress,
    InjectPoisonLimitReached,
    PermanentMediaFailure,
    Aborted,
    InvalidSecurityState,
    IncorrectPassphrase,
    UnsupportedMailbox,
    InvalidPayloadLength,
    Unknown(u32),
}

impl MboxStatus {
    pub const SUCCESS: u32 = 0x00;
    pub const INVALID_INPUT: u32 = 0x02;
    pub const UNSUPPORTED: u32 = 0x03;
    pub const INTERNAL_ERROR: u32 = 0x04;

    pub fn from_retval(retval: u32) -> Self {
        match retval {
            0x00 => MboxStatus::Success,
            0x01 => MboxStatus::BackgroundCommandStarted,
            0x02 => MboxStatus::InvalidInput,
            0x03 => MboxStatus::Unsupported,
            0x04 => MboxStatus::InternalError,
            0x05 => MboxStatus::RetryRequired,
            0x06 => MboxStatus::Busy,
            0x07 => MboxStatus::MediaDisabled,
            0x08 => MboxStatus::FwTransferInProgress,
            0x09 => MboxStatus::FwTransferOutOfOrder,
            0x0a => MboxStatus::FwAuthenticationFailed,
            0x0b => MboxStatus::InvalidSlot,
            0x0c => MboxStatus::ActivationFailedRolledBack,
            0x0d => MboxStatus::ActivationFailedColdResetRequired,
            0x0e => MboxStatus::InvalidHandle,
            0x0f => MboxStatus::InvalidPhysicalAddress,
            0x10 => MboxStatus::InjectPoisonLimitReached,
            0x11 => MboxStatus::PermanentMediaFailure,
            0x12 => MboxStatus::Aborted,
            0x13 => MboxStatus::InvalidSecurityState,
            0x14 => MboxStatus::IncorrectPassphrase,
            0x15 => MboxStatus::UnsupportedMailbox,
            0x16 => MboxStatus::InvalidPayloadLength,
            other => MboxStatus::Unknown(other),
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            MboxStatus::Success => "success",
            MboxStatus::BackgroundCommandStarted => "background command started",
            MboxStatus::InvalidInput => "invalid input",
            MboxStatus::Unsupported => "unsupported",
            MboxStatus::InternalError => "internal error",
            MboxStatus::RetryRequired => "retry required",
            MboxStatus::Busy => "busy",
            MboxStatus::MediaDisabled => "media disabled",
            MboxStatus::FwTransferInProgress => "firmware transfer in progress",
            MboxStatus::FwTransferOutOfOrder => "firmware transfer out of order",
            MboxStatus::FwAuthenticationFailed => "firmware authentication failed",
            MboxStatus::InvalidSlot => "invalid slot",
            MboxStatus::ActivationFailedRolledBack => "activation failed, firmware rolled back",
            MboxStatus::ActivationFailedColdResetRequired => {
                "activation failed, cold reset required"
            }
            MboxStatus::InvalidHandle => "invalid handle",
            MboxStatus::InvalidPhysicalAddress => "invalid physical address",
            MboxStatus::InjectPoisonLimitReached => "inject poison limit reached",
            MboxStatus::PermanentMediaFailure => "permanent media failure",
            MboxStatus::Aborted => "aborted",
            MboxStatus::InvalidSecurityState => "invalid security state",
            MboxStatus::IncorrectPassphrase => "incorrect passphrase",
            MboxStatus::UnsupportedMailbox => "unsupported mailbox",
            MboxStatus::InvalidPayloadLength => "invalid payload length",
            MboxStatus::Unknown(_) => "unknown status",
        }
    }
}

impl fmt::Display for MboxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
