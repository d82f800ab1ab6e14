//! Get Supported Logs / Get Log payloads (CXL 2.0 §8.2.9.4).

use uuid::Uuid;

use crate::catalog::GET_LOG_INPUT_SIZE;
use crate::error::{CxlError, Result};

/// Command Effects Log.
pub const CEL_UUID: Uuid = Uuid::from_bytes([
    0x0d, 0xa9, 0xc0, 0xb5, 0xbf, 0x41, 0x4b, 0x78, 0x8f, 0x79, 0x96, 0xb1, 0x62, 0x3b, 0x3f, 0x17,
]);

const SUPPORTED_LOGS_HEADER_LEN: usize = 8;
const SUPPORTED_LOG_ENTRY_LEN: usize = 20;

/// One entry of the Get Supported Logs output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupportedLog {
    pub uuid: Uuid,
    /// Log size in bytes.
    pub size: u32,
}

/// Decodes the Get Supported Logs output: a u16 entry count, 6 reserved bytes, then
/// `{ uuid[16], size: u32 }` per entry.
pub fn parse_supported_logs(bytes: &[u8]) -> Result<Vec<SupportedLog>> {
    if bytes.len() < SUPPORTED_LOGS_HEADER_LEN {
        return Err(CxlError::MalformedResponse("supported logs header truncated"));
    }
    let entries = u16::from_le_bytes([bytes[0], bytes[1]]) as usize;
    let body = &bytes[SUPPORTED_LOGS_HEADER_LEN..];
    if body.len() < entries * SUPPORTED_LOG_ENTRY_LEN {
        return Err(CxlError::MalformedResponse("supported logs entries truncated"));
    }

    Ok(body
        .chunks_exact(SUPPORTED_LOG_ENTRY_LEN)
        .take(entries)
        .map(|entry| {
            let mut uuid = [0u8; 16];
            uuid.copy_from_slice(&entry[..16]);
            SupportedLog {
                uuid: Uuid::from_bytes(uuid),
                size: u32::from_le_bytes([entry[16], entry[17], entry[18], entry[19]]),
            }
        })
        .collect())
}

pub fn encode_supported_logs(logs: &[SupportedLog]) -> Vec<u8> {
    let count = u16::try_from(logs.len()).unwrap_or(u16::MAX);
    let mut out = Vec::with_capacity(
        SUPPORTED_LOGS_HEADER_LEN + usize::from(count) * SUPPORTED_LOG_ENTRY_LEN,
    );
    out.extend_from_slice(&count.to_le_bytes());
    out.extend_from_slice(&[0u8; 6]);
    for log in logs.iter().take(usize::from(count)) {
        out.extend_from_slice(log.uuid.as_bytes());
        out.extend_from_slice(&log.size.to_le_bytes());
    }
    out
}

/// Get Log input payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GetLogInput {
    pub uuid: Uuid,
    pub offset: u32,
    pub length: u32,
}

impl GetLogInput {
    pub const SIZE: usize = GET_LOG_INPUT_SIZE as usize;

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out[..16].copy_from_slice(self.uuid.as_bytes());
        out[16..20].copy_from_slice(&self.offset.to_le_bytes());
        out[20..24].copy_from_slice(&self.length.to_le_bytes());
        out
    }

    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != Self::SIZE {
            return Err(CxlError::MalformedResponse("get log input has the wrong size"));
        }
        let mut uuid = [0u8; 16];
        uuid.copy_from_slice(&bytes[..16]);
        Ok(Self {
            uuid: Uuid::from_bytes(uuid),
            offset: u32::from_le_bytes([bytes[16], bytes[17], bytes[18], bytes[19]]),
            length: u32::from_le_bytes([bytes[20], bytes[21], bytes[22], bytes[23]]),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cel_uuid_string_form() {
        assert_eq!(
            CEL_UUID.to_string(),
            "0da9c0b5-bf41-4b78-8f79-96b1623b3f17"
        );
    }

    #[test]
    fn supported_logs_decode() {
        let logs = [
            SupportedLog {
                uuid: CEL_UUID,
                size: 0x40,
            },
            SupportedLog {
                uuid: Uuid::from_u128(0x1234),
                size: 8,
            },
        ];
        let bytes = encode_supported_logs(&logs);
        assert_eq!(bytes.len(), 8 + 2 * 20);
        assert_eq!(&bytes[..2], &[2, 0]);
        assert_eq!(parse_supported_logs(&bytes).unwrap(), logs);
    }

    #[test]
    fn supported_logs_truncated() {
        let mut bytes = encode_supported_logs(&[SupportedLog {
            uuid: CEL_UUID,
            size: 1,
        }]);
        bytes.truncate(20);
        assert!(parse_supported_logs(&bytes).is_err());
        assert!(parse_supported_logs(&[1, 0]).is_err());
    }

    #[test]
    fn get_log_input_layout() {
        let input = GetLogInput {
            uuid: CEL_UUID,
            offset: 0x10,
            length: 0x20,
        };
        let bytes = input.to_bytes();
        assert_eq!(bytes.len(), 0x18);
        assert_eq!(&bytes[..16], CEL_UUID.as_bytes());
        assert_eq!(&bytes[16..20], &[0x10, 0, 0, 0]);
        assert_eq!(GetLogInput::parse(&bytes).unwrap(), input);
        assert!(GetLogInput::parse(&bytes[..0x10]).is_err());
    }
}
