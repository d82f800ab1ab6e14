//! Identify Memory Device output payload (CXL 2.0 §8.2.9.5.1.1).

use crate::catalog::IDENTIFY_OUTPUT_SIZE;
use crate::error::{CxlError, Result};

/// Capacity fields are reported in multiples of 256 MiB.
pub const CAPACITY_MULTIPLIER: u64 = 256 * 1024 * 1024;

const FW_REVISION_LEN: usize = 16;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentifyMemdev {
    /// Firmware revision, ASCII, NUL padded on the wire.
    pub fw_revision: String,
    /// Capacities in bytes (already scaled from 256 MiB units).
    pub total_capacity: u64,
    pub volatile_only_capacity: u64,
    pub persistent_only_capacity: u64,
    pub partition_align: u64,
    pub info_event_log_size: u16,
    pub warning_event_log_size: u16,
    pub failure_event_log_size: u16,
    pub fatal_event_log_size: u16,
    /// Label storage area size in bytes.
    pub lsa_size: u32,
    /// 24-bit field.
    pub poison_list_max_mer: u32,
    pub inject_poison_limit: u16,
    pub poison_caps: u8,
    pub qos_telemetry_caps: u8,
}

impl IdentifyMemdev {
    pub const SIZE: usize = IDENTIFY_OUTPUT_SIZE as usize;

    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < Self::SIZE {
            return Err(CxlError::MalformedResponse("identify payload too short"));
        }
        let fw = &bytes[..FW_REVISION_LEN];
        let fw_len = fw.iter().position(|&b| b == 0).unwrap_or(FW_REVISION_LEN);
        let fw_revision = String::from_utf8_lossy(&fw[..fw_len]).trim_end().to_string();

        Ok(Self {
            fw_revision,
            total_capacity: le_u64(bytes, 0x10).saturating_mul(CAPACITY_MULTIPLIER),
            volatile_only_capacity: le_u64(bytes, 0x18).saturating_mul(CAPACITY_MULTIPLIER),
            persistent_only_capacity: le_u64(bytes, 0x20).saturating_mul(CAPACITY_MULTIPLIER),
            partition_align: le_u64(bytes, 0x28).saturating_mul(CAPACITY_MULTIPLIER),
            info_event_log_size: le_u16(bytes, 0x30),
            warning_event_log_size: le_u16(bytes, 0x32),
            failure_event_log_size: le_u16(bytes, 0x34),
            fatal_event_log_size: le_u16(bytes, 0x36),
            lsa_size: le_u32(bytes, 0x38),
            poison_list_max_mer: u32::from_le_bytes([bytes[0x3c], bytes[0x3d], bytes[0x3e], 0]),
            inject_poison_limit: le_u16(bytes, 0x3f),
            poison_caps: bytes[0x41],
            qos_telemetry_caps: bytes[0x42],
        })
    }

    /// Encodes the payload a device would return. Capacities are rounded down to 256 MiB.
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        let fw = self.fw_revision.as_bytes();
        let fw_len = fw.len().min(FW_REVISION_LEN);
        out[..fw_len].copy_from_slice(&fw[..fw_len]);
        for (off, bytes) in [
            (0x10, self.total_capacity),
            (0x18, self.volatile_only_capacity),
            (0x20, self.persistent_only_capacity),
            (0x28, self.partition_align),
        ] {
            out[off..off + 8].copy_from_slice(&(bytes / CAPACITY_MULTIPLIER).to_le_bytes());
        }
        out[0x30..0x32].copy_from_slice(&self.info_event_log_size.to_le_bytes());
        out[0x32..0x34].copy_from_slice(&self.warning_event_log_size.to_le_bytes());
        out[0x34..0x36].copy_from_slice(&self.failure_event_log_size.to_le_bytes());
        out[0x36..0x38].copy_from_slice(&self.fatal_event_log_size.to_le_bytes());
        out[0x38..0x3c].copy_from_slice(&self.lsa_size.to_le_bytes());
        out[0x3c..0x3f].copy_from_slice(&self.poison_list_max_mer.to_le_bytes()[..3]);
        out[0x3f..0x41].copy_from_slice(&self.inject_poison_limit.to_le_bytes());
        out[0x41] = self.poison_caps;
        out[0x42] = self.qos_telemetry_caps;
        out
    }
}

fn le_u16(bytes: &[u8], off: usize) -> u16 {
    u16::from_le_bytes([bytes[off], bytes[off + 1]])
}

fn le_u32(bytes: &[u8], off: usize) -> u32 {
    u32::from_le_bytes([bytes[off], bytes[off + 1], bytes[off + 2], bytes[off + 3]])
}

fn le_u64(bytes: &[u8], off: usize) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[off..off + 8]);
    u64::from_le_bytes(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_hand_built_payload() {
        let mut raw = [0u8; IdentifyMemdev::SIZE];
        raw[..7].copy_from_slice(b"BWFW1.0");
        raw[0x10] = 4; // 1 GiB total
        raw[0x20] = 4;
        raw[0x28] = 1;
        raw[0x38..0x3c].copy_from_slice(&0x2_0000u32.to_le_bytes());
        raw[0x3c..0x3f].copy_from_slice(&[0x00, 0x01, 0x00]);
        raw[0x3f..0x41].copy_from_slice(&8u16.to_le_bytes());
        raw[0x41] = 0x3;

        let id = IdentifyMemdev::parse(&raw).unwrap();
        assert_eq!(id.fw_revision, "BWFW1.0");
        assert_eq!(id.total_capacity, 1 << 30);
        assert_eq!(id.volatile_only_capacity, 0);
        assert_eq!(id.persistent_only_capacity, 1 << 30);
        assert_eq!(id.partition_align, CAPACITY_MULTIPLIER);
        assert_eq!(id.lsa_size, 0x2_0000);
        assert_eq!(id.poison_list_max_mer, 0x100);
        assert_eq!(id.inject_poison_limit, 8);
        assert_eq!(id.poison_caps, 3);
        assert_eq!(IdentifyMemdev::parse(&id.to_bytes()).unwrap(), id);
    }

    #[test]
    fn short_payload_is_malformed() {
        assert!(matches!(
            IdentifyMemdev::parse(&[0u8; 0x42]),
            Err(CxlError::MalformedResponse(_))
        ));
    }
}
