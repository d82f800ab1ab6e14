//! JSON description of the emulated memory devices the CLI operates on.
//!
//! ```json
//! {
//!   "memdevs": [
//!     {
//!       "name": "mem0",
//!       "firmware_version": "FW 2.1",
//!       "pmem_size": 1073741824,
//!       "ram_size": 268435456,
//!       "lsa_size": 131072,
//!       "logs": [{ "uuid": "...", "data": "00ff..." }]
//!     }
//!   ]
//! }
//! ```

use std::fs;
use std::path::Path;

use anyhow::{bail, Context};
use cxl_mem::uapi::CxlCommandInfo;
use cxl_mem::{EmulatedMemdev, Faults, IdentifyMemdev, CAPACITY_MULTIPLIER};
use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Profile {
    pub memdevs: Vec<MemdevProfile>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MemdevProfile {
    pub name: String,
    #[serde(default)]
    pub firmware_version: Option<String>,
    #[serde(default)]
    pub pmem_size: u64,
    #[serde(default)]
    pub ram_size: u64,
    #[serde(default)]
    pub lsa_size: u32,
    /// Overrides the advertised command list.
    #[serde(default)]
    pub commands: Option<Vec<CommandProfile>>,
    #[serde(default)]
    pub logs: Vec<LogProfile>,
    #[serde(default)]
    pub faults: FaultProfile,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CommandProfile {
    pub id: u32,
    #[serde(default)]
    pub flags: u32,
    pub size_in: i32,
    pub size_out: i32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LogProfile {
    pub uuid: Uuid,
    /// Log contents as hex.
    pub data: String,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FaultProfile {
    pub size_out: Option<i32>,
    pub errno: Option<i32>,
    pub retval: Option<u32>,
}

impl Profile {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("read memdev profile {}", path.display()))?;
        let profile: Profile = serde_json::from_str(&text)
            .with_context(|| format!("parse memdev profile {}", path.display()))?;
        profile.validate()?;
        Ok(profile)
    }

    fn validate(&self) -> anyhow::Result<()> {
        for (i, memdev) in self.memdevs.iter().enumerate() {
            if self.memdevs[..i].iter().any(|m| m.name == memdev.name) {
                bail!("duplicate memdev name {:?} in profile", memdev.name);
            }
            for (what, size) in [("pmem_size", memdev.pmem_size), ("ram_size", memdev.ram_size)] {
                if size % CAPACITY_MULTIPLIER != 0 {
                    bail!(
                        "{}: {what} {size} is not a multiple of {CAPACITY_MULTIPLIER} bytes",
                        memdev.name
                    );
                }
            }
        }
        Ok(())
    }
}

impl Default for Profile {
    /// A single stock device named `mem0`.
    fn default() -> Self {
        let stock = EmulatedMemdev::new();
        let identify = stock.identify();
        Self {
            memdevs: vec![MemdevProfile {
                name: "mem0".to_string(),
                firmware_version: Some(identify.fw_revision.clone()),
                pmem_size: identify.persistent_only_capacity,
                ram_size: identify.volatile_only_capacity,
                lsa_size: identify.lsa_size,
                commands: None,
                logs: Vec::new(),
                faults: FaultProfile::default(),
            }],
        }
    }
}

impl MemdevProfile {
    pub fn to_device(&self) -> anyhow::Result<EmulatedMemdev> {
        let mut device = EmulatedMemdev::new();
        let fw_revision = match &self.firmware_version {
            Some(fw) => fw.clone(),
            None => device.identify().fw_revision.clone(),
        };
        device = device
            .with_identify(IdentifyMemdev {
                fw_revision,
                total_capacity: self.pmem_size.saturating_add(self.ram_size),
                volatile_only_capacity: self.ram_size,
                persistent_only_capacity: self.pmem_size,
                lsa_size: self.lsa_size,
                ..IdentifyMemdev::default()
            })
            .with_faults(Faults {
                size_out: self.faults.size_out,
                errno: self.faults.errno,
                retval: self.faults.retval,
            });

        if let Some(commands) = &self.commands {
            device = device.with_commands(
                commands
                    .iter()
                    .map(|c| CxlCommandInfo {
                        id: c.id,
                        flags: c.flags,
                        size_in: c.size_in,
                        size_out: c.size_out,
                    })
                    .collect(),
            );
        }

        for log in &self.logs {
            let data = hex::decode(log.data.trim())
                .with_context(|| format!("{}: log {} is not valid hex", self.name, log.uuid))?;
            device = device.with_log(log.uuid, data);
        }

        Ok(device)
    }
}

/// Accepts `all`, an exact name, or a bare index standing for `memN`.
pub fn memdev_matches(name: &str, filter: Option<&str>) -> bool {
    match filter {
        None | Some("all") => true,
        Some(filter) if filter == name => true,
        Some(filter) => {
            filter.parse::<u32>().is_ok() && name.strip_prefix("mem") == Some(filter)
        }
    }
}
