use std::fmt::Write as _;
use std::io::{self, Write};

use anyhow::Context;
use cxl_mem::{CommandDescriptor, CommandResult, IdentifyMemdev};
use serde::Serialize;

/// Byte counts print as integers, or as hex strings with `--human`.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum Size {
    Bytes(u64),
    Hex(String),
}

impl Size {
    pub fn new(bytes: u64, human: bool) -> Self {
        if human {
            Size::Hex(format!("{bytes:#x}"))
        } else {
            Size::Bytes(bytes)
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MemdevJson {
    pub memdev: String,
    pub pmem_size: Size,
    pub ram_size: Size,
    pub firmware_version: String,
    pub lsa_size: Size,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commands: Option<Vec<CommandJson>>,
}

impl MemdevJson {
    pub fn new(name: &str, identify: &IdentifyMemdev, human: bool) -> Self {
        Self {
            memdev: name.to_string(),
            pmem_size: Size::new(identify.persistent_only_capacity, human),
            ram_size: Size::new(identify.volatile_only_capacity, human),
            firmware_version: identify.fw_revision.clone(),
            lsa_size: Size::new(u64::from(identify.lsa_size), human),
            commands: None,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CommandJson {
    pub id: u32,
    pub name: &'static str,
    pub flags: u32,
    /// Payload size in bytes, or `-1` when the size is variable.
    pub size_in: i32,
    pub size_out: i32,
    pub requires_mutex: bool,
}

impl From<&CommandDescriptor> for CommandJson {
    fn from(desc: &CommandDescriptor) -> Self {
        Self {
            id: desc.id,
            name: desc.name,
            flags: desc.flags.bits(),
            size_in: desc.size_in.to_wire(),
            size_out: desc.size_out.to_wire(),
            requires_mutex: desc.requires_mutex(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RawJson {
    pub memdev: String,
    pub opcode: String,
    pub retval: u32,
    pub size_out: usize,
    pub payload: String,
}

impl RawJson {
    pub fn new(memdev: &str, opcode: u16, result: &CommandResult) -> Self {
        Self {
            memdev: memdev.to_string(),
            opcode: format!("{opcode:#06x}"),
            retval: result.retval,
            size_out: result.size_out,
            payload: hex::encode(&result.payload_out),
        }
    }
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value).context("serialize output")?;
    let mut stdout = io::stdout().lock();
    writeln!(stdout, "{json}").context("write output")?;
    Ok(())
}

/// A one-element listing prints as a bare object.
pub fn print_json_list<T: Serialize>(items: &[T]) -> anyhow::Result<()> {
    match items {
        [single] => print_json(single),
        _ => print_json(items),
    }
}

/// `xxd`-style dump: offset, 16 hex bytes, printable ASCII.
pub fn hex_dump(base: u32, bytes: &[u8]) -> String {
    let mut out = String::new();
    for (line, chunk) in bytes.chunks(16).enumerate() {
        let offset = u64::from(base) + (line as u64) * 16;
        let _ = write!(out, "{offset:08x}:");
        for i in 0..16 {
            match chunk.get(i) {
                Some(b) => {
                    let _ = write!(out, " {b:02x}");
                }
                None => out.push_str("   "),
            }
        }
        out.push_str("  ");
        out.extend(chunk.iter().map(|&b| {
            if b.is_ascii_graphic() || b == b' ' {
                b as char
            } else {
                '.'
            }
        }));
        out.push('\n');
    }
    out
}
