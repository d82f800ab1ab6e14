//! Discovering which commands the driver and device support.
//!
//! The canonical pattern is two-phase: ask with `max_count == 0` to learn the total, size a
//! buffer, then ask again. [`query_all`] does both steps.

use cxl_uapi::{CxlCommandInfo, CxlMemQueryCommands, CXL_MEM_QUERY_COMMANDS};

use crate::catalog::{command_name, CommandDescriptor, CommandFlags, CommandId, PayloadSize};
use crate::error::{CxlError, Result};
use crate::transport::{IoctlArg, Transport};

/// Upper bound on entries requested in one query. Keeps a careless `max_count` from
/// turning into a multi-gigabyte allocation; no driver reports anywhere near this many.
pub const MAX_QUERY_COMMANDS: u32 = 1 << 16;

/// Commands usable on one device, in driver-reported order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SupportedCommandSet {
    total: u32,
    commands: Vec<CommandDescriptor>,
}

impl SupportedCommandSet {
    /// Builds a set from descriptors obtained elsewhere (e.g. a cached query). The total is
    /// the number of descriptors.
    pub fn from_descriptors(commands: Vec<CommandDescriptor>) -> Self {
        Self {
            total: commands.len() as u32,
            commands,
        }
    }

    /// Number of commands the driver reported as supported. May exceed `len()` when the
    /// query asked for fewer entries.
    pub fn total(&self) -> u32 {
        self.total
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn commands(&self) -> &[CommandDescriptor] {
        &self.commands
    }

    pub fn iter(&self) -> impl Iterator<Item = &CommandDescriptor> {
        self.commands.iter()
    }

    pub fn get(&self, id: u32) -> Option<&CommandDescriptor> {
        self.commands.iter().find(|d| d.id == id)
    }

    pub fn contains(&self, id: u32) -> bool {
        self.get(id).is_some()
    }

    /// Whether dispatching `id` needs external serialisation. Unknown ids report `false`.
    pub fn requires_mutex(&self, id: u32) -> bool {
        self.get(id).is_some_and(CommandDescriptor::requires_mutex)
    }
}

impl<'a> IntoIterator for &'a SupportedCommandSet {
    type Item = &'a CommandDescriptor;
    type IntoIter = std::slice::Iter<'a, CommandDescriptor>;

    fn into_iter(self) -> Self::IntoIter {
        self.commands.iter()
    }
}

/// Queries up to `max_count` supported commands.
///
/// With `max_count == 0` only the total is fetched and the descriptor list is empty. With
/// `max_count > 0` at most `min(total, max_count)` descriptors are returned; a short buffer
/// truncates silently. Zeroed entries left behind by a driver that echoes the requested
/// count instead of the total are skipped.
pub fn query_supported<T: Transport + ?Sized>(
    transport: &mut T,
    max_count: u32,
) -> Result<SupportedCommandSet> {
    let requested = max_count.min(MAX_QUERY_COMMANDS);
    if requested != max_count {
        tracing::debug!(max_count, requested, "clamping command query size");
    }

    let mut buf = vec![0u8; CxlMemQueryCommands::buffer_len(requested as usize)];
    let header = CxlMemQueryCommands {
        n_commands: requested,
        rsvd: 0,
    };
    header
        .write_header(&mut buf)
        .ok_or(CxlError::MalformedResponse("query buffer shorter than header"))?;

    transport.ioctl(CXL_MEM_QUERY_COMMANDS, IoctlArg::Query(&mut buf))?;

    let header = CxlMemQueryCommands::read_header(&buf)
        .ok_or(CxlError::MalformedResponse("query buffer shorter than header"))?;
    let total = header.n_commands;
    let returned = total.min(requested) as usize;

    let mut commands = Vec::with_capacity(returned);
    for index in 0..returned {
        let info = CxlMemQueryCommands::read_entry(&buf, index)
            .ok_or(CxlError::MalformedResponse("query entry out of bounds"))?;
        if !CommandId::is_dispatchable(info.id) {
            tracing::trace!(index, id = info.id, "skipping unused query entry");
            continue;
        }
        commands.push(descriptor_from_wire(&info)?);
    }

    tracing::debug!(total, returned = commands.len(), "queried supported commands");
    Ok(SupportedCommandSet { total, commands })
}

/// Runs the count-then-fetch sequence and returns every supported command.
pub fn query_all<T: Transport + ?Sized>(transport: &mut T) -> Result<SupportedCommandSet> {
    let count = query_supported(transport, 0)?.total();
    if count == 0 {
        return Ok(SupportedCommandSet::default());
    }
    query_supported(transport, count)
}

fn descriptor_from_wire(info: &CxlCommandInfo) -> Result<CommandDescriptor> {
    let size_in = PayloadSize::from_wire(info.size_in)
        .ok_or(CxlError::MalformedResponse("command size_in below -1"))?;
    let size_out = PayloadSize::from_wire(info.size_out)
        .ok_or(CxlError::MalformedResponse("command size_out below -1"))?;
    Ok(CommandDescriptor {
        id: info.id,
        name: command_name(info.id),
        // Unknown bits may be defined by a newer driver; keep them for display.
        flags: CommandFlags::from_bits_retain(info.flags),
        size_in,
        size_out,
    })
}
