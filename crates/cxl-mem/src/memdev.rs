use uuid::Uuid;

use crate::builder::{CommandBuilder, CommandRequest};
use crate::catalog::{CommandDescriptor, CommandId};
use crate::dispatch::{submit, CommandResult};
use crate::error::Result;
use crate::identify::IdentifyMemdev;
use crate::logs::{parse_supported_logs, GetLogInput, SupportedLog};
use crate::query::{query_all, SupportedCommandSet};
use crate::transport::Transport;
use crate::MAX_PAYLOAD_BYTES;

/// A memory device session: one transport plus the command set it reported when opened.
///
/// The command set is queried once in [`Memdev::open`]. Call [`Memdev::refresh`] after the
/// device may have been reconnected.
#[derive(Debug)]
pub struct Memdev<T> {
    name: String,
    transport: T,
    supported: SupportedCommandSet,
}

impl<T: Transport> Memdev<T> {
    pub fn open(name: impl Into<String>, mut transport: T) -> Result<Self> {
        let name = name.into();
        let supported = query_all(&mut transport)?;
        tracing::debug!(memdev = %name, commands = supported.len(), "opened memdev");
        Ok(Self {
            name,
            transport,
            supported,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn supported(&self) -> &SupportedCommandSet {
        &self.supported
    }

    pub fn refresh(&mut self) -> Result<()> {
        self.supported = query_all(&mut self.transport)?;
        Ok(())
    }

    /// Whether `id` must be serialised against other MUTEX-flagged commands on this device.
    pub fn requires_mutex(&self, id: impl Into<u32>) -> bool {
        self.supported.requires_mutex(id.into())
    }

    pub fn descriptor(&self, id: impl Into<u32>) -> Option<&CommandDescriptor> {
        self.supported.get(id.into())
    }

    /// Validates `builder` against this device's command set and submits it.
    pub fn run(&mut self, builder: CommandBuilder) -> Result<CommandResult> {
        let request = builder.build(&self.supported)?;
        self.submit(request)
    }

    /// Submits an already-built request.
    pub fn submit(&mut self, request: impl Into<CommandRequest>) -> Result<CommandResult> {
        submit(&mut self.transport, request)
    }

    pub fn identify(&mut self) -> Result<IdentifyMemdev> {
        let capacity = self.out_capacity_for(CommandId::Identify);
        let res = self.run(CommandBuilder::new(CommandId::Identify).out_capacity(capacity))?;
        IdentifyMemdev::parse(&res.payload_out)
    }

    pub fn get_supported_logs(&mut self) -> Result<Vec<SupportedLog>> {
        let capacity = self.out_capacity_for(CommandId::GetSupportedLogs);
        let res = self.run(
            CommandBuilder::new(CommandId::GetSupportedLogs).out_capacity(capacity),
        )?;
        parse_supported_logs(&res.payload_out)
    }

    /// Reads `length` bytes of the log identified by `uuid`, starting at `offset`.
    pub fn get_log(&mut self, uuid: Uuid, offset: u32, length: u32) -> Result<Vec<u8>> {
        let input = GetLogInput {
            uuid,
            offset,
            length,
        };
        let res = self.run(
            CommandBuilder::new(CommandId::GetLog)
                .payload_in(input.to_bytes().to_vec())
                .out_capacity(length as usize),
        )?;
        Ok(res.into_payload())
    }

    /// Sends a vendor `opcode` without catalog validation.
    pub fn raw(
        &mut self,
        opcode: u16,
        payload_in: Vec<u8>,
        out_capacity: usize,
    ) -> Result<CommandResult> {
        let request = CommandBuilder::raw(opcode)
            .payload_in(payload_in)
            .out_capacity(out_capacity)
            .build_raw()?;
        self.submit(request)
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Output capacity for a command: the fixed size when the device reports one, the
    /// mailbox ceiling otherwise.
    fn out_capacity_for(&self, id: CommandId) -> usize {
        self.supported
            .get(id.as_u32())
            .and_then(|d| d.size_out.fixed())
            .map(|n| n as usize)
            .unwrap_or(MAX_PAYLOAD_BYTES)
    }
}
