//! Command discovery and dispatch for CXL memory devices.
//!
//! A memory device exposes a mailbox through two ioctls: one lists the commands the
//! driver will accept, the other submits a single command. This crate layers a typed API
//! on top:
//!
//! - [`catalog`]/[`lookup`]: the static table of known command ids
//! - [`query_supported`]/[`query_all`]: the live command set of one device
//! - [`CommandBuilder`]: validates a request against that set before it is sent
//! - [`submit`]: sends a built request once and decodes the reply
//! - [`Memdev`]: a device session with typed Identify / Get Log helpers
//! - [`EmulatedMemdev`]: an in-process device for tooling and tests
//!
//! The kernel-facing transport is abstracted behind [`Transport`]; nothing here opens a
//! device node.

mod builder;
mod catalog;
mod dispatch;
mod emulated;
mod error;
mod identify;
mod logs;
mod memdev;
mod query;
mod status;
mod transport;

pub use builder::{
    build, CatalogCommand, CommandBuilder, CommandRequest, RawCommand, MAX_PAYLOAD_BYTES,
};
pub use catalog::{
    catalog, command_name, lookup, CommandDescriptor, CommandFlags, CommandId, PayloadSize,
    GET_LOG_INPUT_SIZE, IDENTIFY_OUTPUT_SIZE, UNKNOWN_COMMAND_NAME,
};
pub use dispatch::{submit, CommandResult};
pub use emulated::{EmulatedMemdev, Faults, RawHandler, SentCommand};
pub use error::{CxlError, PayloadDirection, Result, ValidationError};
pub use identify::{IdentifyMemdev, CAPACITY_MULTIPLIER};
pub use logs::{
    encode_supported_logs, parse_supported_logs, GetLogInput, SupportedLog, CEL_UUID,
};
pub use memdev::Memdev;
pub use query::{query_all, query_supported, SupportedCommandSet, MAX_QUERY_COMMANDS};
pub use status::MboxStatus;
pub use transport::{IoctlArg, Transport};

pub use cxl_uapi as uapi;
