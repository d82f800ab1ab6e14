//! Umbrella crate for the CXL memory device mailbox stack.
//!
//! Re-exports [`cxl_mem`], which in turn exposes the raw ioctl layout as `uapi`.

pub use cxl_mem::*;
