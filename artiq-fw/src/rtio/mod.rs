//! The RTIO/DDS bridge: memory-mapped control of the RTIO fabric and DDS
//! cores, and the timeline-cursor API a running kernel schedules events
//! through.

pub mod bridge;
pub mod csr;
pub mod dds;

pub use bridge::Bridge;
pub use csr::CsrBus;
pub use dds::{ddsinitall, program_channel, DdsChannel};
