//! On-device runtime firmware.
//!
//! Boot takes the board from reset to a running [`supervisor`] loop that
//! services the network stack and the session engine side by side. Nothing
//! here spins waiting for a host: every suspension point — a drained TCP
//! receive buffer, an unanswered RPC, an idle serial port — returns control
//! to the loop instead.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod allocator;
pub mod clock;
pub mod config;
pub mod diag;
pub mod flash_cfg;
pub mod panic;
pub mod rtio;
pub mod serial;
pub mod session;
pub mod supervisor;

/// The string `IDENT` replies with; stamped at build time by `build.rs`.
pub const BUILD_IDENT: &str = env!("ARTIQ_FW_BUILD_IDENT");
