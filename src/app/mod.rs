//! Application boundary: port traits and the diagnostics the core emits.
//!
//! The bootloader ([`crate::boot`]) and the OTA task ([`crate::ota`]) hold
//! the domain rules.  All interaction with flash, the CPU, the network and
//! other tasks goes through the **port traits** in [`ports`], keeping the
//! core fully testable without real peripherals.

pub mod events;
pub mod ports;
