//! Model-T controller firmware library: fail-safe boot and OTA update core.
//!
//! Exposes the pure-logic modules for the bootloader, the OTA update task
//! and integration testing. Everything here runs on the host; the only
//! hardware-touching code is the Cortex-M platform adapter, guarded by
//! `#[cfg(all(feature = "cortex-m", target_os = "none"))]`.

#![cfg_attr(target_os = "none", no_std)]
#![deny(unused_must_use)]

pub mod adapters;
pub mod app;
pub mod boot;
pub mod bus;
pub mod config;
pub mod image;
pub mod ota;
pub mod partition;

mod error;

pub use error::{Error, Result};
