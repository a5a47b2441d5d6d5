//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter       | Implements       | Connects to                   |
//! |---------------|------------------|-------------------------------|
//! | `flash_store` | PartitionStore   | Any `embedded-storage` NOR    |
//! | `sim_flash`   | NorFlash         | In-memory NOR (host only)     |
//! | `log_sink`    | EventSink        | Serial / console log output   |
//! | `platform`    | PlatformControl  | Cortex-M core, or host record |
//!
//! [`SystemBus`](crate::app::ports::SystemBus) is implemented in
//! [`crate::bus`] next to the channels it publishes on.

pub mod flash_store;
pub mod log_sink;
pub mod platform;
#[cfg(not(target_os = "none"))]
pub mod sim_flash;
