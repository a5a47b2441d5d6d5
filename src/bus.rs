//! Inter-task channels.
//!
//! Uses `embassy-sync` primitives so the transport, the OTA task and the
//! rest of the firmware share static queues without heap allocation.
//!
//! ```text
//! ┌─────────────┐  OtaCommand   ┌──────────────┐
//! │  Transport  │──────────────▶│   OTA Task   │
//! └─────────────┘               └──────┬───────┘
//!                                      │ SystemMessage::Shutdown
//!                                      ▼
//!                          every subscriber (GUI, control, ...)
//! ```

use embassy_sync::blocking_mutex::raw::{CriticalSectionRawMutex, RawMutex};
use embassy_sync::channel::Channel;
use embassy_sync::pubsub::{PubSubChannel, Publisher};
use log::info;

use crate::app::ports::SystemBus;
use crate::ota::OtaCommand;

/// Depth of the OTA command queue.
pub const OTA_QUEUE_DEPTH: usize = 4;

/// Broadcast history kept for late subscribers.
const SYSTEM_CAP: usize = 4;
/// Maximum number of subscribers to system messages.
pub const SYSTEM_SUBS: usize = 4;
/// Maximum number of system message publishers.
const SYSTEM_PUBS: usize = 2;

/// Firmware-wide notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemMessage {
    /// Quiesce: a reset follows after the grace period.
    Shutdown,
}

pub type OtaChannel<M> = Channel<M, OtaCommand, OTA_QUEUE_DEPTH>;
pub type SystemChannel<M> = PubSubChannel<M, SystemMessage, SYSTEM_CAP, SYSTEM_SUBS, SYSTEM_PUBS>;

/// Inbound OTA commands: transport → OTA task.
pub static OTA_COMMANDS: OtaChannel<CriticalSectionRawMutex> = Channel::new();

/// System-wide broadcasts.
pub static SYSTEM_EVENTS: SystemChannel<CriticalSectionRawMutex> = PubSubChannel::new();

/// [`SystemBus`] that publishes on a [`SystemChannel`].
pub struct BusAdapter<'a, M: RawMutex> {
    publisher: Publisher<'a, M, SystemMessage, SYSTEM_CAP, SYSTEM_SUBS, SYSTEM_PUBS>,
}

impl<'a, M: RawMutex> BusAdapter<'a, M> {
    /// `None` once every publisher slot is taken.
    pub fn new(channel: &'a SystemChannel<M>) -> Option<Self> {
        channel.publisher().ok().map(|publisher| Self { publisher })
    }
}

impl<M: RawMutex> SystemBus for BusAdapter<'_, M> {
    fn broadcast_shutdown(&mut self) {
        info!("BUS: broadcasting shutdown");
        self.publisher.publish_immediate(SystemMessage::Shutdown);
    }
}
