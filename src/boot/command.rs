//! Persisted boot command.
//!
//! The BootParams partition holds one 8-byte record:
//!
//! ```text
//! ┌──────────────────┬──────────────────┐
//! │ command (u32 LE) │ check (u32 LE)   │   check == !command
//! └──────────────────┴──────────────────┘
//! ```
//!
//! Erased, zeroed, torn or unknown records all decode as
//! [`BootCommand::Default`], so a half-written record can never trigger a
//! copy.

use log::warn;
use zerocopy::byteorder::{LittleEndian, U32};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::app::ports::{PartitionStore, PlatformControl, StorageError};
use crate::image::Version;
use crate::partition::PartitionId;

/// Version of the bootloader in this build.
pub const BOOTLOADER_VERSION: Version = Version::new(1, 0, 0);

const BOOTLOADER_VERSION_STR: &str = "1.0.0";

/// Human-readable bootloader version.
pub fn bootloader_version() -> &'static str {
    BOOTLOADER_VERSION_STR
}

/// What the bootloader should do before booting the active image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum BootCommand {
    /// Boot the active image as is.
    Default = 0,
    /// Copy the recovery image over the active image first.
    LoadRecoveryImage = 1,
    /// Copy the staged update over the active image first.
    LoadUpdateImage = 2,
}

impl BootCommand {
    fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(Self::Default),
            1 => Some(Self::LoadRecoveryImage),
            2 => Some(Self::LoadUpdateImage),
            _ => None,
        }
    }

    /// Source partition of the copy this command requests, if any.
    pub fn copy_source(self) -> Option<PartitionId> {
        match self {
            Self::Default => None,
            Self::LoadRecoveryImage => Some(PartitionId::Recovery),
            Self::LoadUpdateImage => Some(PartitionId::UpdateStaging),
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout)]
struct BootRecord {
    command: U32<LittleEndian>,
    check: U32<LittleEndian>,
}

const RECORD_LEN: usize = core::mem::size_of::<BootRecord>();

impl BootRecord {
    fn new(cmd: BootCommand) -> Self {
        let raw = cmd as u32;
        Self {
            command: U32::new(raw),
            check: U32::new(!raw),
        }
    }

    fn decode(self) -> BootCommand {
        let raw = self.command.get();
        if self.check.get() != !raw {
            return BootCommand::Default;
        }
        BootCommand::from_raw(raw).unwrap_or(BootCommand::Default)
    }
}

// ── Store ─────────────────────────────────────────────────────

/// Typed access to the boot command in the BootParams partition.
pub struct BootCommandStore<'a, S> {
    store: &'a mut S,
}

impl<'a, S: PartitionStore> BootCommandStore<'a, S> {
    pub fn new(store: &'a mut S) -> Self {
        Self { store }
    }

    /// Current command.  Unreadable storage counts as `Default`.
    pub fn read(&mut self) -> BootCommand {
        let mut raw = [0u8; RECORD_LEN];
        if let Err(e) = self.store.read(PartitionId::BootParams, 0, &mut raw) {
            warn!("boot params unreadable ({}), assuming Default", e);
            return BootCommand::Default;
        }
        BootRecord::read_from_bytes(&raw)
            .map(BootRecord::decode)
            .unwrap_or(BootCommand::Default)
    }

    /// Persist `cmd`.  The record is durable when this returns `Ok`.
    pub fn write(&mut self, cmd: BootCommand) -> Result<(), StorageError> {
        self.store.clear(PartitionId::BootParams)?;
        let mut writer = self.store.open_for_write(PartitionId::BootParams)?;
        self.store.write(&mut writer, BootRecord::new(cmd).as_bytes())?;
        self.store.flush(&mut writer)
    }

    /// Persist `cmd`, then reset.  No reset happens if the write failed.
    pub fn arm_and_reset(
        &mut self,
        cmd: BootCommand,
        platform: &mut impl PlatformControl,
    ) -> Result<(), StorageError> {
        self.write(cmd)?;
        platform.reset();
        Ok(())
    }
}

// ── Application API ───────────────────────────────────────────

/// Ask the bootloader to restore the recovery image on the next boot, and
/// reset now.
pub fn request_recovery_image(
    store: &mut impl PartitionStore,
    platform: &mut impl PlatformControl,
) -> Result<(), StorageError> {
    BootCommandStore::new(store).arm_and_reset(BootCommand::LoadRecoveryImage, platform)
}

/// Ask the bootloader to install the staged update on the next boot, and
/// reset now.
pub fn request_update_image(
    store: &mut impl PartitionStore,
    platform: &mut impl PlatformControl,
) -> Result<(), StorageError> {
    BootCommandStore::new(store).arm_and_reset(BootCommand::LoadUpdateImage, platform)
}
