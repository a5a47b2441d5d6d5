//! Outbound diagnostic events.
//!
//! The bootloader and the OTA task emit these through the
//! [`EventSink`](super::ports::EventSink) port at every major transition.
//! They are advisory: nothing in the core depends on where they end up.

use crate::app::ports::{EntryPoint, StorageError};
use crate::boot::BootCommand;
use crate::image::{ImageError, Version};
use crate::ota::OtaError;
use crate::partition::PartitionId;

/// Structured events emitted by the boot and update core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppEvent {
    // ── Bootloader ────────────────────────────────────────────
    /// Power-on banner.
    BootStarted { version: Version },

    /// The persisted boot command was read.
    BootCommandRead(BootCommand),

    /// The requested copy is done and the command was reset to default.
    BootCommandConsumed(BootCommand),

    /// An image is being copied into another partition.
    StagingImage { from: PartitionId, to: PartitionId },

    /// The copy finished.
    ImageStaged {
        from: PartitionId,
        to: PartitionId,
        bytes: u32,
    },

    /// The source held nothing worth copying; the target is untouched.
    StagingSkipped {
        from: PartitionId,
        reason: ImageError,
    },

    /// The copy failed part-way.
    StagingFailed {
        from: PartitionId,
        error: StorageError,
    },

    /// Header found; payload verification is about to start.
    ImageHeaderFound {
        partition: PartitionId,
        version: Version,
        img_size: u32,
        crc: u32,
    },

    /// The image passed verification.
    ImageVerified {
        partition: PartitionId,
        version: Version,
    },

    /// The image failed verification.
    ImageRejected {
        partition: PartitionId,
        reason: ImageError,
    },

    /// The active image failed; the recovery image is being staged.
    FallingBackToRecovery,

    /// Control is about to be transferred to the image.
    Executing(EntryPoint),

    /// Neither image is bootable.  Terminal.
    Halted,

    // ── OTA update ────────────────────────────────────────────
    /// A new session opened the staging partition.
    OtaStarted { declared_size: Option<u32> },

    /// A Start arrived while a session was open; its bytes were dropped.
    OtaSessionDiscarded { bytes_written: u32 },

    /// A chunk was appended to staging.
    OtaChunkWritten { bytes_written: u32 },

    /// End of stream reached; verifying the staged image.
    OtaVerifying { bytes_written: u32 },

    /// The staged image verified and the next boot is armed.
    OtaVerified { version: Version, img_size: u32 },

    /// The session ended without arming anything.
    OtaFailed(OtaError),

    /// Shutdown broadcast sent; reset follows after the grace period.
    OtaRebooting,
}
