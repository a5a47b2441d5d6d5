//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing structured boot and update events
//! to the `log` facade (UART on target, stderr in the simulator).

use log::{error, info, warn};

use crate::app::events::AppEvent;
use crate::app::ports::EventSink;
use crate::image::ImageError;

/// Adapter that logs every [`AppEvent`] to the console.
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl Default for LogEventSink {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &AppEvent) {
        match event {
            AppEvent::BootStarted { version } => {
                info!("BOOT  | Model-T bootloader v{}", version);
            }
            AppEvent::BootCommandRead(cmd) => {
                info!("BOOT  | command={:?}", cmd);
            }
            AppEvent::BootCommandConsumed(cmd) => {
                info!("BOOT  | command {:?} consumed, reset to Default", cmd);
            }
            AppEvent::StagingImage { from, to } => {
                info!("STAGE | copying {} -> {}", from, to);
            }
            AppEvent::ImageStaged { from, to, bytes } => {
                info!("STAGE | {} -> {} done ({} bytes)", from, to, bytes);
            }
            AppEvent::StagingSkipped { from, reason } => {
                warn!("STAGE | {} not copied: {}", from, reason);
            }
            AppEvent::StagingFailed { from, error } => {
                error!("STAGE | copy from {} failed: {}", from, error);
            }
            AppEvent::ImageHeaderFound {
                partition,
                version,
                img_size,
                crc,
            } => {
                info!(
                    "IMAGE | {} header: v{} size={} crc=0x{:08x}",
                    partition, version, img_size, crc
                );
            }
            AppEvent::ImageVerified { partition, version } => {
                info!("IMAGE | {} v{} verified", partition, version);
            }
            AppEvent::ImageRejected { partition, reason } => match reason {
                ImageError::NoImage => warn!("IMAGE | {}: no valid image found", partition),
                ImageError::CrcMismatch { computed, .. } => {
                    warn!("IMAGE | {}: CRC failed, calculated 0x{:08x}", partition, computed);
                }
                other => warn!("IMAGE | {}: {}", partition, other),
            },
            AppEvent::FallingBackToRecovery => {
                warn!("BOOT  | active image unusable, falling back to recovery");
            }
            AppEvent::Executing(entry) => {
                info!(
                    "BOOT  | executing image at 0x{:08x} (sp=0x{:08x} pc=0x{:08x})",
                    entry.vector_table, entry.stack_pointer, entry.reset_vector
                );
            }
            AppEvent::Halted => {
                error!("BOOT  | no bootable image, halting");
            }
            AppEvent::OtaStarted { declared_size } => match declared_size {
                Some(size) => info!("OTA   | session started ({} bytes declared)", size),
                None => info!("OTA   | session started"),
            },
            AppEvent::OtaSessionDiscarded { bytes_written } => {
                warn!("OTA   | open session discarded after {} bytes", bytes_written);
            }
            AppEvent::OtaChunkWritten { bytes_written } => {
                log::debug!("OTA   | {} bytes written", bytes_written);
            }
            AppEvent::OtaVerifying { bytes_written } => {
                info!("OTA   | download complete ({} bytes), verifying", bytes_written);
            }
            AppEvent::OtaVerified { version, img_size } => {
                info!("OTA   | staged v{} ({} bytes) verified", version, img_size);
            }
            AppEvent::OtaFailed(e) => {
                error!("OTA   | update failed: {}", e);
            }
            AppEvent::OtaRebooting => {
                info!("OTA   | shutdown broadcast, rebooting into bootloader");
            }
        }
    }
}
