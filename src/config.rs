//! System configuration parameters
//!
//! All tunable parameters for the boot and update core.  Defaults match the
//! production board; the simulator can override them from a JSON file.

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::boot::MAX_COPY_BLOCK;
use crate::image::Version;
use crate::ota::MAX_CHUNK_CAPACITY;
use crate::partition::PartitionLayout;

/// Firmware version baked into this build.
pub const FIRMWARE_VERSION: Version = Version::new(0, 3, 0);

/// Core system configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    // --- Flash ---
    /// Where each partition lives.
    pub layout: PartitionLayout,
    /// Block size used when the bootloader copies one partition to another.
    pub copy_block_size: u32,

    // --- OTA ---
    /// Largest chunk the transport delivers (bytes).  A shorter chunk ends
    /// a download that declared no total size.
    pub max_chunk_size: u32,
    /// Time other tasks get to quiesce between the shutdown broadcast and
    /// the reset (milliseconds).
    pub shutdown_grace_ms: u32,
    /// Version of the running firmware, reported when requesting an image.
    pub firmware_version: Version,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            layout: PartitionLayout::default(),
            copy_block_size: 512,
            max_chunk_size: 512,
            shutdown_grace_ms: 1000, // ~1 s
            firmware_version: FIRMWARE_VERSION,
        }
    }
}

impl SystemConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.layout.validate(0).map_err(ConfigError::Layout)?;
        if self.max_chunk_size == 0 {
            return Err(ConfigError::ZeroChunkSize);
        }
        if self.max_chunk_size as usize > MAX_CHUNK_CAPACITY {
            return Err(ConfigError::ChunkTooLarge);
        }
        if self.shutdown_grace_ms == 0 {
            return Err(ConfigError::ZeroGracePeriod);
        }
        if self.copy_block_size == 0 || self.copy_block_size as usize > MAX_COPY_BLOCK {
            return Err(ConfigError::CopyBlockSize);
        }
        Ok(())
    }
}

// ── Errors ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    Layout(&'static str),
    ZeroChunkSize,
    ChunkTooLarge,
    ZeroGracePeriod,
    CopyBlockSize,
}

impl ConfigError {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Layout(msg) => msg,
            Self::ZeroChunkSize => "max_chunk_size must be non-zero",
            Self::ChunkTooLarge => "max_chunk_size exceeds the command channel capacity",
            Self::ZeroGracePeriod => "shutdown_grace_ms must be non-zero",
            Self::CopyBlockSize => "copy_block_size out of range",
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::error::Error for ConfigError {}
