//! Over-the-air firmware update.
//!
//! Flow: Start → N × Chunk → verify → arm boot command → shutdown → reset
//!
//! The [`OtaTask`] owns write access to the UpdateStaging partition for
//! the length of one download.  It never touches Active or Recovery; the
//! bootloader installs the staged image after the reset.

pub mod frame;
pub mod session;
pub mod task;

use core::fmt;

use heapless::Vec;
use serde::{Deserialize, Serialize};

use crate::app::ports::{NetworkError, StorageError};
use crate::image::ImageError;

pub use session::OtaSession;
pub use task::{OtaPorts, OtaTask};

/// Largest chunk payload an [`OtaCommand`] can carry.
pub const MAX_CHUNK_CAPACITY: usize = 1024;

// ── Commands ──────────────────────────────────────────────────

/// One network-delivered fragment of a new image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateChunk {
    pub data: Vec<u8, MAX_CHUNK_CAPACITY>,
    /// Explicit end-of-stream marker.
    pub last: bool,
}

impl UpdateChunk {
    /// Chunk holding a copy of `bytes`, or `None` if it does not fit.
    pub fn from_slice(bytes: &[u8], last: bool) -> Option<Self> {
        Some(Self {
            data: Vec::from_slice(bytes).ok()?,
            last,
        })
    }
}

/// Commands consumed by the OTA task, in posting order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OtaCommand {
    /// Open a new session, discarding any open one.
    Start { image_size: Option<u32> },
    /// Append to the open session.
    Chunk(UpdateChunk),
}

// ── Error type ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtaError {
    NotReceiving,
    ChunkTooLarge,
    ImageTooLarge,
    Overflow,
    IncompleteTransfer,
    Storage(StorageError),
    Network(NetworkError),
    VerifyFailed(ImageError),
    BootSetFailed,
}

impl fmt::Display for OtaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotReceiving => write!(f, "no OTA session open"),
            Self::ChunkTooLarge => write!(f, "chunk exceeds the maximum chunk size"),
            Self::ImageTooLarge => write!(f, "declared image does not fit the staging partition"),
            Self::Overflow => write!(f, "chunk would exceed declared image size"),
            Self::IncompleteTransfer => write!(f, "stream ended before all declared bytes arrived"),
            Self::Storage(e) => write!(f, "staging write failed: {e}"),
            Self::Network(e) => write!(f, "image request failed: {e}"),
            Self::VerifyFailed(e) => write!(f, "staged image rejected: {e}"),
            Self::BootSetFailed => write!(f, "could not arm the boot command"),
        }
    }
}

impl core::error::Error for OtaError {}

// ── State ─────────────────────────────────────────────────────

/// Observable session state.  Verification happens inside the handling
/// of the final chunk and is reported through events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtaState {
    Idle,
    Downloading {
        bytes_written: u32,
        declared_size: Option<u32>,
    },
}

/// Result of one successfully handled command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtaStatus {
    /// A session is open and the image has been requested.
    Started,
    /// Chunk accepted; more are expected.
    Receiving { bytes_written: u32 },
    /// Image verified and armed; the reset has been issued.
    Rebooting,
}
