//! Port traits: the hexagonal boundary between the boot/update core and
//! the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ Bootloader / OtaTask (domain)
//! ```
//!
//! Driven adapters (flash, CPU control, network, message bus, event sinks)
//! implement these traits.  The domain consumes them via generics, so the
//! state machines never touch hardware directly and run unchanged on the
//! host against fakes.
//!
//! ## Ownership notes
//!
//! - A [`PartitionWriter`] is the only way to write a partition.  Each
//!   component opens writers only for the partitions it owns.
//! - [`PlatformControl`] is the only port that touches CPU state.

use core::fmt;

use heapless::Vec;

use crate::app::events::AppEvent;
use crate::image::Version;
use crate::partition::PartitionId;

/// Largest flash program granule a [`PartitionWriter`] can buffer.
pub const MAX_WRITE_GRANULE: usize = 32;

// ───────────────────────────────────────────────────────────────
// Partition store (driven adapter: domain ↔ flash)
// ───────────────────────────────────────────────────────────────

/// Sequential write cursor into one partition.
///
/// Stores that program in fixed granules keep the unaligned tail of the
/// stream in `pending` until the next write or [`PartitionStore::flush`].
#[derive(Debug)]
pub struct PartitionWriter {
    id: PartitionId,
    /// Bytes already committed to flash.
    committed: u32,
    /// Accepted bytes not yet committed (shorter than one granule).
    pending: Vec<u8, MAX_WRITE_GRANULE>,
}

impl PartitionWriter {
    pub fn new(id: PartitionId) -> Self {
        Self {
            id,
            committed: 0,
            pending: Vec::new(),
        }
    }

    pub fn id(&self) -> PartitionId {
        self.id
    }

    /// Total bytes accepted so far (committed + pending).
    pub fn position(&self) -> u32 {
        self.committed + self.pending.len() as u32
    }

    /// Offset of the next committed byte.
    pub fn committed(&self) -> u32 {
        self.committed
    }

    pub fn advance(&mut self, bytes: u32) {
        self.committed += bytes;
    }

    pub fn pending(&self) -> &[u8] {
        &self.pending
    }

    pub fn pending_mut(&mut self) -> &mut Vec<u8, MAX_WRITE_GRANULE> {
        &mut self.pending
    }
}

/// Byte-addressable named storage regions.
///
/// # Contract
///
/// - `clear` erases the whole partition; erased content reads as `0xFF`.
/// - `write` appends at the writer's cursor and fails with
///   [`StorageError::Full`] rather than spilling into a neighbour.
/// - `flush` commits any buffered tail; data is durable once it returns.
/// - `verify` is a store-native structural check.  The image verifier in
///   [`crate::image`] is authoritative whenever the two disagree.
pub trait PartitionStore {
    /// Physical capacity of the partition in bytes.
    fn capacity(&self, id: PartitionId) -> u32;

    /// Erase the whole partition.
    fn clear(&mut self, id: PartitionId) -> Result<(), StorageError>;

    /// Open a sequential writer positioned at offset 0.
    fn open_for_write(&mut self, id: PartitionId) -> Result<PartitionWriter, StorageError>;

    /// Append `data` at the writer's cursor.
    fn write(&mut self, writer: &mut PartitionWriter, data: &[u8]) -> Result<(), StorageError>;

    /// Commit any buffered tail (padded with erased bytes).
    fn flush(&mut self, writer: &mut PartitionWriter) -> Result<(), StorageError>;

    /// Random read of `buf.len()` bytes at `offset`.
    fn read(&mut self, id: PartitionId, offset: u32, buf: &mut [u8]) -> Result<(), StorageError>;

    /// Store-native quick check that the partition holds something that
    /// looks like an image.
    fn verify(&mut self, id: PartitionId) -> bool;
}

impl<T: PartitionStore + ?Sized> PartitionStore for &mut T {
    fn capacity(&self, id: PartitionId) -> u32 {
        T::capacity(self, id)
    }

    fn clear(&mut self, id: PartitionId) -> Result<(), StorageError> {
        T::clear(self, id)
    }

    fn open_for_write(&mut self, id: PartitionId) -> Result<PartitionWriter, StorageError> {
        T::open_for_write(self, id)
    }

    fn write(&mut self, writer: &mut PartitionWriter, data: &[u8]) -> Result<(), StorageError> {
        T::write(self, writer, data)
    }

    fn flush(&mut self, writer: &mut PartitionWriter) -> Result<(), StorageError> {
        T::flush(self, writer)
    }

    fn read(&mut self, id: PartitionId, offset: u32, buf: &mut [u8]) -> Result<(), StorageError> {
        T::read(self, id, offset, buf)
    }

    fn verify(&mut self, id: PartitionId) -> bool {
        T::verify(self, id)
    }
}

// ───────────────────────────────────────────────────────────────
// Platform control (driven adapter: domain → CPU)
// ───────────────────────────────────────────────────────────────

/// Where and how to enter an image, taken from its vector table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryPoint {
    /// Memory-mapped address of the image's vector table.
    pub vector_table: u32,
    /// Initial main stack pointer (vector table word 0).
    pub stack_pointer: u32,
    /// Reset handler address (vector table word 1).
    pub reset_vector: u32,
}

/// The only two operations that need direct hardware access.
///
/// On hardware neither method returns.  Host fakes record the call and
/// return so the state machines can be observed.
pub trait PlatformControl {
    /// Disable interrupts, clear pending interrupts, install the image's
    /// stack pointer and branch to its reset vector.
    fn jump_to(&mut self, entry: EntryPoint);

    /// Unconditional system reset.
    fn reset(&mut self);
}

impl<T: PlatformControl + ?Sized> PlatformControl for &mut T {
    fn jump_to(&mut self, entry: EntryPoint) {
        T::jump_to(self, entry);
    }

    fn reset(&mut self) {
        T::reset(self);
    }
}

// ───────────────────────────────────────────────────────────────
// Network (driven adapter: domain → API server)
// ───────────────────────────────────────────────────────────────

/// Asks the API server to start streaming a firmware image.  Chunks
/// arrive later as [`OtaCommand::Chunk`](crate::ota::OtaCommand).
pub trait UpdateSource {
    fn request_image(&mut self, current: Version) -> Result<(), NetworkError>;
}

// ───────────────────────────────────────────────────────────────
// System bus (driven adapter: domain → other tasks)
// ───────────────────────────────────────────────────────────────

/// Broadcast channel to cooperating subsystems.
pub trait SystemBus {
    /// Tell every subscriber to quiesce ahead of a reset.
    fn broadcast_shutdown(&mut self);
}

// ───────────────────────────────────────────────────────────────
// Event sink port (driven adapter: domain → logging / telemetry)
// ───────────────────────────────────────────────────────────────

/// The domain emits structured [`AppEvent`]s through this port.  Adapters
/// decide where they go (serial log, test recorder, etc.).
pub trait EventSink {
    fn emit(&mut self, event: &AppEvent);
}

impl<T: EventSink + ?Sized> EventSink for &mut T {
    fn emit(&mut self, event: &AppEvent) {
        T::emit(self, event);
    }
}

// ───────────────────────────────────────────────────────────────
// Error types
// ───────────────────────────────────────────────────────────────

/// Errors from [`PartitionStore`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    /// Read or write range falls outside the partition.
    OutOfBounds,
    /// Write would exceed the partition capacity.
    Full,
    /// Erase failed.
    EraseFailed,
    /// Program failed.
    WriteFailed,
    /// Read failed.
    ReadFailed,
}

/// Errors from [`UpdateSource`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkError {
    /// No connection to the API server.
    NotConnected,
    /// The request could not be sent.
    RequestFailed,
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfBounds => write!(f, "access out of partition bounds"),
            Self::Full => write!(f, "partition full"),
            Self::EraseFailed => write!(f, "erase failed"),
            Self::WriteFailed => write!(f, "write failed"),
            Self::ReadFailed => write!(f, "read failed"),
        }
    }
}

impl fmt::Display for NetworkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotConnected => write!(f, "not connected"),
            Self::RequestFailed => write!(f, "request failed"),
        }
    }
}

impl core::error::Error for StorageError {}
impl core::error::Error for NetworkError {}
